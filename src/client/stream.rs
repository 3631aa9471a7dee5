//! Streaming Chat Consumption and Rendering
//!
//! A chat turn arrives as a server-sent event stream of [`ChatChunk`]
//! records. [`ChatStream`] decodes the SSE framing incrementally;
//! [`StreamRenderer`] materializes each chunk's component tree into a plain
//! text transcript.
//!
//! # Resilience Contract
//! - Unknown component types render as their raw JSON payload, never fail
//! - Absent optional fields render nothing
//! - The stream is consumed once, chunk by chunk; each chunk is fully
//!   rendered before the next is awaited
//!
//! The server assigns a conversation id on the first chunk of a new
//! conversation; the renderer tracks the last-seen id so the caller can echo
//! it on the next send.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SqlsightError};

/// One unit of a streamed conversational response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    /// Conversation id assigned by the server (first chunk of a new
    /// conversation); echo it on the next send to continue
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Rich component payload (optionally a tree with children)
    #[serde(default)]
    pub rich: Option<Value>,

    /// Simple component payload
    #[serde(default)]
    pub simple: Option<Value>,
}

/// Incremental SSE decoder over a chat response.
///
/// Frames are `data: {json}` lines separated by blank lines; a `[DONE]`
/// frame terminates the stream. Consuming the stream twice is not supported.
#[derive(Debug)]
pub struct ChatStream {
    response: reqwest::Response,
    buffer: String,
    done: bool,
}

impl ChatStream {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self { response, buffer: String::new(), done: false }
    }

    /// Await the next chunk; `None` once the stream has ended.
    pub async fn next_chunk(&mut self) -> Option<Result<ChatChunk>> {
        loop {
            while let Some(pos) = self.buffer.find("\n\n") {
                let frame: String = self.buffer.drain(..pos + 2).collect();
                match frame_data(&frame) {
                    Some(data) if data == "[DONE]" => {
                        self.done = true;
                        return None;
                    }
                    Some(data) => return Some(decode_chunk(&data)),
                    None => {} // comment or empty frame
                }
            }

            if self.done {
                return None;
            }

            match self.response.chunk().await {
                Ok(Some(bytes)) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                }
                Ok(None) => {
                    self.done = true;
                    // Flush a trailing frame without a final blank line
                    let rest = std::mem::take(&mut self.buffer);
                    match frame_data(&rest) {
                        Some(data) if data != "[DONE]" => return Some(decode_chunk(&data)),
                        _ => return None,
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(SqlsightError::connection_error(format!(
                        "chat stream interrupted: {e}"
                    ))));
                }
            }
        }
    }
}

/// Extract the data payload from one SSE frame.
///
/// Multiple `data:` lines in one frame concatenate with newlines.
fn frame_data(frame: &str) -> Option<String> {
    let mut parts = Vec::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            parts.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn decode_chunk(data: &str) -> Result<ChatChunk> {
    serde_json::from_str(data)
        .map_err(|e| SqlsightError::invalid_input(format!("undecodable chat chunk: {e}")))
}

/// Severity attached to status-bearing components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl StatusLevel {
    /// Map loose server-side level strings onto the closed set.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or("info").to_lowercase().as_str() {
            "error" | "danger" | "fail" => Self::Error,
            "warning" | "warn" => Self::Warning,
            "success" | "ok" | "ready" => Self::Success,
            _ => Self::Info,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Closed set of renderable UI components.
///
/// Every wire-level type tag maps onto exactly one variant; tags outside the
/// set land in [`UiComponent::Unknown`] carrying the raw payload, so
/// rendering is total over arbitrary input.
#[derive(Debug, Clone, PartialEq)]
pub enum UiComponent {
    Text { content: Option<String>, children: Vec<UiComponent> },
    Link { href: Option<String>, label: Option<String>, children: Vec<UiComponent> },
    RichText { content: Option<String>, children: Vec<UiComponent> },
    StatusCard {
        title: String,
        status: StatusLevel,
        description: Option<String>,
        children: Vec<UiComponent>,
    },
    StatusUpdate {
        status: StatusLevel,
        message: String,
        detail: Option<String>,
        children: Vec<UiComponent>,
    },
    Notification {
        level: StatusLevel,
        message: String,
        description: Option<String>,
        children: Vec<UiComponent>,
    },
    Progress { fraction: Option<f64>, message: Option<String>, children: Vec<UiComponent> },
    DataFrame { rows: Vec<Value>, children: Vec<UiComponent> },
    Card { title: Option<String>, body: Option<String>, children: Vec<UiComponent> },
    LogViewer { data: Value, children: Vec<UiComponent> },
    Unknown { raw: Value },
}

impl UiComponent {
    /// Classify a raw component payload into the closed variant set.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        // Rich components nest their payload under "data"; simple components
        // carry fields at the top level. Fall back so both shapes decode.
        let data = value.get("data").unwrap_or(value);

        let children: Vec<UiComponent> = value
            .get("children")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(Self::from_value).collect())
            .unwrap_or_default();

        let text_of = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|key| data.get(key).and_then(Value::as_str))
                .map(str::to_string)
        };

        match kind.as_str() {
            "text" => Self::Text { content: text_of(&["text", "content"]), children },
            "link" => Self::Link {
                href: text_of(&["href", "url"]),
                label: text_of(&["text"]),
                children,
            },
            "rich_text" => Self::RichText { content: text_of(&["content", "text"]), children },
            "status_card" => Self::StatusCard {
                title: text_of(&["title"]).unwrap_or_else(|| "Status".to_string()),
                status: StatusLevel::parse(data.get("status").and_then(Value::as_str)),
                description: text_of(&["description"]),
                children,
            },
            "status_bar_update" | "status_update" => Self::StatusUpdate {
                status: StatusLevel::parse(data.get("status").and_then(Value::as_str)),
                message: text_of(&["message"]).unwrap_or_else(|| "Status update".to_string()),
                detail: text_of(&["detail"]),
                children,
            },
            "notification" => Self::Notification {
                level: StatusLevel::parse(data.get("level").and_then(Value::as_str)),
                message: text_of(&["message"]).unwrap_or_else(|| "Notification".to_string()),
                description: text_of(&["description"]),
                children,
            },
            "progress_display" => Self::Progress {
                fraction: data.get("progress").and_then(Value::as_f64),
                message: text_of(&["message"]),
                children,
            },
            "dataframe" => Self::DataFrame {
                rows: data
                    .get("rows")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                children,
            },
            "card" | "container" => Self::Card {
                title: text_of(&["title"]),
                body: text_of(&["body", "description"]),
                children,
            },
            "log_viewer" | "task_list" | "task_tracker_update" => {
                Self::LogViewer { data: data.clone(), children }
            }
            _ => Self::Unknown { raw: value.clone() },
        }
    }

    /// Child components (empty for unknown payloads).
    #[must_use]
    pub fn children(&self) -> &[UiComponent] {
        match self {
            Self::Text { children, .. }
            | Self::Link { children, .. }
            | Self::RichText { children, .. }
            | Self::StatusCard { children, .. }
            | Self::StatusUpdate { children, .. }
            | Self::Notification { children, .. }
            | Self::Progress { children, .. }
            | Self::DataFrame { children, .. }
            | Self::Card { children, .. }
            | Self::LogViewer { children, .. } => children,
            Self::Unknown { .. } => &[],
        }
    }
}

/// Accumulates a visible transcript from a stream of chunks.
#[derive(Debug, Default)]
pub struct StreamRenderer {
    transcript: Vec<String>,
    conversation_id: Option<String>,
}

impl StreamRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-seen conversation id, to echo on the next send.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Lines rendered so far.
    #[must_use]
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Full transcript as one string.
    #[must_use]
    pub fn text(&self) -> String {
        self.transcript.join("\n")
    }

    /// Render one chunk: rich tree first, then the simple component.
    pub fn render_chunk(&mut self, chunk: &ChatChunk) {
        if let Some(id) = &chunk.conversation_id {
            self.conversation_id = Some(id.clone());
        }
        if let Some(rich) = &chunk.rich {
            self.render(&UiComponent::from_value(rich));
        }
        if let Some(simple) = &chunk.simple {
            self.render(&UiComponent::from_value(simple));
        }
    }

    /// Depth-first render: the node's own content, then its children.
    pub fn render(&mut self, component: &UiComponent) {
        match component {
            UiComponent::Text { content, .. } | UiComponent::RichText { content, .. } => {
                if let Some(content) = content {
                    self.transcript.push(content.clone());
                }
            }
            UiComponent::Link { href, label, .. } => {
                if let Some(href) = href {
                    let label = label.as_deref().unwrap_or(href);
                    self.transcript.push(format!("[{label}]({href})"));
                }
            }
            UiComponent::StatusCard { title, status, description, .. } => {
                self.transcript.push(format!("[{}] {title}", status.as_str()));
                if let Some(description) = description {
                    self.transcript.push(description.clone());
                }
            }
            UiComponent::StatusUpdate { status, message, detail, .. } => {
                self.transcript.push(format!("[{}] {message}", status.as_str()));
                if let Some(detail) = detail {
                    self.transcript.push(detail.clone());
                }
            }
            UiComponent::Notification { level, message, description, .. } => {
                self.transcript.push(format!("[{}] {message}", level.as_str()));
                if let Some(description) = description {
                    self.transcript.push(description.clone());
                }
            }
            UiComponent::Progress { fraction, message, .. } => {
                if let Some(fraction) = fraction {
                    let percent = (fraction.clamp(0.0, 1.0) * 100.0).round();
                    self.transcript.push(format!("[progress {percent}%]"));
                }
                if let Some(message) = message {
                    self.transcript.push(message.clone());
                }
            }
            UiComponent::DataFrame { rows, .. } => {
                if rows.is_empty() {
                    self.transcript
                        .push("Query executed successfully. No rows returned.".to_string());
                } else {
                    self.transcript.push(format!("[dataframe: {} rows]", rows.len()));
                    for row in rows {
                        self.transcript.push(row.to_string());
                    }
                }
            }
            UiComponent::Card { title, body, .. } => {
                if let Some(title) = title {
                    self.transcript.push(title.clone());
                }
                if let Some(body) = body {
                    self.transcript.push(body.clone());
                }
            }
            UiComponent::LogViewer { data, .. } => {
                self.transcript.push(data.to_string());
            }
            UiComponent::Unknown { raw } => {
                // Fallback: raw payload, never a failure
                self.transcript.push(raw.to_string());
            }
        }

        for child in component.children() {
            self.render(child);
        }
    }
}
