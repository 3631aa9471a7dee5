//! Sqlsight CLI Entry Point
//!
//! Four subcommands:
//! - `serve` - run the HTTP surface backed by the configured engine
//! - `ask` - one-shot question-to-answer through the local pipeline
//! - `chat` - interactive streaming chat against a running backend
//! - `health` - backend health probe
//!
//! All output to stdout is JSON (except the chat transcript). Logs go to
//! stderr.

use clap::{Parser, Subcommand};
use std::sync::Arc;

use sqlsight::client::ApiClient;
use sqlsight::config::{ClientSettings, EnvSource, Settings};
use sqlsight::output::{ErrorEnvelope, Metadata, SuccessEnvelope};
use sqlsight::pipeline::{AppContext, QueryPipeline};
use sqlsight::StreamRenderer;

/// Sqlsight - Natural-Language SQL Service
#[derive(Parser)]
#[command(name = "sqlsight")]
#[command(about = "Natural-language to SQL service with safety-gated execution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP surface backed by the configured engine
    Serve,

    /// Ask one question through the local pipeline and print the answer
    Ask {
        /// Natural-language question
        question: String,
    },

    /// Interactive streaming chat against a running backend
    Chat {
        /// Backend base URL (overrides BACKEND_URL)
        #[arg(long)]
        backend_url: Option<String>,
    },

    /// Probe a running backend's health endpoint
    Health {
        /// Backend base URL (overrides BACKEND_URL)
        #[arg(long)]
        backend_url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Serve => serve().await,
        Commands::Ask { question } => ask(&question).await,
        Commands::Chat { backend_url } => chat(backend_url).await,
        Commands::Health { backend_url } => health(backend_url).await,
    };

    if let Err(e) = outcome {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn serve() -> anyhow::Result<()> {
    let settings = Settings::load(&EnvSource)?;
    tracing::info!(
        engine = %settings.engine,
        descriptor = %settings.descriptor,
        "starting sqlsight"
    );

    let ctx = Arc::new(AppContext::initialize(&settings).await?);
    sqlsight::server::run_server(&settings, ctx).await
}

async fn ask(question: &str) -> anyhow::Result<()> {
    let settings = Settings::load(&EnvSource)?;
    let engine = settings.engine.to_string();

    let ctx = Arc::new(AppContext::initialize(&settings).await?);
    let pipeline = QueryPipeline::new(ctx);

    let started = std::time::Instant::now();
    match pipeline.answer(question).await {
        Ok(answer) => {
            let mut meta =
                Metadata::with_rows(started.elapsed().as_millis() as u64, answer.row_count);
            if answer.cached {
                meta = meta.from_cache();
            }
            let envelope = SuccessEnvelope::new(engine, "answer", &answer, meta);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        Err(e) => {
            let envelope = ErrorEnvelope::from_error(engine, "answer", &e);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            std::process::exit(1);
        }
    }
}

fn client_settings(backend_url: Option<String>) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::load(&EnvSource)?;
    if let Some(url) = backend_url {
        settings.backend_url = url;
    }
    Ok(settings)
}

async fn chat(backend_url: Option<String>) -> anyhow::Result<()> {
    let settings = client_settings(backend_url)?;
    let mut client = ApiClient::new(&settings)?;

    let username: String = dialoguer::Input::new()
        .with_prompt("username")
        .default("admin".to_string())
        .interact_text()?;
    let password = dialoguer::Password::new().with_prompt("password").interact()?;

    client.login(&username, &password).await?;
    eprintln!("logged in; empty line to exit");

    let mut conversation_id: Option<String> = None;

    loop {
        let message: String =
            dialoguer::Input::new().with_prompt("you").allow_empty(true).interact_text()?;
        if message.trim().is_empty() {
            break;
        }

        let mut stream = client.stream_chat(&message, conversation_id.as_deref()).await?;
        let mut renderer = StreamRenderer::new();
        let mut printed = 0;

        while let Some(chunk) = stream.next_chunk().await {
            match chunk {
                Ok(chunk) => {
                    renderer.render_chunk(&chunk);
                    for line in &renderer.transcript()[printed..] {
                        println!("{line}");
                    }
                    printed = renderer.transcript().len();
                }
                Err(e) => {
                    eprintln!("stream error: {e}");
                    break;
                }
            }
        }

        // Carry the conversation forward on the next send
        if let Some(id) = renderer.conversation_id() {
            conversation_id = Some(id.to_string());
        }
    }

    Ok(())
}

async fn health(backend_url: Option<String>) -> anyhow::Result<()> {
    let settings = client_settings(backend_url)?;
    let mut client = ApiClient::new(&settings)?;

    match client.health().await {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::json!({"error": e.message()}));
            std::process::exit(1);
        }
    }
}
