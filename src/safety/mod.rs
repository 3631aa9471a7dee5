//! Pre-Execution SQL Safety Gate
//!
//! Generated SQL passes through this gate before it reaches any runner.
//! The gate scans case-insensitively for a fixed denylist of mutating
//! keywords and rejects the statement on any match.
//!
//! # Validation Strategy
//! - Conservative substring matching (fail-safe defaults)
//! - A keyword match anywhere in the text rejects the statement, including
//!   inside string literals and identifiers
//! - Rejections are never retried: retrying does not change a textually
//!   dangerous statement
//!
//! The substring approach trades precision for recall: a statement like
//! `SELECT * FROM grant_applications` is rejected even though it is safe.
//! It can also be evaded with comment or whitespace obfuscation; a
//! statement-level SQL parser classifying statement types would close that
//! gap while keeping the same fail-closed contract.

use crate::error::{Result, SqlsightError};

/// Keywords whose presence anywhere in a statement blocks execution.
const DENYLIST: [&str; 5] = ["DROP", "DELETE", "TRUNCATE", "ALTER", "GRANT"];

/// Check a SQL statement against the denylist.
///
/// # Returns
/// * `Ok(())` if no denylisted keyword appears in the statement
/// * `Err(DangerousOperation)` naming the first matched keyword
pub fn check(sql: &str) -> Result<()> {
    let upper = sql.to_uppercase();

    for keyword in DENYLIST {
        if upper.contains(keyword) {
            return Err(SqlsightError::dangerous_operation(keyword));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_passes() {
        assert!(check("SELECT * FROM users").is_ok());
        assert!(check("SELECT COUNT(*) FROM customers;").is_ok());
    }

    #[test]
    fn test_each_denylisted_keyword_rejected() {
        for sql in [
            "DROP TABLE users",
            "DELETE FROM users WHERE id = 1",
            "TRUNCATE TABLE users",
            "ALTER TABLE users ADD COLUMN age INTEGER",
            "GRANT ALL ON users TO intern",
        ] {
            let result = check(sql);
            assert!(result.is_err(), "expected rejection for: {sql}");
            assert_eq!(result.unwrap_err().error_code(), "DANGEROUS_OPERATION");
        }
    }

    #[test]
    fn test_case_insensitive_matching() {
        assert!(check("drop table users").is_err());
        assert!(check("Delete from users").is_err());
        assert!(check("tRuNcAtE table users").is_err());
        assert!(check("Alter table users").is_err());
        assert!(check("grant all on users to intern").is_err());
    }

    #[test]
    fn test_substring_match_anywhere() {
        // Conservative by design: matches inside literals and identifiers too
        assert!(check("SELECT 'please do not DROP this'").is_err());
        assert!(check("SELECT * FROM grant_applications").is_err());
        assert!(check("SELECT * FROM users WHERE name = 'alternate'").is_err());
    }

    #[test]
    fn test_error_names_matched_keyword() {
        let err = check("SELECT 1; DROP TABLE users").unwrap_err();
        assert!(err.message().contains("DROP"));

        let err = check("truncate table t").unwrap_err();
        assert!(err.message().contains("TRUNCATE"));
    }

    #[test]
    fn test_insert_and_update_pass() {
        // The denylist targets destructive operations only
        assert!(check("INSERT INTO users (name) VALUES ('x')").is_ok());
        assert!(check("UPDATE users SET name = 'x' WHERE id = 1").is_ok());
    }
}
