use regex::Regex;
use std::sync::OnceLock;

use crate::errors::{AppError, AppResult};

const MAX_URL_LENGTH: usize = 2000;
const MAX_FILENAME_LENGTH: usize = 255;

fn endpoint_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://[^\s/?#]+[^\s]*$").expect("valid endpoint regex"))
}

fn unsafe_filename_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid filename regex"))
}

pub struct InputValidator;

impl InputValidator {
    pub fn validate_endpoint_url(url: &str) -> AppResult<()> {
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("webhook_url", "Webhook URL cannot be empty"));
        }

        if trimmed.len() > MAX_URL_LENGTH {
            return Err(AppError::validation("webhook_url", "Webhook URL too long"));
        }

        if !endpoint_pattern().is_match(trimmed) {
            return Err(AppError::invalid_endpoint(trimmed));
        }

        Ok(())
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let sanitized = unsafe_filename_chars().replace_all(filename.trim(), "_");

        if sanitized.chars().count() > MAX_FILENAME_LENGTH {
            let head: String = sanitized.chars().take(MAX_FILENAME_LENGTH - 3).collect();
            format!("{}...", head)
        } else {
            sanitized.to_string()
        }
    }
}
