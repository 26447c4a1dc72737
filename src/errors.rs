use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No webhook URL configured. Set one before uploading.")]
    MissingEndpoint,

    #[error("Invalid webhook URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resize failed: {0}")]
    Resize(#[from] ResizeError),

    #[error("{0}")]
    Upload(#[from] UploadError),

    #[error("Upload queue is no longer running")]
    QueueClosed,
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_endpoint(url: &str) -> Self {
        Self::InvalidEndpoint {
            url: url.to_string(),
        }
    }
}

/// Failure to bring an image under its byte budget
#[derive(Error, Debug)]
pub enum ResizeError {
    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("could not encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("target size unreachable (smallest result {best_size} bytes after {passes} passes)")]
    TargetUnreachable { passes: u32, best_size: u64 },

    #[error("resize task aborted: {0}")]
    Task(String),
}

/// Terminal failure of a single webhook delivery
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP {status}")]
    HttpStatus { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("retry limit reached after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
}
