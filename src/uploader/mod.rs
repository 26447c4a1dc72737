// Upload pipeline: queue -> optional resize -> webhook delivery
//
// Exactly one file is in flight at a time so rate limits are respected

pub mod events;
pub mod progress_tracker;
pub mod retry;
pub mod types;
pub mod upload_queue;
pub mod webhook_client;

pub use events::{CycleSummary, EventSink, LogEntry, Severity, UploadEvent};
pub use types::{PendingFile, UploadTarget};
pub use upload_queue::{QueueHandle, QueueProcessor};
pub use webhook_client::{ReqwestTransport, WebhookClient, WebhookTransport};
