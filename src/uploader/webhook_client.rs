use async_trait::async_trait;
use reqwest::{multipart, Client};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::events::{emit_log, EventSink, Severity};
use super::retry::{RetryPolicy, RetryState};
use super::types::{PendingFile, UploadTarget};
use crate::errors::{AppResult, UploadError};
use crate::security::InputValidator;

/// Field name the webhook expects the image under
pub const FILE_FIELD: &str = "file";

/// Raw outcome of one POST
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// One multipart delivery attempt, nothing more
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_file(&self, url: &str, file: &PendingFile) -> Result<TransportResponse, String>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post_file(&self, url: &str, file: &PendingFile) -> Result<TransportResponse, String> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(InputValidator::sanitize_filename(&file.display_name))
            .mime_str(&file.mime_type)
            .map_err(|e| e.to_string())?;
        let form = multipart::Form::new().part(FILE_FIELD, part);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Ok(TransportResponse { status, body })
    }
}

/// Append `thread_id` to the endpoint, respecting an existing query string
pub fn build_upload_url(endpoint_url: &str, thread_id: Option<&str>) -> String {
    let endpoint_url = endpoint_url.trim();

    match thread_id.map(str::trim).filter(|tid| !tid.is_empty()) {
        Some(tid) => {
            let separator = if endpoint_url.contains('?') { '&' } else { '?' };
            format!(
                "{}{}thread_id={}",
                endpoint_url,
                separator,
                urlencoding::encode(tid)
            )
        }
        None => endpoint_url.to_string(),
    }
}

/// Webhook client that waits out rate limits
pub struct WebhookClient {
    transport: Arc<dyn WebhookTransport>,
    events: Arc<dyn EventSink>,
    retry_policy: RetryPolicy,
}

impl WebhookClient {
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        events: Arc<dyn EventSink>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            events,
            retry_policy,
        }
    }

    pub async fn upload(
        &self,
        file: &PendingFile,
        display_name: &str,
        target: &UploadTarget,
    ) -> Result<(), UploadError> {
        let url = build_upload_url(&target.endpoint_url, target.thread_id.as_deref());
        let mut retry = RetryState::default();

        loop {
            if self.retry_policy.is_exhausted(&retry) {
                log::warn!(
                    "Giving up on {} after {} rate-limited attempts",
                    display_name,
                    retry.attempt
                );
                return Err(UploadError::RetryExhausted {
                    attempts: retry.attempt,
                });
            }

            log::debug!("POST {} (attempt {})", display_name, retry.attempt + 1);

            let response = self
                .transport
                .post_file(&url, file)
                .await
                .map_err(UploadError::Network)?;

            match response.status {
                200..=299 => {
                    emit_log(
                        self.events.as_ref(),
                        format!("Sent: {} ✅", display_name),
                        Severity::Success,
                    );
                    return Ok(());
                }
                429 => {
                    let retry_after = self.retry_policy.parse_retry_after(&response.body);
                    emit_log(
                        self.events.as_ref(),
                        format!(
                            "Rate limited: retrying in {:.1}s...",
                            retry_after.as_secs_f64()
                        ),
                        Severity::Warning,
                    );

                    let delay = self.retry_policy.wait_for(retry_after);
                    retry.record_rate_limit(delay);
                    sleep(delay).await;
                }
                status => {
                    log::warn!(
                        "Webhook rejected {} with {}: {}",
                        display_name,
                        status,
                        response.body.chars().take(300).collect::<String>()
                    );
                    return Err(UploadError::HttpStatus {
                        status,
                        body: response.body,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::events::UploadEvent;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Replays canned responses and records every URL it was asked to hit
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, String>>>,
        fallback: Result<TransportResponse, String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(
            responses: Vec<Result<TransportResponse, String>>,
            fallback: Result<TransportResponse, String>,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                fallback,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WebhookTransport for ScriptedTransport {
        async fn post_file(
            &self,
            url: &str,
            _file: &PendingFile,
        ) -> Result<TransportResponse, String> {
            self.calls.lock().unwrap().push(url.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn reply(status: u16, body: &str) -> Result<TransportResponse, String> {
        Ok(TransportResponse {
            status,
            body: body.to_string(),
        })
    }

    fn target() -> UploadTarget {
        UploadTarget {
            endpoint_url: "https://example.com/api/webhooks/1/abc".to_string(),
            thread_id: None,
            max_bytes: 1024,
        }
    }

    fn client_with(
        transport: Arc<ScriptedTransport>,
    ) -> (WebhookClient, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = WebhookClient::new(transport, Arc::new(tx), RetryPolicy::default());
        (client, rx)
    }

    fn log_messages(rx: &mut mpsc::UnboundedReceiver<UploadEvent>) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let UploadEvent::Log(entry) = event {
                messages.push(entry.message);
            }
        }
        messages
    }

    fn image() -> PendingFile {
        PendingFile::new(vec![0u8; 16], "image/png", "shot.png")
    }

    #[test]
    fn test_build_upload_url() {
        assert_eq!(
            build_upload_url("https://h/api/webhooks/1/t", None),
            "https://h/api/webhooks/1/t"
        );
        assert_eq!(
            build_upload_url("https://h/api/webhooks/1/t", Some("  ")),
            "https://h/api/webhooks/1/t"
        );
        assert_eq!(
            build_upload_url("https://h/api/webhooks/1/t", Some(" 123 ")),
            "https://h/api/webhooks/1/t?thread_id=123"
        );
        assert_eq!(
            build_upload_url("https://h/api/webhooks/1/t?wait=true", Some("a b")),
            "https://h/api/webhooks/1/t?wait=true&thread_id=a%20b"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_logs_once() {
        let transport = ScriptedTransport::new(vec![reply(204, "")], reply(500, ""));
        let (client, mut rx) = client_with(transport.clone());

        let mut target = target();
        target.thread_id = Some("42".to_string());
        client.upload(&image(), "shot.png", &target).await.unwrap();

        assert_eq!(transport.call_count(), 1);
        assert_eq!(
            transport.calls.lock().unwrap()[0],
            "https://example.com/api/webhooks/1/abc?thread_id=42"
        );
        assert_eq!(log_messages(&mut rx), vec!["Sent: shot.png ✅".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_in_milliseconds_then_success() {
        let transport = ScriptedTransport::new(
            vec![reply(429, r#"{"retry_after": 2000}"#), reply(200, "{}")],
            reply(500, ""),
        );
        let (client, mut rx) = client_with(transport.clone());

        let started = Instant::now();
        client.upload(&image(), "shot.png", &target()).await.unwrap();

        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(2500), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(2600), "waited {:?}", waited);
        assert_eq!(transport.call_count(), 2);
        assert_eq!(
            log_messages(&mut rx),
            vec![
                "Rate limited: retrying in 2.0s...".to_string(),
                "Sent: shot.png ✅".to_string()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rate_limit_stops_after_six_attempts() {
        let transport = ScriptedTransport::new(vec![], reply(429, r#"{"retry_after": 1}"#));
        let (client, _rx) = client_with(transport.clone());

        let result = client.upload(&image(), "shot.png", &target()).await;

        assert!(matches!(
            result,
            Err(UploadError::RetryExhausted { attempts: 6 })
        ));
        assert_eq!(transport.call_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparsable_rate_limit_body_waits_default() {
        let transport =
            ScriptedTransport::new(vec![reply(429, "slow down"), reply(200, "")], reply(500, ""));
        let (client, _rx) = client_with(transport);

        let started = Instant::now();
        client.upload(&image(), "shot.png", &target()).await.unwrap();
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(5500), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(5600), "waited {:?}", waited);
    }

    async fn wait_after_rate_limit(body: &str) -> (Duration, Vec<String>) {
        let transport =
            ScriptedTransport::new(vec![reply(429, body), reply(200, "")], reply(500, ""));
        let (client, mut rx) = client_with(transport.clone());

        let started = Instant::now();
        client.upload(&image(), "shot.png", &target()).await.unwrap();
        assert_eq!(transport.call_count(), 2);

        (started.elapsed(), log_messages(&mut rx))
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_retry_after_waits_default() {
        let (waited, messages) = wait_after_rate_limit(r#"{"retry_after": -3}"#).await;

        assert!(waited >= Duration::from_millis(5500), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(5600), "waited {:?}", waited);
        assert_eq!(messages[0], "Rate limited: retrying in 5.0s...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_enormous_retry_after_is_capped() {
        let (waited, messages) = wait_after_rate_limit(r#"{"retry_after": 1e300}"#).await;

        assert!(waited >= Duration::from_millis(300_500), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(300_600), "waited {:?}", waited);
        assert_eq!(messages[0], "Rate limited: retrying in 300.0s...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_millisecond_retry_after_is_capped() {
        // 50,000 seconds once read as milliseconds
        let (waited, _) = wait_after_rate_limit(r#"{"retry_after": 50000000}"#).await;

        assert!(waited >= Duration::from_millis(300_500), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(300_600), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_status_fails_without_retry() {
        let transport = ScriptedTransport::new(vec![reply(404, "Unknown Webhook")], reply(200, ""));
        let (client, _rx) = client_with(transport.clone());

        let result = client.upload(&image(), "shot.png", &target()).await;

        match result {
            Err(UploadError::HttpStatus { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "Unknown Webhook");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_network_error() {
        let transport = ScriptedTransport::new(
            vec![Err("connection refused".to_string())],
            reply(200, ""),
        );
        let (client, _rx) = client_with(transport.clone());

        let result = client.upload(&image(), "shot.png", &target()).await;

        assert!(matches!(result, Err(UploadError::Network(ref m)) if m == "connection refused"));
        assert_eq!(transport.call_count(), 1);
    }
}
