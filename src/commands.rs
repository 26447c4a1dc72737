use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::config::{self, Config};
use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;
use crate::uploader::events::{CycleSummary, EventSink, UploadEvent};
use crate::uploader::types::{PendingFile, UploadTarget};
use crate::uploader::upload_queue::{QueueHandle, QueueProcessor};
use crate::uploader::webhook_client::{ReqwestTransport, WebhookClient};

/// Settings given on the command line for one run
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub webhook_url: Option<String>,
    pub thread_id: Option<String>,
    pub max_file_size_mb: Option<f64>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &Config) -> Config {
        let mut merged = config.clone();
        if let Some(url) = &self.webhook_url {
            merged.webhook_url = Some(url.trim().to_string());
        }
        if let Some(thread_id) = &self.thread_id {
            merged.thread_id = Some(thread_id.trim().to_string());
        }
        if let Some(size) = self.max_file_size_mb {
            merged.max_file_size_mb = size;
        }
        merged
    }
}

/// Read dropped paths into memory; unreadable ones are skipped with a warning
pub async fn collect_candidates(paths: &[PathBuf]) -> Vec<PendingFile> {
    let mut candidates = Vec::with_capacity(paths.len());

    for path in paths {
        match PendingFile::from_path(path).await {
            Ok(file) => candidates.push(file),
            Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
        }
    }

    candidates
}

/// Build the HTTP client and queue processor for `config`, and start it
pub fn start_queue(
    config: &Config,
    target: watch::Receiver<UploadTarget>,
    events: Arc<dyn EventSink>,
) -> AppResult<QueueHandle> {
    let transport = ReqwestTransport::new(config.request_timeout())?;
    let client = WebhookClient::new(Arc::new(transport), events.clone(), config.retry_policy());

    Ok(QueueProcessor::new(client, target, events, config.inter_file_delay()).spawn())
}

/// Upload `paths` with `config`, handing every event to `render` until the
/// queue drains.
pub async fn upload_files<F>(config: &Config, paths: &[PathBuf], mut render: F) -> AppResult<CycleSummary>
where
    F: FnMut(&UploadEvent),
{
    config::validate_config(config)?;
    let target = config.upload_target();
    if !target.has_endpoint() {
        return Err(AppError::MissingEndpoint);
    }
    InputValidator::validate_endpoint_url(&target.endpoint_url)?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (_target_tx, target_rx) = watch::channel(target);
    let queue = start_queue(config, target_rx, Arc::new(events_tx))?;

    let candidates = collect_candidates(paths).await;
    let accepted = queue.submit(candidates)?;
    drop(queue);

    if accepted == 0 {
        while let Ok(event) = events_rx.try_recv() {
            render(&event);
        }
        return Ok(CycleSummary::default());
    }

    while let Some(event) = events_rx.recv().await {
        render(&event);
        if let UploadEvent::Completed(summary) = event {
            return Ok(summary);
        }
    }

    Err(AppError::QueueClosed)
}

pub fn show_config() -> AppResult<String> {
    show_config_at(&config::get_config_path()?)
}

/// Pretty JSON of the saved settings, shown even when they fail validation
pub fn show_config_at(config_path: &Path) -> AppResult<String> {
    let config = config::read_config_from(config_path)?;
    if let Err(e) = config::validate_config(&config) {
        log::warn!("Saved configuration is invalid: {}", e);
    }
    Ok(serde_json::to_string_pretty(&config)?)
}

pub fn update_config(overrides: &ConfigOverrides) -> AppResult<Config> {
    update_config_at(&config::get_config_path()?, overrides)
}

/// Merge `overrides` into the saved settings; the result must validate
pub fn update_config_at(config_path: &Path, overrides: &ConfigOverrides) -> AppResult<Config> {
    let config = overrides.apply(&config::read_config_from(config_path)?);
    config::save_config_to(config_path, &config)?;
    Ok(config)
}

pub fn reset_config() -> AppResult<()> {
    config::reset_config()
}
