use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration};

use crate::errors::{AppError, AppResult};
use crate::image_processor;

use super::events::{emit_log, CycleSummary, EventSink, Severity, UploadEvent};
use super::progress_tracker::{ProgressReporter, ProgressState};
use super::types::{PendingFile, UploadTarget, RESIZED_MIME_TYPE};
use super::webhook_client::WebhookClient;

/// Pause between files so the webhook never sees a burst
pub const DEFAULT_INTER_FILE_DELAY: Duration = Duration::from_millis(1000);

/// FIFO backlog: append at the tail, take from the head
#[derive(Debug, Default)]
pub struct UploadQueue {
    items: VecDeque<PendingFile>,
}

impl UploadQueue {
    pub fn push_batch(&mut self, files: Vec<PendingFile>) -> usize {
        let count = files.len();
        self.items.extend(files);
        count
    }

    pub fn pop_front(&mut self) -> Option<PendingFile> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStep {
    /// One file went through the pipeline
    Processed,
    /// Queue was empty; counters were reset
    Idle,
}

/// Sequential drain loop: one file in flight, ever
pub struct QueueProcessor {
    queue: UploadQueue,
    progress: ProgressState,
    reporter: ProgressReporter,
    summary: CycleSummary,
    client: WebhookClient,
    target: watch::Receiver<UploadTarget>,
    events: Arc<dyn EventSink>,
    inter_file_delay: Duration,
    inbox: Option<mpsc::UnboundedReceiver<Vec<PendingFile>>>,
}

impl QueueProcessor {
    pub fn new(
        client: WebhookClient,
        target: watch::Receiver<UploadTarget>,
        events: Arc<dyn EventSink>,
        inter_file_delay: Duration,
    ) -> Self {
        Self {
            queue: UploadQueue::default(),
            progress: ProgressState::default(),
            reporter: ProgressReporter::new(events.clone()),
            summary: CycleSummary::default(),
            client,
            target,
            events,
            inter_file_delay,
            inbox: None,
        }
    }

    pub fn enqueue(&mut self, files: Vec<PendingFile>) -> usize {
        let count = self.queue.push_batch(files);
        self.progress.record_enqueued(count);
        log::debug!(
            "Enqueued {} file(s), {} pending, {} this cycle",
            count,
            self.queue.len(),
            self.progress.total_enqueued
        );
        count
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Pull in batches submitted through a `QueueHandle` since the last look
    fn absorb_submissions(&mut self) {
        let mut batches = Vec::new();
        if let Some(inbox) = self.inbox.as_mut() {
            while let Ok(files) = inbox.try_recv() {
                batches.push(files);
            }
        }
        for files in batches {
            self.enqueue(files);
        }
    }

    pub async fn drain_step(&mut self) -> DrainStep {
        self.absorb_submissions();

        if self.queue.is_empty() {
            self.finish_cycle();
            return DrainStep::Idle;
        }

        self.progress.is_active = true;
        self.reporter.report_pending(&self.progress);

        let Some(file) = self.queue.pop_front() else {
            return DrainStep::Idle;
        };
        let display_name = file.display_name.clone();
        let target = self.target.borrow().clone();

        match self.process_file(file, &target).await {
            Ok(()) => self.summary.succeeded += 1,
            Err(e) => {
                self.summary.failed += 1;
                emit_log(
                    self.events.as_ref(),
                    format!("Error: {} - {}", display_name, e),
                    Severity::Error,
                );
            }
        }

        self.progress.record_completed();
        self.absorb_submissions();
        self.reporter.report_completed(&self.progress);

        sleep(self.inter_file_delay).await;
        DrainStep::Processed
    }

    /// Run drain steps until the queue is empty
    pub async fn drain(&mut self) {
        while self.drain_step().await == DrainStep::Processed {}
    }

    async fn process_file(&self, file: PendingFile, target: &UploadTarget) -> AppResult<()> {
        emit_log(
            self.events.as_ref(),
            format!("Processing: {}", file.display_name),
            Severity::Muted,
        );

        let upload = if file.len() > target.max_bytes {
            emit_log(
                self.events.as_ref(),
                format!(
                    "Resizing ({:.1}MB -> {:.1}MB or less)",
                    megabytes(file.len()),
                    megabytes(target.max_bytes)
                ),
                Severity::Warning,
            );

            let resized = image_processor::fit_to_size(&file.bytes, target.max_bytes).await?;
            log::info!(
                "Resized {} from {} to {} bytes ({}x{}, {} passes)",
                file.display_name,
                file.len(),
                resized.bytes.len(),
                resized.width,
                resized.height,
                resized.passes
            );
            file.with_content(resized.bytes, RESIZED_MIME_TYPE)
        } else {
            file
        };

        self.client
            .upload(&upload, &upload.display_name, target)
            .await?;
        Ok(())
    }

    fn finish_cycle(&mut self) {
        let summary = std::mem::take(&mut self.summary);

        self.progress.reset();
        self.reporter.reset();
        emit_log(self.events.as_ref(), "All uploads finished.", Severity::Success);

        log::info!(
            "Drain cycle complete: {} sent, {} failed",
            summary.succeeded,
            summary.failed
        );
        self.events.emit(UploadEvent::Completed(summary));
    }

    /// Move the processor onto its own task and hand back a submission handle
    pub fn spawn(mut self) -> QueueHandle {
        let (sender, inbox) = mpsc::unbounded_channel();
        let handle = QueueHandle {
            sender,
            target: self.target.clone(),
            events: self.events.clone(),
        };

        self.inbox = Some(inbox);
        tokio::spawn(self.run());
        handle
    }

    async fn run(mut self) {
        log::info!("Upload queue started");

        loop {
            if self.queue.is_empty() {
                let batch = match self.inbox.as_mut() {
                    Some(inbox) => inbox.recv().await,
                    None => None,
                };
                match batch {
                    Some(files) => {
                        self.enqueue(files);
                    }
                    None => break,
                }
            }

            self.drain().await;
        }

        log::info!("Upload queue stopped");
    }
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

/// Producer side of a running queue; cheap to clone
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::UnboundedSender<Vec<PendingFile>>,
    target: watch::Receiver<UploadTarget>,
    events: Arc<dyn EventSink>,
}

impl QueueHandle {
    /// Accept a batch of candidates, keeping only images.
    ///
    /// Refuses the whole batch when no endpoint is configured. Returns how
    /// many files were queued.
    pub fn submit(&self, candidates: Vec<PendingFile>) -> AppResult<usize> {
        if !self.target.borrow().has_endpoint() {
            return Err(AppError::MissingEndpoint);
        }

        let offered = candidates.len();
        let images: Vec<PendingFile> = candidates.into_iter().filter(|f| f.is_image()).collect();
        let accepted = images.len();

        if accepted == 0 {
            emit_log(self.events.as_ref(), "No image files selected.", Severity::Error);
            return Ok(0);
        }
        if accepted < offered {
            log::debug!("Skipped {} non-image file(s)", offered - accepted);
        }

        emit_log(
            self.events.as_ref(),
            format!("--- Accepted {} image(s) ---", accepted),
            Severity::Accent,
        );
        self.sender.send(images).map_err(|_| AppError::QueueClosed)?;
        Ok(accepted)
    }
}
