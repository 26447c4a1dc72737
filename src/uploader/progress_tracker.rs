use std::sync::Arc;

use super::events::{EventSink, UploadEvent};

/// Aggregate counters for the current drain cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressState {
    pub total_enqueued: usize,
    pub completed: usize,
    pub is_active: bool,
}

impl ProgressState {
    /// Rounded percent of attempted files; 0 while nothing is enqueued
    pub fn percent(&self) -> u8 {
        if self.total_enqueued == 0 {
            return 0;
        }
        let ratio = self.completed as f64 / self.total_enqueued as f64;
        (ratio * 100.0).round().clamp(0.0, 100.0) as u8
    }

    pub fn record_enqueued(&mut self, count: usize) {
        self.total_enqueued += count;
    }

    pub fn record_completed(&mut self) {
        self.completed = (self.completed + 1).min(self.total_enqueued);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Forwards progress to the event sink: one event when a cycle starts or
/// grows, then one per completed file
pub struct ProgressReporter {
    events: Arc<dyn EventSink>,
    reported_total: Option<usize>,
}

impl ProgressReporter {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            events,
            reported_total: None,
        }
    }

    /// Percent before an attempt; skipped unless the cycle just started or
    /// more files joined since the last event
    pub fn report_pending(&mut self, state: &ProgressState) {
        if self.reported_total == Some(state.total_enqueued) {
            return;
        }
        self.emit(state);
    }

    /// Percent after a file resolved, success or not
    pub fn report_completed(&mut self, state: &ProgressState) {
        self.emit(state);
    }

    fn emit(&mut self, state: &ProgressState) {
        let percent = state.percent();
        log::debug!(
            "Progress: {}% ({}/{})",
            percent,
            state.completed,
            state.total_enqueued
        );
        self.reported_total = Some(state.total_enqueued);
        self.events.emit(UploadEvent::Progress(percent));
    }

    /// Queue drained: bar goes back to zero and the next cycle starts fresh
    pub fn reset(&mut self) {
        self.reported_total = None;
        self.events.emit(UploadEvent::ProgressReset);
    }
}
