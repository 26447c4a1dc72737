use tokio::time::Duration;

/// How the webhook client reacts to 429 responses
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_rate_limit_retries: u32,
    pub default_retry_after: Duration,
    /// Longest wait honoured for a single 429, whatever the server says
    pub max_retry_after: Duration,
    pub skew_buffer: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 5,
            default_retry_after: Duration::from_secs(5),
            max_retry_after: Duration::from_secs(300),
            skew_buffer: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_rate_limit_retries: u32) -> Self {
        Self {
            max_rate_limit_retries,
            ..Self::default()
        }
    }

    pub fn is_exhausted(&self, state: &RetryState) -> bool {
        state.attempt > self.max_rate_limit_retries
    }

    /// Time to sleep before resending after a rate limit
    pub fn wait_for(&self, retry_after: Duration) -> Duration {
        retry_after + self.skew_buffer
    }

    /// Seconds the server asked us to wait, read from a 429 body.
    ///
    /// Values above 100 are assumed to be milliseconds. Servers disagree on
    /// the unit, so this is a best-effort guess rather than a protocol rule.
    /// The result never exceeds `max_retry_after`.
    pub fn parse_retry_after(&self, body: &str) -> Duration {
        let value = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| json.get("retry_after").and_then(|v| v.as_f64()))
            .filter(|secs| secs.is_finite() && *secs > 0.0);

        let Some(value) = value else {
            log::debug!("No usable retry_after in 429 body, using default");
            return self.default_retry_after;
        };

        let secs = if value > 100.0 { value / 1000.0 } else { value };
        match Duration::try_from_secs_f64(secs) {
            Ok(wait) if wait <= self.max_retry_after => wait,
            _ => {
                log::warn!(
                    "retry_after of {} is too long, waiting {:?} instead",
                    value,
                    self.max_retry_after
                );
                self.max_retry_after
            }
        }
    }
}

/// Per-upload bookkeeping, dropped once the upload resolves
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempt: u32,
    pub last_delay: Option<Duration>,
}

impl RetryState {
    pub fn record_rate_limit(&mut self, delay: Duration) {
        self.attempt += 1;
        self.last_delay = Some(delay);
    }
}
