//! Engine configuration.
//!
//! Registration is call-time only; this covers the runtime knobs of the
//! worker side.

use std::time::Duration;

use thiserror::Error;

/// Exponential back-off used while the store or queue is unavailable.
///
/// delay = base_delay * multiplier^(attempts - 1), capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Backoff {
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Delay before the next try, given the number of consecutive failures
    /// so far (1-indexed; 0 is treated like 1).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exp = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base_secs * self.multiplier.powi(exp);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), 2.0, Duration::from_secs(30))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Worker loops spawned by `JobManager::spawn_workers`.
    pub workers: usize,
    /// How long one dequeue may block.
    pub dequeue_timeout: Duration,
    /// Period of the pending-job sweep; `None` disables it.
    pub sweep_interval: Option<Duration>,
    /// Max signals re-enqueued per sweep.
    pub sweep_batch: usize,
    pub backoff: Backoff,
    /// Failed completion writes after which retries are logged as errors.
    /// Completions are retried until they land or shutdown is requested.
    pub completion_alert_after: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            dequeue_timeout: Duration::from_millis(500),
            sweep_interval: Some(Duration::from_secs(30)),
            sweep_batch: 1000,
            backoff: Backoff::default(),
            completion_alert_after: 5,
        }
    }
}

impl EngineConfig {
    pub const ENV_WORKERS: &'static str = "SLOWQ_WORKERS";
    pub const ENV_DEQUEUE_TIMEOUT_MS: &'static str = "SLOWQ_DEQUEUE_TIMEOUT_MS";
    pub const ENV_SWEEP_INTERVAL_MS: &'static str = "SLOWQ_SWEEP_INTERVAL_MS";

    /// Defaults overridden by `SLOWQ_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env` with an explicit variable source.
    ///
    /// `SLOWQ_SWEEP_INTERVAL_MS=0` disables the sweep.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = lookup(Self::ENV_WORKERS) {
            let workers = parse_u64(Self::ENV_WORKERS, &v)?;
            if workers == 0 {
                return Err(ConfigError::Invalid {
                    var: Self::ENV_WORKERS,
                    value: v,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.workers = workers as usize;
        }
        if let Some(v) = lookup(Self::ENV_DEQUEUE_TIMEOUT_MS) {
            let ms = parse_u64(Self::ENV_DEQUEUE_TIMEOUT_MS, &v)?;
            config.dequeue_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup(Self::ENV_SWEEP_INTERVAL_MS) {
            let ms = parse_u64(Self::ENV_SWEEP_INTERVAL_MS, &v)?;
            config.sweep_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_completion_alert_after(mut self, attempts: u32) -> Self {
        self.completion_alert_after = attempts.max(1);
        self
    }
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
