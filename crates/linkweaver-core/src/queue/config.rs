use std::time::Duration;

const DEFAULT_WORKERS: usize = 10;
const DEFAULT_IDLE_BACKOFF_MS: u64 = 1_000;
const MIN_IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrent worker loops (at least 1).
    pub workers: usize,

    /// Sleep between polls when no queued task exists.
    pub idle_backoff: Duration,

    /// Keep idle workers polling after the run has drained.
    /// When false, an idle worker exits once nothing is queued or processing.
    pub keep_warm: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            idle_backoff: Duration::from_millis(DEFAULT_IDLE_BACKOFF_MS),
            keep_warm: false,
        }
    }
}

impl PoolConfig {
    /// Reads `LINKWEAVER_WORKERS`, `LINKWEAVER_IDLE_BACKOFF_MS` and
    /// `LINKWEAVER_KEEP_WARM`. Invalid values keep the defaults; a zero backoff counts as invalid.
    pub fn from_env() -> Self {
        let workers = std::env::var("LINKWEAVER_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_WORKERS)
            .max(1);

        let idle_backoff = idle_backoff_from(std::env::var("LINKWEAVER_IDLE_BACKOFF_MS").ok());

        let keep_warm = std::env::var("LINKWEAVER_KEEP_WARM")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            workers,
            idle_backoff,
            keep_warm,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Never below 1ms; a zero backoff turns idle polling into a busy loop.
    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff.max(MIN_IDLE_BACKOFF);
        self
    }

    pub fn with_keep_warm(mut self, keep_warm: bool) -> Self {
        self.keep_warm = keep_warm;
        self
    }
}

fn idle_backoff_from(raw: Option<String>) -> Duration {
    let ms = raw
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_IDLE_BACKOFF_MS);
    Duration::from_millis(ms)
}
