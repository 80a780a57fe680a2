//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for per-job scratch space
    pub work_dir: String,
    /// Age after which a `processing` row becomes claimable by any worker
    pub stall_horizon: Duration,
    /// How often the renewal companion refreshes the lease
    pub lease_renew_interval: Duration,
    /// Blocking pop timeout on the pending queue
    pub queue_pop_timeout: Duration,
    /// Delays applied before successive retries; the last entry repeats
    pub backoff_schedule: Vec<Duration>,
    /// How often the sweeper scans for stalled and undispatched jobs
    pub sweeper_interval: Duration,
    /// Default retry budget for newly created jobs
    pub max_retries_default: i32,
    /// How often the queue-depth gauges are refreshed
    pub metrics_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().to_string_lossy().to_string(),
            stall_horizon: Duration::from_secs(600),
            lease_renew_interval: Duration::from_secs(120),
            queue_pop_timeout: Duration::from_secs(5),
            backoff_schedule: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
            sweeper_interval: Duration::from_secs(60),
            max_retries_default: 3,
            metrics_interval: Duration::from_secs(15),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            stall_horizon: env_secs("STALL_HORIZON_SECS", defaults.stall_horizon),
            lease_renew_interval: env_secs(
                "LEASE_RENEW_INTERVAL_SECS",
                defaults.lease_renew_interval,
            ),
            queue_pop_timeout: env_secs("QUEUE_POP_TIMEOUT_SECS", defaults.queue_pop_timeout),
            backoff_schedule: std::env::var("BACKOFF_SCHEDULE_SECS")
                .ok()
                .and_then(|s| parse_backoff(&s))
                .unwrap_or(defaults.backoff_schedule),
            sweeper_interval: env_secs("SWEEPER_INTERVAL_SECS", defaults.sweeper_interval),
            max_retries_default: std::env::var("MAX_RETRIES_DEFAULT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries_default),
            metrics_interval: env_secs("METRICS_INTERVAL_SECS", defaults.metrics_interval),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Parse a comma-separated list of delays in seconds, e.g. `10,30,60`.
fn parse_backoff(raw: &str) -> Option<Vec<Duration>> {
    let schedule: Vec<Duration> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok().map(Duration::from_secs))
        .collect();

    if schedule.is_empty() {
        None
    } else {
        Some(schedule)
    }
}
