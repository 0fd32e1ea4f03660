//! Configuration structures.
//!
//! Configuration is built from defaults, optionally deserialized from any
//! serde format, and can be overlaid with environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::{Error, Result};

/// Global scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Worker pool configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Defaults overlaid with `ACTOR_SCHEDULER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("ACTOR_SCHEDULER_WORKER_THREADS")? {
            config.scheduler.worker_threads = v;
        }
        if let Some(v) = env_parse::<usize>("ACTOR_SCHEDULER_BLOCKING_THREADS")? {
            config.scheduler.blocking_threads = v;
        }
        if let Some(v) = env_parse::<usize>("ACTOR_SCHEDULER_JOBS_PER_SLICE")? {
            config.scheduler.jobs_per_slice = v;
        }
        if let Ok(level) = std::env::var("ACTOR_SCHEDULER_LOG_LEVEL") {
            config.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("ACTOR_SCHEDULER_LOG_FORMAT") {
            config.observability.json_logs = format.eq_ignore_ascii_case("json");
        }

        config.scheduler.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("{key}: cannot parse '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of cooperative worker threads.
    pub worker_threads: usize,

    /// Maximum threads used by `poll_blocking` probes.
    pub blocking_threads: usize,

    /// Jobs one actor may run before its task is returned to the ready queue.
    pub jobs_per_slice: usize,

    /// Worker thread name prefix (`<prefix>-<n>`).
    pub thread_name_prefix: String,

    /// Back-off applied by idle workers.
    pub idle: IdleConfig,
}

impl SchedulerConfig {
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::config("worker_threads must be at least 1"));
        }
        if self.blocking_threads == 0 {
            return Err(Error::config("blocking_threads must be at least 1"));
        }
        if self.jobs_per_slice == 0 {
            return Err(Error::config("jobs_per_slice must be at least 1"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            blocking_threads: 4,
            jobs_per_slice: 64,
            thread_name_prefix: "actor-worker".to_string(),
            idle: IdleConfig::default(),
        }
    }
}

/// Idle strategy: spin, then yield, then park on the ready queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Busy polls of the ready queue before yielding.
    pub spin_iterations: u32,

    /// `thread::yield_now` rounds before parking.
    pub yield_iterations: u32,

    /// Upper bound on one park; workers re-check shutdown after each.
    #[serde(with = "humantime_serde")]
    pub park_timeout: Duration,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            spin_iterations: 100,
            yield_iterations: 10,
            park_timeout: Duration::from_millis(100),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.scheduler.worker_threads >= 1);
        assert_eq!(config.scheduler.jobs_per_slice, 64);
        assert_eq!(config.observability.log_level, "info");
        config.scheduler.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = SchedulerConfig::default().with_worker_threads(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = SchedulerConfig {
            jobs_per_slice: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SchedulerConfig {
            blocking_threads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "scheduler": {
                "worker_threads": 3,
                "idle": { "park_timeout": "250ms" }
            }
        }))
        .unwrap();

        assert_eq!(config.scheduler.worker_threads, 3);
        assert_eq!(config.scheduler.blocking_threads, 4);
        assert_eq!(config.scheduler.idle.park_timeout, Duration::from_millis(250));
        assert!(!config.observability.json_logs);
    }
}
