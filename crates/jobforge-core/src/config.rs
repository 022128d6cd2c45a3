use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for jobforge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            dispatcher: DispatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> Result<Self, crate::Error> {
        use crate::Error;

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from environment
    pub fn from_env() -> Result<Self, crate::Error> {
        // Explicit path wins
        if let Ok(config_path) = std::env::var("JOBFORGE_CONFIG") {
            return Self::load(&config_path);
        }

        let default_paths = ["./config/default.toml", "/etc/jobforge/config.toml"];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        use crate::Error;

        if self.server.port == 0 {
            return Err(Error::Config("Invalid server port".to_string()));
        }

        if self.worker.max_workers == 0 {
            return Err(Error::Config("worker.max_workers must be > 0".to_string()));
        }

        if self.worker.min_workers > self.worker.max_workers {
            return Err(Error::Config(
                "worker.min_workers must not exceed worker.max_workers".to_string(),
            ));
        }

        if self.worker.default_timeout_ms == 0 {
            return Err(Error::Config(
                "worker.default_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.dispatcher.poll_interval_ms == 0 {
            return Err(Error::Config(
                "dispatcher.poll_interval_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Soft admission bound; enqueue past this logs a warning but is admitted
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of concurrent workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Workers kept alive when the queue is idle
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// Default per-job execution timeout
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Default number of retries after a failed execution
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            min_workers: default_min_workers(),
            default_timeout_ms: default_timeout_ms(),
            default_max_retries: default_max_retries(),
        }
    }
}

fn default_max_workers() -> usize {
    10
}

fn default_min_workers() -> usize {
    1
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Sleep between polls when the queue is empty
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Back-off when the worker pool is saturated
    #[serde(default = "default_capacity_backoff_ms")]
    pub capacity_backoff_ms: u64,

    /// Supervisor restart budget: max restarts per window
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Supervisor restart budget: rolling window length
    #[serde(default = "default_restart_window_secs")]
    pub restart_window_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            capacity_backoff_ms: default_capacity_backoff_ms(),
            max_restarts: default_max_restarts(),
            restart_window_secs: default_restart_window_secs(),
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn capacity_backoff(&self) -> Duration {
        Duration::from_millis(self.capacity_backoff_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_capacity_backoff_ms() -> u64 {
    5_000
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_window_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
