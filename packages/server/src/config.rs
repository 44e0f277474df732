use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use executor::WorkerPoolOptions;
use executor::judge::JudgeConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    pub max_workers: usize,
    /// Per-container memory cap, in megabytes.
    pub memory_limit_mb: i64,
    /// Per-container CPU quota, in milli-CPUs (1000 = one full core).
    pub cpu_nano_limit: i64,
    pub max_job_count: usize,
    pub query_timeout_secs: u64,
    pub monitor_interval_secs: u64,
}

impl PoolConfig {
    pub fn pool_options(&self) -> WorkerPoolOptions {
        WorkerPoolOptions {
            max_workers: self.max_workers,
            memory_limit_bytes: self.memory_limit_mb * 1024 * 1024,
            cpu_nano_limit: self.cpu_nano_limit,
            max_job_count: self.max_job_count,
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            monitor_interval: Duration::from_secs(self.monitor_interval_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubmissionConfig {
    /// Maximum accepted source length, in bytes.
    pub max_code_length: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JudgeSettings {
    pub max_cpu_time_limit: f64,
    pub max_wall_time_limit: f64,
    pub max_stack_limit: i64,
    pub max_processes_and_or_threads: i64,
    pub max_memory_limit: i64,
    pub max_extract_size: i64,
    pub max_file_size: i64,
    pub callbacks_max_tries: usize,
    pub callbacks_timeout_secs: u64,
}

impl JudgeSettings {
    pub fn judge_config(&self) -> JudgeConfig {
        JudgeConfig {
            max_cpu_time_limit: self.max_cpu_time_limit,
            max_wall_time_limit: self.max_wall_time_limit,
            max_stack_limit: self.max_stack_limit,
            max_processes_and_or_threads: self.max_processes_and_or_threads,
            max_memory_limit: self.max_memory_limit,
            max_extract_size: self.max_extract_size,
            max_file_size: self.max_file_size,
            callbacks_max_tries: self.callbacks_max_tries,
            callbacks_timeout: Duration::from_secs(self.callbacks_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub submission: SubmissionConfig,
    pub judge: JudgeSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("pool.max_workers", 5)?
            .set_default("pool.memory_limit_mb", 6_i64)?
            .set_default("pool.cpu_nano_limit", 1000_i64)?
            .set_default("pool.max_job_count", 3)?
            .set_default("pool.query_timeout_secs", 30)?
            .set_default("pool.monitor_interval_secs", 30)?
            .set_default("submission.max_code_length", 65_536_i64)?
            .set_default("judge.max_cpu_time_limit", 15.0)?
            .set_default("judge.max_wall_time_limit", 20.0)?
            .set_default("judge.max_stack_limit", 128_000_i64)?
            .set_default("judge.max_processes_and_or_threads", 120_i64)?
            .set_default("judge.max_memory_limit", 512_000_i64)?
            .set_default("judge.max_extract_size", 10_240_i64)?
            .set_default("judge.max_file_size", 4_096_i64)?
            .set_default("judge.callbacks_max_tries", 3)?
            .set_default("judge.callbacks_timeout_secs", 5)?
            // Load from config/config.toml when present
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g. ARENA__SERVER__PORT)
            .add_source(Environment::with_prefix("ARENA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pool.max_workers, 5);
        assert_eq!(config.pool.max_job_count, 3);
        assert_eq!(config.judge.callbacks_max_tries, 3);
    }

    #[test]
    fn pool_options_convert_units() {
        let config = AppConfig::load().unwrap();
        let opts = config.pool.pool_options();
        assert_eq!(opts.memory_limit_bytes, 6 * 1024 * 1024);
        assert_eq!(opts.query_timeout, Duration::from_secs(30));
    }
}
