use std::time::Duration;

/// Global judging limits, applied to compilation and archive extraction and
/// used as ceilings for per-submission limits. Times in seconds, sizes in
/// kilobytes.
#[derive(Clone, Debug)]
pub struct JudgeConfig {
    pub max_cpu_time_limit: f64,
    pub max_wall_time_limit: f64,
    pub max_stack_limit: i64,
    pub max_processes_and_or_threads: i64,
    pub max_memory_limit: i64,
    pub max_extract_size: i64,
    pub max_file_size: i64,
    pub callbacks_max_tries: usize,
    pub callbacks_timeout: Duration,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            max_cpu_time_limit: 15.0,
            max_wall_time_limit: 20.0,
            max_stack_limit: 128_000,
            max_processes_and_or_threads: 120,
            max_memory_limit: 512_000,
            max_extract_size: 10_240,
            max_file_size: 4_096,
            callbacks_max_tries: 3,
            callbacks_timeout: Duration::from_secs(5),
        }
    }
}
