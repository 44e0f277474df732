//! Bounded execution pool: N worker tasks dispatching jobs from a bounded
//! queue onto idle sandbox containers.
//!
//! Admission control is the caller's backpressure signal: a full queue
//! rejects synchronously with an empty result. Each accepted job delivers
//! exactly one `JobResult` over its capacity-1 sink, and every job path
//! returns its container to `Idle` or marks it `Error` for the monitor to
//! reap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use common::JobResult;
use common::language::Language;

use crate::container::{ContainerError, ContainerManager, ContainerState};
use crate::queue::JobQueue;
use crate::runtime::ContainerRuntime;

/// Default upper bound on a single in-container execution.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct WorkerPoolOptions {
    pub max_workers: usize,
    pub memory_limit_bytes: i64,
    pub cpu_nano_limit: i64,
    pub max_job_count: usize,
    pub query_timeout: Duration,
    pub monitor_interval: Duration,
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        Self {
            max_workers: 5,
            memory_limit_bytes: 6 * 1024 * 1024,
            cpu_nano_limit: 1000,
            max_job_count: 3,
            query_timeout: QUERY_TIMEOUT,
            monitor_interval: Duration::from_secs(30),
        }
    }
}

/// A single queued unit of execution.
struct Job {
    language: Language,
    code: String,
    stdin: Option<String>,
    result: oneshot::Sender<JobResult>,
}

/// Anything that can run a (language, code, stdin) job to completion.
/// The room engine depends on this seam rather than on the pool directly.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, language: Language, code: String, stdin: Option<String>) -> JobResult;
}

pub struct WorkerPool {
    manager: Arc<ContainerManager>,
    queue: Arc<JobQueue<Job>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Builds the container pool and spawns `max_workers` dispatch tasks plus
    /// the container health monitor.
    pub async fn new(
        runtime: Arc<dyn ContainerRuntime>,
        opts: WorkerPoolOptions,
    ) -> Result<Arc<Self>, ContainerError> {
        let manager = Arc::new(ContainerManager::new(
            runtime.clone(),
            opts.max_workers,
            opts.memory_limit_bytes,
            opts.cpu_nano_limit,
        ));
        manager.initialize_pool().await?;

        let queue = Arc::new(JobQueue::new(opts.max_job_count));
        let shutdown = CancellationToken::new();

        for worker_id in 1..=opts.max_workers {
            tokio::spawn(worker_loop(
                worker_id,
                manager.clone(),
                runtime.clone(),
                queue.clone(),
                shutdown.clone(),
                opts.query_timeout,
            ));
        }

        {
            let manager = manager.clone();
            let cancel = shutdown.clone();
            let interval = opts.monitor_interval;
            tokio::spawn(async move { manager.monitor(interval, cancel).await });
        }

        info!(max_workers = opts.max_workers, "initialized worker pool");

        Ok(Arc::new(Self {
            manager,
            queue,
            shutdown,
        }))
    }

    /// Stops the workers and the monitor and removes every container.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.queue.close();
        self.manager.shutdown().await;
    }

    /// Current number of queued (not yet picked up) jobs.
    pub fn queued_jobs(&self) -> usize {
        self.queue.len()
    }
}

#[async_trait]
impl JobExecutor for WorkerPool {
    /// Submits a job. Full queue ⇒ immediate empty result (shed load);
    /// otherwise the caller blocks on the job's result sink.
    async fn execute(&self, language: Language, code: String, stdin: Option<String>) -> JobResult {
        info!(language = %language.name, "submitting job");

        let (tx, rx) = oneshot::channel();
        let job = Job {
            language,
            code,
            stdin,
            result: tx,
        };

        if let Err(job) = self.queue.try_push(job) {
            warn!(language = %job.language.name, "job queue is full, rejecting job");
            return JobResult::rejected();
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => JobResult::failed(String::new(), "worker dropped the job", 0),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    manager: Arc<ContainerManager>,
    runtime: Arc<dyn ContainerRuntime>,
    queue: Arc<JobQueue<Job>>,
    shutdown: CancellationToken,
    query_timeout: Duration,
) {
    info!(worker_id, "worker started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(worker_id, "worker received shutdown signal");
                break;
            }
            job = queue.pop() => {
                let Some(job) = job else {
                    info!(worker_id, "worker shutting down, queue closed");
                    break;
                };
                execute_job(worker_id, &manager, runtime.as_ref(), job, query_timeout).await;
            }
        }
    }
}

/// Runs one job on an idle container and delivers its result.
async fn execute_job(
    worker_id: usize,
    manager: &ContainerManager,
    runtime: &dyn ContainerRuntime,
    job: Job,
    query_timeout: Duration,
) {
    let Job {
        language,
        code,
        stdin,
        result,
    } = job;

    let container_id = match manager.get_available_container().await {
        Ok(id) => id,
        Err(e) => {
            error!(worker_id, err = %e, "failed to get available container");
            deliver(worker_id, result, JobResult::failed(String::new(), e.to_string(), 0));
            return;
        }
    };

    let run_cmd = render_run_cmd(&language.run_cmd, &code);
    let start = Instant::now();
    let outcome = tokio::time::timeout(
        query_timeout,
        runtime.exec(&container_id, &run_cmd, stdin.as_deref()),
    )
    .await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let job_result = match outcome {
        Err(_) => {
            error!(
                worker_id,
                container_id = %container_id,
                duration_ms,
                lang = %language.name,
                "job exceeded execution timeout"
            );
            set_state(manager, &container_id, ContainerState::Error);
            JobResult::failed(String::new(), "execution timed out", duration_ms)
        }
        Ok(Err(e)) => {
            error!(
                worker_id,
                container_id = %container_id,
                duration_ms,
                lang = %language.name,
                err = %e,
                "worker job failed"
            );
            set_state(manager, &container_id, ContainerState::Error);
            JobResult::failed(String::new(), e.to_string(), duration_ms)
        }
        Ok(Ok(output)) => {
            set_state(manager, &container_id, ContainerState::Idle);
            if output.exit_code == 0 {
                info!(
                    worker_id,
                    container_id = %container_id,
                    duration_ms,
                    lang = %language.name,
                    "worker job completed"
                );
                JobResult::succeeded(output.stdout, duration_ms)
            } else {
                JobResult::failed(
                    output.stderr,
                    format!("exited with code {}", output.exit_code),
                    duration_ms,
                )
            }
        }
    };

    deliver(worker_id, result, job_result);
}

fn deliver(worker_id: usize, sink: oneshot::Sender<JobResult>, result: JobResult) {
    if sink.send(result).is_err() {
        warn!(worker_id, "job result receiver dropped");
    }
}

fn set_state(manager: &ContainerManager, id: &str, state: ContainerState) {
    if let Err(e) = manager.set_container_state(id, state) {
        // The monitor may already have reaped it.
        warn!(container_id = %id, err = %e, "could not update container state");
    }
}

/// Substitutes the submitted code into the language's run template, escaping
/// single quotes so the payload survives `sh -c '...'`.
fn render_run_cmd(template: &str, code: &str) -> String {
    let escaped = code.replace('\'', "'\\''");
    template.replacen("%s", &escaped, 1)
}
