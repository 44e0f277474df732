//! Lifecycle and state machine for the pool of sandbox worker containers.
//!
//! A single mutex guards the container table. Calls out to the container
//! engine happen with the lock released; the table is re-locked afterwards to
//! record the result.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::runtime::{ContainerRuntime, CreateContainerOpts, RuntimeError};

/// Image tag identifying sandbox worker containers.
pub const WORKER_IMAGE: &str = "worker";

const MAX_RETRIES: usize = 10;
const RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("no idle container available")]
    NoIdleContainer,

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerState {
    /// Registered and ready to take a job.
    Idle,
    /// Executing exactly one job.
    Busy,
    /// Failed health; removed on the next monitor tick.
    Error,
    /// Observed running in the engine but not yet registered.
    Running,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Error => "error",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct ContainerInfo {
    pub id: String,
    pub state: ContainerState,
    /// When the container was last handed to a job.
    pub assigned_at: Option<Instant>,
}

pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    containers: Mutex<HashMap<String, ContainerInfo>>,
    max_workers: usize,
    memory_limit_bytes: i64,
    cpu_nano_limit: i64,
}

impl ContainerManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        max_workers: usize,
        memory_limit_bytes: i64,
        cpu_nano_limit: i64,
    ) -> Self {
        Self {
            runtime,
            containers: Mutex::new(HashMap::new()),
            max_workers,
            memory_limit_bytes,
            cpu_nano_limit,
        }
    }

    /// Registers every existing worker container (those not running are
    /// marked `Error`), then balances the pool up or down to `max_workers`.
    pub async fn initialize_pool(&self) -> Result<(), ContainerError> {
        let existing = self.runtime.list_containers().await?;

        for c in existing.iter().filter(|c| c.image == WORKER_IMAGE) {
            let state = if c.running {
                ContainerState::Idle
            } else {
                ContainerState::Error
            };

            self.containers.lock().unwrap().insert(
                c.id.clone(),
                ContainerInfo {
                    id: c.id.clone(),
                    state,
                    assigned_at: None,
                },
            );

            info!(container_id = %c.id, state = %state, "worker container found");
        }

        self.balance().await
    }

    /// Restores the invariant `registered count == max_workers`.
    pub async fn balance(&self) -> Result<(), ContainerError> {
        let current = self.containers.lock().unwrap().len();

        if current < self.max_workers {
            let needed = self.max_workers - current;
            info!(current, limit = self.max_workers, needed, "pool below limit, creating workers");
            for _ in 0..needed {
                self.start_container().await?;
            }
        } else if current > self.max_workers {
            let excess = current - self.max_workers;
            warn!(current, limit = self.max_workers, excess, "pool beyond limit, removing workers");
            self.remove_excess(excess).await?;
        }

        Ok(())
    }

    /// Creates and starts a new sandbox worker, registering it as `Idle`.
    pub async fn start_container(&self) -> Result<(), ContainerError> {
        let opts = CreateContainerOpts {
            image: WORKER_IMAGE.to_string(),
            memory_bytes: self.memory_limit_bytes,
            nano_cpus: self.cpu_nano_limit * 1_000_000,
            network_disabled: true,
            tty: true,
        };

        let id = self.runtime.create_container(&opts).await.map_err(|e| {
            error!(err = %e, "failed to create container");
            e
        })?;

        self.runtime.start_container(&id).await.map_err(|e| {
            error!(container_id = %id, err = %e, "failed to start container");
            e
        })?;

        self.containers.lock().unwrap().insert(
            id.clone(),
            ContainerInfo {
                id: id.clone(),
                state: ContainerState::Idle,
                assigned_at: None,
            },
        );
        info!(container_id = %id, "container started");

        Ok(())
    }

    async fn remove_excess(&self, amount: usize) -> Result<(), ContainerError> {
        let victims: Vec<String> = {
            let containers = self.containers.lock().unwrap();
            containers.keys().take(amount).cloned().collect()
        };

        for id in victims {
            self.remove_container(&id).await?;
        }
        Ok(())
    }

    /// Force-removes the container from the engine and drops it from the table.
    pub async fn remove_container(&self, id: &str) -> Result<(), ContainerError> {
        self.runtime.remove_container(id).await.map_err(|e| {
            error!(container_id = %id, err = %e, "failed to remove container");
            e
        })?;

        self.containers.lock().unwrap().remove(id);
        Ok(())
    }

    /// Periodic health sweep: any registered container that is gone, not
    /// running, or marked `Error` is reaped, then the pool is rebalanced.
    /// Runs until `cancel` fires.
    pub async fn monitor(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.check_health().await,
            }
        }
    }

    async fn check_health(&self) {
        let listed = match self.runtime.list_containers().await {
            Ok(listed) => listed,
            Err(e) => {
                error!(err = %e, "failed to list containers");
                return;
            }
        };

        let running: HashMap<&str, bool> = listed
            .iter()
            .filter(|c| c.image == WORKER_IMAGE && c.running)
            .map(|c| (c.id.as_str(), true))
            .collect();

        let stale: Vec<String> = {
            let containers = self.containers.lock().unwrap();
            containers
                .values()
                .filter(|info| {
                    !running.contains_key(info.id.as_str())
                        || info.state == ContainerState::Error
                })
                .map(|info| info.id.clone())
                .collect()
        };

        for id in stale {
            warn!(container_id = %id, "container unhealthy, removing");
            if let Err(e) = self.remove_container(&id).await {
                error!(container_id = %id, err = %e, "failed to remove container, continuing");
                // Drop it from the table anyway so it cannot be assigned.
                self.containers.lock().unwrap().remove(&id);
            }
        }

        if let Err(e) = self.balance().await {
            error!(err = %e, "failed to rebalance pool after health sweep");
        }
    }

    /// Atomically claims an `Idle` container, flipping it to `Busy`. Retries
    /// with a fixed delay while everything is busy; once retries are
    /// exhausted the caller gets an explicit `NoIdleContainer` error.
    pub async fn get_available_container(&self) -> Result<String, ContainerError> {
        for _ in 0..MAX_RETRIES {
            {
                let mut containers = self.containers.lock().unwrap();
                if let Some(info) = containers
                    .values_mut()
                    .find(|info| info.state == ContainerState::Idle)
                {
                    info.state = ContainerState::Busy;
                    info.assigned_at = Some(Instant::now());
                    info!(container_id = %info.id, "container assigned to job");
                    return Ok(info.id.clone());
                }
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }

        Err(ContainerError::NoIdleContainer)
    }

    pub fn set_container_state(
        &self,
        id: &str,
        state: ContainerState,
    ) -> Result<(), ContainerError> {
        let mut containers = self.containers.lock().unwrap();
        let info = containers
            .get_mut(id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;

        info.state = state;
        if state != ContainerState::Busy {
            info.assigned_at = None;
        }
        info!(container_id = %id, state = %state, "container state set");

        Ok(())
    }

    /// Removes every registered container.
    pub async fn shutdown(&self) {
        info!("shutting down all containers");

        let ids: Vec<String> = self.containers.lock().unwrap().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.remove_container(&id).await {
                error!(container_id = %id, err = %e, "failed to remove container on shutdown");
            }
        }

        info!("shutdown complete");
    }

    /// Number of registered containers.
    pub fn registered_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    /// Number of containers currently in `state`.
    pub fn count_in_state(&self, state: ContainerState) -> usize {
        self.containers
            .lock()
            .unwrap()
            .values()
            .filter(|info| info.state == state)
            .count()
    }
}
