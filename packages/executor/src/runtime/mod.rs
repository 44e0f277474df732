//! Thin abstraction over the container engine. The production implementation
//! talks to the Docker daemon; tests substitute an in-memory fake.

pub mod docker;

use async_trait::async_trait;
use thiserror::Error;

pub use docker::DockerRuntime;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to connect to container engine: {0}")]
    Connect(String),

    #[error("container engine error: {0}")]
    Api(String),

    #[error("exec failed: {0}")]
    Exec(String),
}

/// A container as reported by the engine.
#[derive(Clone, Debug)]
pub struct RuntimeContainer {
    pub id: String,
    pub image: String,
    pub running: bool,
}

/// Creation parameters for a sandbox worker container.
#[derive(Clone, Debug)]
pub struct CreateContainerOpts {
    pub image: String,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub network_disabled: bool,
    pub tty: bool,
}

/// Captured output of one in-container exec.
#[derive(Clone, Debug, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<RuntimeContainer>, RuntimeError>;
    async fn create_container(&self, opts: &CreateContainerOpts) -> Result<String, RuntimeError>;
    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;
    /// Force-removes the container.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
    /// Runs `sh -c <cmd>` inside the container, piping `stdin` when present
    /// and capturing stdout and stderr separately.
    async fn exec(&self, id: &str, cmd: &str, stdin: Option<&str>)
    -> Result<ExecOutput, RuntimeError>;
}
