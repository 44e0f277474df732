use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HostConfig;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use super::{ContainerRuntime, CreateContainerOpts, ExecOutput, RuntimeContainer, RuntimeError};

/// `ContainerRuntime` backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<RuntimeContainer>, RuntimeError> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;

        Ok(summaries
            .into_iter()
            .map(|c| RuntimeContainer {
                id: c.id.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                running: c.state.as_deref() == Some("running"),
            })
            .collect())
    }

    async fn create_container(&self, opts: &CreateContainerOpts) -> Result<String, RuntimeError> {
        let host_config = HostConfig {
            memory: Some(opts.memory_bytes),
            nano_cpus: Some(opts.nano_cpus),
            network_mode: opts.network_disabled.then(|| "none".to_string()),
            ..Default::default()
        };

        let config = Config {
            image: Some(opts.image.clone()),
            tty: Some(opts.tty),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))
    }

    async fn exec(
        &self,
        id: &str,
        cmd: &str,
        stdin: Option<&str>,
    ) -> Result<ExecOutput, RuntimeError> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(vec!["sh".to_string(), "-c".to_string(), cmd.to_string()]),
                    attach_stdin: Some(stdin.is_some()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| RuntimeError::Exec(e.to_string()))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| RuntimeError::Exec(e.to_string()))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, mut input } = started {
            if let Some(data) = stdin {
                input
                    .write_all(data.as_bytes())
                    .await
                    .map_err(|e| RuntimeError::Exec(e.to_string()))?;
                input
                    .shutdown()
                    .await
                    .map_err(|e| RuntimeError::Exec(e.to_string()))?;
            }
            drop(input);

            while let Some(chunk) = output.next().await {
                match chunk.map_err(|e| RuntimeError::Exec(e.to_string()))? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| RuntimeError::Exec(e.to_string()))?;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: inspect.exit_code.unwrap_or(0),
        })
    }
}
