use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{error, info, warn};

use common::SubmissionStatus;
use common::language::Language;
use common::models::Submission;
use common::repository::{RepoError, Repository};

use super::config::JudgeConfig;
use super::meta::{parse_metadata, strip};

const STDIN_FILE: &str = "stdin.txt";
const STDOUT_FILE: &str = "stdout.txt";
const STDERR_FILE: &str = "stderr.txt";
const METADATA_FILE: &str = "metadata.txt";
const ADDITIONAL_FILES_ARCHIVE: &str = "additional_files.zip";

const CALLBACK_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Filesystem layout of one submission's sandbox.
struct SandboxPaths {
    workdir: PathBuf,
    boxdir: PathBuf,
    tmpdir: PathBuf,
    source_file: PathBuf,
    stdin_file: PathBuf,
    stdout_file: PathBuf,
    stderr_file: PathBuf,
    metadata_file: PathBuf,
    archive_file: PathBuf,
}

/// One judgement run: sandbox setup, compile, run, verify, cleanup, callback.
/// Consumes itself on `perform` and returns the final submission state.
pub struct IsolateJob {
    submission: Submission,
    language: Language,
    config: JudgeConfig,
    repo: Arc<dyn Repository>,
    cgroups: bool,
    box_id: i64,
    paths: Option<SandboxPaths>,
}

impl IsolateJob {
    pub fn new(
        submission: Submission,
        language: Language,
        config: JudgeConfig,
        repo: Arc<dyn Repository>,
    ) -> Self {
        Self {
            submission,
            language,
            config,
            repo,
            cgroups: false,
            box_id: 0,
            paths: None,
        }
    }

    /// Runs the job to a terminal status. Cleanup and the callback fire on
    /// every exit path.
    pub async fn perform(mut self) -> Submission {
        info!(
            token = %self.submission.token,
            submission_id = self.submission.id,
            "starting judgement"
        );

        self.submission.status = SubmissionStatus::Processing;
        self.submission.started_at = Some(Utc::now());
        self.submission.execution_host = Some(execution_host());
        self.save().await;

        if let Err(e) = self.process().await {
            error!(
                submission_id = self.submission.id,
                err = %e,
                "failed to process submission"
            );
            self.submission.message = Some(e.to_string());
            self.submission.status = SubmissionStatus::InternalError;
            self.submission.finished_at = Some(Utc::now());
            self.save().await;
        }

        self.cleanup().await;
        self.call_callback().await;
        self.submission
    }

    async fn process(&mut self) -> Result<(), JudgeError> {
        self.initialize_workdir().await?;
        if !self.compile().await? {
            return Ok(());
        }
        self.run_program().await?;
        self.verify().await?;
        self.save().await;
        Ok(())
    }

    /// Creates the isolate box and seeds it with the submission's files.
    async fn initialize_workdir(&mut self) -> Result<(), JudgeError> {
        self.box_id = self.submission.id.rem_euclid(2_147_483_647);
        self.cgroups = !self.submission.enable_per_process_and_thread_time_limit
            || !self.submission.enable_per_process_and_thread_memory_limit;

        let mut cmd = Command::new("isolate");
        if self.cgroups {
            cmd.arg("--cg");
        }
        cmd.arg("-b").arg(self.box_id.to_string()).arg("--init");

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(JudgeError::Sandbox(format!(
                "isolate init failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let workdir = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        let boxdir = workdir.join("box");
        let paths = SandboxPaths {
            source_file: boxdir.join(&self.language.source_file),
            stdin_file: workdir.join(STDIN_FILE),
            stdout_file: workdir.join(STDOUT_FILE),
            stderr_file: workdir.join(STDERR_FILE),
            metadata_file: workdir.join(METADATA_FILE),
            archive_file: boxdir.join(ADDITIONAL_FILES_ARCHIVE),
            tmpdir: workdir.join("tmp"),
            boxdir,
            workdir,
        };

        for file in [
            &paths.stdin_file,
            &paths.stdout_file,
            &paths.stderr_file,
            &paths.metadata_file,
        ] {
            fs::write(file, "").await?;
        }

        if !self.language.is_project
            && let Some(source) = &self.submission.source_code
        {
            fs::write(&paths.source_file, source).await?;
        }

        if let Some(stdin) = &self.submission.stdin {
            fs::write(&paths.stdin_file, stdin).await?;
        }

        self.paths = Some(paths);
        self.extract_archive().await
    }

    /// Unpacks the additional-files archive inside the box under a
    /// restricted profile.
    async fn extract_archive(&mut self) -> Result<(), JudgeError> {
        let Some(archive) = self.submission.additional_files.as_deref() else {
            return Ok(());
        };
        if archive.is_empty() {
            return Ok(());
        }

        let paths = self.paths()?;
        fs::write(&paths.archive_file, archive).await?;

        let mut args = self.isolate_args(&IsolateRunOpts {
            time_limit: 2.0,
            extra_time: 1.0,
            wall_time: 4.0,
            stack_limit: self.config.max_stack_limit,
            processes: self.config.max_processes_and_or_threads,
            memory_limit: self.config.max_memory_limit,
            file_size: self.config.max_extract_size,
            run: true,
            stderr_to_stdout: true,
            ..Default::default()
        });
        args.extend(
            ["--", "/usr/bin/unzip", "-n", "-qq", ADDITIONAL_FILES_ARCHIVE]
                .map(str::to_string),
        );

        let output = Command::new("isolate").args(&args).output().await?;
        if !output.status.success() {
            return Err(JudgeError::Sandbox(format!(
                "unzip failed: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            )));
        }

        let archive_file = self.paths()?.archive_file.clone();
        fs::remove_file(archive_file).await?;
        Ok(())
    }

    /// Compiles the submission. Returns false when the submission terminated
    /// in `CompilationError` and judging must stop.
    async fn compile(&mut self) -> Result<bool, JudgeError> {
        let script_path = self.paths()?.boxdir.join("compile.sh");

        if self.language.is_project {
            let boxdir = self.paths()?.boxdir.clone();
            if !fs::try_exists(boxdir.join("compile")).await.unwrap_or(false)
                && !fs::try_exists(&script_path).await.unwrap_or(false)
            {
                // No compile script shipped, nothing to do.
                return Ok(true);
            }
        } else {
            let Some(template) = self.language.compile_cmd.clone() else {
                return Ok(true);
            };
            let options =
                sanitize_shell_field(self.submission.compiler_options.as_deref().unwrap_or(""));
            let script = template.replacen("%s", &options, 1);
            write_script(&script_path, &script).await?;
        }

        let metadata_file = self.paths()?.metadata_file.clone();
        let mut args = self.isolate_args(&IsolateRunOpts {
            meta_file: Some(metadata_file),
            time_limit: self.config.max_cpu_time_limit,
            wall_time: self.config.max_wall_time_limit,
            stack_limit: self.config.max_stack_limit,
            processes: self.config.max_processes_and_or_threads,
            memory_limit: self.config.max_memory_limit,
            file_size: self.config.max_file_size,
            stdin_file: Some("/dev/null".to_string()),
            run: true,
            stderr_to_stdout: true,
            full_env: true,
            ..Default::default()
        });
        args.extend(["--", "/bin/bash", "compile.sh"].map(str::to_string));

        info!(submission_id = self.submission.id, "executing compile");
        let output = Command::new("isolate").args(&args).output().await?;

        let compile_output = String::from_utf8_lossy(&output.stdout).to_string();
        if !compile_output.is_empty() {
            self.submission.compile_output = Some(compile_output);
        }

        let metadata = parse_metadata(&self.read_metadata().await?);
        self.reset_metadata_file().await?;

        if !self.language.is_project {
            let _ = fs::remove_file(&script_path).await;
        }

        if output.status.success() {
            return Ok(true);
        }

        finish_compilation_failure(&mut self.submission, &metadata);
        self.save().await;

        Ok(false)
    }

    /// Executes the submission under its own limits, stdin redirected from
    /// file and stdout/stderr captured to files.
    async fn run_program(&mut self) -> Result<(), JudgeError> {
        let boxdir = self.paths()?.boxdir.clone();
        let mut script_path = boxdir.join("run.sh");

        if !self.language.is_project {
            let cli_args = sanitize_shell_field(
                self.submission.command_line_arguments.as_deref().unwrap_or(""),
            );
            let script = format!("{} {}", self.language.run_cmd, cli_args);
            write_script(&script_path, script.trim_end()).await?;
        } else if !fs::try_exists(&script_path).await.unwrap_or(false) {
            script_path = boxdir.join("run");
            if !fs::try_exists(&script_path).await.unwrap_or(false) {
                return Err(JudgeError::Sandbox(
                    "run script not found for project submission".to_string(),
                ));
            }
        }

        let script_name = script_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "run.sh".to_string());

        let metadata_file = self.paths()?.metadata_file.clone();
        let mut args = self.isolate_args(&IsolateRunOpts {
            meta_file: Some(metadata_file),
            time_limit: self.submission.cpu_time_limit,
            extra_time: self.submission.cpu_extra_time,
            wall_time: self.submission.wall_time_limit,
            stack_limit: self.submission.stack_limit,
            processes: self.submission.max_processes_and_or_threads,
            memory_limit: self.submission.memory_limit,
            file_size: self.submission.max_file_size,
            run: true,
            share_net: self.submission.enable_network,
            full_env: true,
            stderr_to_stdout: self.submission.redirect_stderr_to_stdout,
            ..Default::default()
        });
        args.extend(["--", "/bin/bash"].map(str::to_string));
        args.push(script_name);

        let paths = self.paths()?;
        let stdin = std::fs::File::open(&paths.stdin_file)?;
        let stdout = std::fs::File::create(&paths.stdout_file)?;
        let stderr = std::fs::File::create(&paths.stderr_file)?;

        info!(submission_id = self.submission.id, "executing run");
        let status = Command::new("isolate")
            .args(&args)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .await?;
        if !status.success() {
            // Expected for every non-accepted outcome; verify() classifies it.
            info!(submission_id = self.submission.id, code = ?status.code(), "run finished non-zero");
        }

        if !self.language.is_project {
            let _ = fs::remove_file(&script_path).await;
        }

        Ok(())
    }

    /// Reads outputs and metadata and assigns the terminal status.
    async fn verify(&mut self) -> Result<(), JudgeError> {
        self.submission.finished_at = Some(Utc::now());

        let metadata = parse_metadata(&self.read_metadata().await?);

        let stdout_file = self.paths()?.stdout_file.clone();
        let stderr_file = self.paths()?.stderr_file.clone();
        let stdout = fs::read_to_string(&stdout_file).await?;
        let stderr = fs::read_to_string(&stderr_file).await?;
        self.submission.stdout = (!stdout.is_empty()).then_some(stdout);
        self.submission.stderr = (!stderr.is_empty()).then_some(stderr);

        self.submission.time = metadata.get("time").and_then(|v| v.parse().ok());
        self.submission.wall_time = metadata.get("time-wall").and_then(|v| v.parse().ok());

        let memory_key = if self.cgroups { "cg-mem" } else { "max-rss" };
        self.submission.memory = metadata.get(memory_key).and_then(|v| v.parse().ok());

        self.submission.exit_code = metadata.get("exitcode").and_then(|v| v.parse().ok());
        self.submission.exit_signal = metadata.get("exitsig").and_then(|v| v.parse().ok());
        self.submission.message = metadata.get("message").cloned();

        let status = determine_status(
            metadata.get("status").map(String::as_str),
            self.submission.exit_signal,
            self.submission.expected_output.as_deref(),
            self.submission.stdout.as_deref(),
        );
        self.submission.status =
            reclassify_exec_format(status, self.submission.message.as_deref());

        Ok(())
    }

    /// Persists the current submission state; failures are logged, never fatal.
    async fn save(&self) {
        if let Err(e) = self.repo.update_submission(self.submission.clone()).await {
            error!(
                submission_id = self.submission.id,
                err = %e,
                "failed to save submission"
            );
        }
    }

    /// Tears the sandbox down. Runs on every exit path; failures are logged.
    async fn cleanup(&mut self) {
        let Some(paths) = self.paths.take() else {
            return;
        };

        // Fix ownership so the box contents can be wiped. Best effort.
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        let _ = Command::new("sudo")
            .arg("chown")
            .arg("-R")
            .arg(format!("{uid}:{gid}"))
            .arg(&paths.boxdir)
            .output()
            .await;

        remove_dir_contents(&paths.boxdir).await;
        remove_dir_contents(&paths.tmpdir).await;
        for file in [
            &paths.stdin_file,
            &paths.stdout_file,
            &paths.stderr_file,
            &paths.metadata_file,
        ] {
            let _ = fs::remove_file(file).await;
        }

        let mut cmd = Command::new("isolate");
        if self.cgroups {
            cmd.arg("--cg");
        }
        cmd.arg("-b").arg(self.box_id.to_string()).arg("--cleanup");

        match cmd.output().await {
            Ok(output) if output.status.success() => {}
            Ok(output) => error!(
                box_id = self.box_id,
                output = %String::from_utf8_lossy(&output.stderr).trim(),
                "sandbox cleanup failed"
            ),
            Err(e) => error!(box_id = self.box_id, err = %e, "sandbox cleanup failed"),
        }
    }

    /// PUTs the judgement result to the submission's callback URL, with a
    /// bounded number of attempts and a fixed delay between them.
    async fn call_callback(&self) {
        let Some(url) = self
            .submission
            .callback_url
            .clone()
            .filter(|u| !u.is_empty())
        else {
            return;
        };

        let payload = CallbackPayload {
            token: self.submission.token.clone(),
            time: self.submission.time.unwrap_or(0.0),
            memory: self.submission.memory.unwrap_or(0),
            stdout: self.submission.stdout.clone().unwrap_or_default(),
            stderr: self.submission.stderr.clone().unwrap_or_default(),
            compile_output: self.submission.compile_output.clone().unwrap_or_default(),
            message: self.submission.message.clone().unwrap_or_default(),
            status: CallbackStatus {
                id: self.submission.status.id(),
                description: self.submission.status.description().to_string(),
            },
        };

        let client = match reqwest::Client::builder()
            .timeout(self.config.callbacks_timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                error!(submission_id = self.submission.id, err = %e, "failed to build callback client");
                return;
            }
        };

        for attempt in 1..=self.config.callbacks_max_tries {
            match client.put(&url).json(&payload).send().await {
                Ok(response) => {
                    info!(
                        submission_id = self.submission.id,
                        status = response.status().as_u16(),
                        "callback sent"
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        submission_id = self.submission.id,
                        attempt,
                        err = %e,
                        "callback attempt failed"
                    );
                    tokio::time::sleep(CALLBACK_RETRY_DELAY).await;
                }
            }
        }

        error!(submission_id = self.submission.id, "all callback attempts failed");
    }

    fn paths(&self) -> Result<&SandboxPaths, JudgeError> {
        self.paths
            .as_ref()
            .ok_or_else(|| JudgeError::Sandbox("sandbox not initialized".to_string()))
    }

    async fn read_metadata(&self) -> Result<String, JudgeError> {
        Ok(fs::read_to_string(&self.paths()?.metadata_file).await?)
    }

    async fn reset_metadata_file(&self) -> Result<(), JudgeError> {
        let path = self.paths()?.metadata_file.clone();
        fs::remove_file(&path).await?;
        fs::write(&path, "").await?;
        Ok(())
    }

    fn isolate_args(&self, opts: &IsolateRunOpts) -> Vec<String> {
        build_isolate_args(
            self.cgroups,
            self.box_id,
            self.submission.enable_per_process_and_thread_time_limit,
            self.submission.enable_per_process_and_thread_memory_limit,
            opts,
        )
    }
}

#[derive(Default)]
struct IsolateRunOpts {
    meta_file: Option<PathBuf>,
    time_limit: f64,
    extra_time: f64,
    wall_time: f64,
    stack_limit: i64,
    processes: i64,
    memory_limit: i64,
    file_size: i64,
    stdin_file: Option<String>,
    run: bool,
    share_net: bool,
    full_env: bool,
    stderr_to_stdout: bool,
}

fn build_isolate_args(
    cgroups: bool,
    box_id: i64,
    per_process_time_limit: bool,
    per_process_memory_limit: bool,
    opts: &IsolateRunOpts,
) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if cgroups {
        args.push("--cg".to_string());
    }
    args.push("-s".to_string());
    args.push("-b".to_string());
    args.push(box_id.to_string());

    if let Some(meta) = &opts.meta_file {
        args.push("-M".to_string());
        args.push(meta.to_string_lossy().to_string());
    }
    if opts.time_limit > 0.0 {
        args.push("-t".to_string());
        args.push(opts.time_limit.to_string());
    }
    if opts.extra_time > 0.0 {
        args.push("-x".to_string());
        args.push(opts.extra_time.to_string());
    }
    if opts.wall_time > 0.0 {
        args.push("-w".to_string());
        args.push(opts.wall_time.to_string());
    }
    if opts.stack_limit > 0 {
        args.push("-k".to_string());
        args.push(opts.stack_limit.to_string());
    }
    if opts.processes > 0 {
        args.push(format!("-p{}", opts.processes));
    }
    if opts.memory_limit > 0 {
        if per_process_memory_limit {
            args.push("-m".to_string());
            args.push(opts.memory_limit.to_string());
        } else {
            args.push(format!("--cg-mem={}", opts.memory_limit));
        }
    }
    if per_process_time_limit {
        if cgroups {
            args.push("--no-cg-timing".to_string());
        }
    } else {
        args.push("--cg-timing".to_string());
    }
    if opts.file_size > 0 {
        args.push("-f".to_string());
        args.push(opts.file_size.to_string());
    }
    if let Some(stdin) = &opts.stdin_file {
        args.push("-i".to_string());
        args.push(stdin.clone());
    }
    if opts.stderr_to_stdout {
        args.push("--stderr-to-stdout".to_string());
    }
    if opts.share_net {
        args.push("--share-net".to_string());
    }
    if opts.full_env {
        for env in [
            "HOME=/tmp",
            "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
            "LANG",
            "LANGUAGE",
            "LC_ALL",
        ] {
            args.push("-E".to_string());
            args.push(env.to_string());
        }
        args.push("-d".to_string());
        args.push("/etc:noexec".to_string());
    }
    if opts.run {
        args.push("--run".to_string());
    }

    args
}

/// Terminal transition for a failed compile: the submission keeps (only) its
/// compile output, every runtime field is cleared, and a sandbox timeout is
/// reported in place of the compiler's own output.
fn finish_compilation_failure(
    submission: &mut Submission,
    metadata: &HashMap<String, String>,
) {
    if metadata.get("status").map(String::as_str) == Some("TO") {
        submission.compile_output = Some("Compilation time limit exceeded".to_string());
    }
    submission.finished_at = Some(Utc::now());
    submission.status = SubmissionStatus::CompilationError;
    submission.clear_run_output();
}

/// Maps sandbox metadata onto a terminal submission status.
fn determine_status(
    meta_status: Option<&str>,
    exit_signal: Option<i64>,
    expected_output: Option<&str>,
    stdout: Option<&str>,
) -> SubmissionStatus {
    match meta_status {
        Some("TO") => SubmissionStatus::TimeLimitExceeded,
        Some("SG") => match exit_signal {
            Some(sig) if sig == libc::SIGSEGV as i64 => SubmissionStatus::RuntimeSigsegv,
            Some(sig) if sig == libc::SIGXFSZ as i64 => SubmissionStatus::RuntimeSigxfsz,
            Some(sig) if sig == libc::SIGFPE as i64 => SubmissionStatus::RuntimeSigfpe,
            Some(sig) if sig == libc::SIGABRT as i64 => SubmissionStatus::RuntimeSigabrt,
            _ => SubmissionStatus::RuntimeOther,
        },
        Some("RE") => SubmissionStatus::RuntimeNzec,
        Some("XX") => SubmissionStatus::InternalError,
        _ => match expected_output {
            None => SubmissionStatus::Accepted,
            Some(expected) if strip(expected) == strip(stdout.unwrap_or("")) => {
                SubmissionStatus::Accepted
            }
            Some(_) => SubmissionStatus::WrongAnswer,
        },
    }
}

/// Internal sandbox failures caused by an unrunnable binary are reported as
/// exec-format errors rather than judge faults.
fn reclassify_exec_format(
    status: SubmissionStatus,
    message: Option<&str>,
) -> SubmissionStatus {
    if status == SubmissionStatus::InternalError
        && let Some(message) = message
        && (message.contains("Exec format error")
            || message.contains("No such file or directory")
            || message.contains("Permission denied"))
    {
        return SubmissionStatus::ExecFormatError;
    }
    status
}

/// Strips shell-expansion characters from user-supplied compiler options and
/// CLI arguments before they land in a script.
fn sanitize_shell_field(value: &str) -> String {
    value.replace(['`', '$'], "")
}

async fn write_script(path: &PathBuf, content: &str) -> Result<(), JudgeError> {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, content).await?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

/// Removes everything inside `dir`, best effort.
async fn remove_dir_contents(dir: &PathBuf) {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        let result = if is_dir {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        if let Err(e) = result {
            warn!(path = %path.display(), err = %e, "failed to remove sandbox file");
        }
    }
}

fn execution_host() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

#[derive(Debug, Serialize)]
struct CallbackPayload {
    token: String,
    time: f64,
    memory: i64,
    stdout: String,
    stderr: String,
    compile_output: String,
    message: String,
    status: CallbackStatus,
}

#[derive(Debug, Serialize)]
struct CallbackStatus {
    id: i64,
    description: String,
}
