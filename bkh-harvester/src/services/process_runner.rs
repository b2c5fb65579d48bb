//! External process runner
//!
//! Starts an executable, drains stdout and stderr concurrently while it runs,
//! waits for exit (bounded by an optional overall deadline), then joins both
//! drains with a short budget so a child that leaves a pipe open cannot stall
//! the caller. A non-zero exit code is reported, not treated as an error:
//! the caller decides what it means.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Join budget for each output drain after the process exits
pub const DEFAULT_DRAIN_BUDGET: Duration = Duration::from_secs(1);

const DRAIN_CHUNK_SIZE: usize = 8192;

/// Process runner errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Executable could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Child exceeded the overall invocation deadline and was killed
    #[error("{program} did not finish within {deadline:?}")]
    DeadlineExceeded { program: String, deadline: Duration },

    /// Command has no program
    #[error("Empty command line")]
    EmptyCommand,
}

/// One external invocation
#[derive(Clone, Default)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Build from an argv prefix such as `["/usr/bin/env", "python", "script.py"]`
    pub fn from_argv(argv: &[String]) -> Result<Self, ProcessError> {
        let (program, rest) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;
        Ok(Self::new(program.clone()).args(rest.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Bytes written to the child's stdin, which is then closed
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

// stdin may carry a passphrase
impl std::fmt::Debug for ProcessCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("working_dir", &self.working_dir)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Captured result of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; -1 when the child was terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Newline-delimited tokens from stdout
    ///
    /// Blank output yields an empty list; empty lines are dropped.
    pub fn lines(&self) -> Vec<String> {
        split_tokens(&self.stdout)
    }
}

/// Split newline-delimited output into trimmed, non-empty tokens
pub fn split_tokens(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accumulates drained bytes; survives an abandoned drain task
type OutputBuffer = Arc<Mutex<Vec<u8>>>;

/// External process runner
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    deadline: Option<Duration>,
    drain_budget: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            deadline: None,
            drain_budget: DEFAULT_DRAIN_BUDGET,
        }
    }
}

impl ProcessRunner {
    /// Create runner with an optional overall deadline per invocation
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            deadline,
            ..Default::default()
        }
    }

    pub fn with_drain_budget(mut self, budget: Duration) -> Self {
        self.drain_budget = budget;
        self
    }

    /// Run a command to completion and capture its output
    pub async fn run(&self, cmd: &ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        if cmd.program.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        if let Some(dir) = &cmd.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(program = %cmd.program, args = ?cmd.args, "Starting external process");

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        // Start both drains before anything else can block
        let stdout_buf = OutputBuffer::default();
        let stderr_buf = OutputBuffer::default();
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(drain(pipe, Arc::clone(&stdout_buf))));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(drain(pipe, Arc::clone(&stderr_buf))));

        if let (Some(input), Some(mut pipe)) = (&cmd.stdin, child.stdin.take()) {
            if let Err(e) = pipe.write_all(input).await {
                // Child may exit without reading stdin
                tracing::debug!(program = %cmd.program, error = %e, "Could not write stdin");
            }
            drop(pipe);
        }

        let wait_result = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(program = %cmd.program, ?deadline, "External process exceeded deadline, killing");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(program = %cmd.program, error = %e, "Failed to kill process");
                    }
                    abort_drain(stdout_task);
                    abort_drain(stderr_task);
                    return Err(ProcessError::DeadlineExceeded {
                        program: cmd.program.clone(),
                        deadline,
                    });
                }
            },
            None => child.wait().await,
        };

        let status = match wait_result {
            Ok(status) => status,
            Err(source) => {
                abort_drain(stdout_task);
                abort_drain(stderr_task);
                return Err(ProcessError::Io {
                    program: cmd.program.clone(),
                    source,
                });
            }
        };

        self.join_drain(stdout_task, "stdout", &cmd.program).await;
        self.join_drain(stderr_task, "stderr", &cmd.program).await;

        let output = ProcessOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: take_text(&stdout_buf),
            stderr: take_text(&stderr_buf),
        };

        tracing::debug!(
            program = %cmd.program,
            exit_code = output.exit_code,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "External process finished"
        );

        Ok(output)
    }

    /// Wait for a drain up to the budget, then abandon it
    async fn join_drain(&self, task: Option<JoinHandle<()>>, stream: &str, program: &str) {
        let Some(mut task) = task else {
            return;
        };
        if tokio::time::timeout(self.drain_budget, &mut task).await.is_err() {
            tracing::warn!(
                program = %program,
                stream,
                budget_ms = self.drain_budget.as_millis() as u64,
                "Output drain did not finish in time, using captured output"
            );
            task.abort();
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, buffer: OutputBuffer) {
    let mut chunk = vec![0u8; DRAIN_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Output drain read error");
                break;
            }
        }
    }
}

fn abort_drain(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        task.abort();
    }
}

fn take_text(buffer: &OutputBuffer) -> String {
    match buffer.lock() {
        Ok(mut buf) => String::from_utf8_lossy(&std::mem::take(&mut *buf)).into_owned(),
        Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
    }
}
