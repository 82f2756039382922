//! Subprocess execution for one context
//!
//! [`TaskRunner`] is the seam between the dispatcher and the outside world.
//! [`ProcessRunner`] is the real implementation: it expands the invocation
//! template for a context, appends the user's command, and collects stdout
//! and stderr line by line into one merged list.

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::ExecError;

/// Placeholder replaced by the context name in invocation templates.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// How long pipe readers may keep going once the task is cancelled.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// The user's command: verb first, then arguments. Shared by every context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }

    pub fn verb(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Program and leading arguments, with `{context}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    parts: Vec<String>,
}

impl Invocation {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    /// `kubectl --context {context}`
    pub fn kubectl() -> Self {
        Self::new(vec![
            "kubectl".to_string(),
            "--context".to_string(),
            CONTEXT_PLACEHOLDER.to_string(),
        ])
    }

    pub fn program(&self) -> Option<&str> {
        self.parts.first().map(String::as_str)
    }

    /// Full argv for `target`: template with placeholders replaced, then the
    /// command's arguments untouched.
    pub fn argv(&self, target: &str, command: &CommandSpec) -> Vec<String> {
        self.parts
            .iter()
            .map(|p| p.replace(CONTEXT_PLACEHOLDER, target))
            .chain(command.args().iter().cloned())
            .collect()
    }
}

/// Captured result of one context's run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    /// stdout and stderr lines in the order they were read
    pub lines: Vec<String>,
    pub error: Option<ExecError>,
}

impl TaskOutput {
    pub fn failed(error: ExecError) -> Self {
        Self {
            lines: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the command against one context.
///
/// Implementations must stop promptly and return whatever output they have
/// once `cancel` fires.
pub trait TaskRunner: Send + Sync + 'static {
    fn run(
        &self,
        target: &str,
        command: &CommandSpec,
        cancel: CancellationToken,
    ) -> impl Future<Output = TaskOutput> + Send;
}

/// Runs the invocation template as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    invocation: Invocation,
}

impl ProcessRunner {
    pub fn new(invocation: Invocation) -> Self {
        Self { invocation }
    }
}

impl TaskRunner for ProcessRunner {
    async fn run(&self, target: &str, command: &CommandSpec, cancel: CancellationToken) -> TaskOutput {
        let argv = self.invocation.argv(target, command);
        let Some((program, args)) = argv.split_first() else {
            return TaskOutput::failed(ExecError::EmptyInvocation);
        };

        tracing::debug!(context = %target, program = %program, args = ?args, "spawn");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return TaskOutput::failed(ExecError::Spawn {
                    program: program.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let lines = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, lines.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, lines.clone()));
        }

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => {
                tracing::debug!(context = %target, "cancelled; killing child");
                if let Err(e) = child.kill().await {
                    tracing::warn!(context = %target, "failed to kill child: {e}");
                }
                None
            }
        };

        let drained = drain(readers, &cancel).await;
        if !drained {
            tracing::debug!(context = %target, "output pipes still open after cancel; dropping remainder");
        }

        let lines = std::mem::take(&mut *lines.lock().unwrap_or_else(PoisonError::into_inner));
        let error = match status {
            None => Some(ExecError::Cancelled),
            // exited, but a leftover process held the pipes until cancel
            Some(_) if !drained => Some(ExecError::Cancelled),
            Some(Err(e)) => Some(ExecError::from(e)),
            Some(Ok(status)) => exit_error(status),
        };

        TaskOutput { lines, error }
    }
}

fn exit_error(status: ExitStatus) -> Option<ExecError> {
    if status.success() {
        return None;
    }
    Some(match status.code() {
        Some(code) => ExecError::NonZeroExit { code },
        None => ExecError::KilledBySignal,
    })
}

fn spawn_reader<R>(stream: R, lines: Arc<Mutex<Vec<String>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(['\n', '\r']).to_string();
                    lines.lock().unwrap_or_else(PoisonError::into_inner).push(line);
                }
                Err(e) => {
                    tracing::debug!("stopped reading child output: {e}");
                    break;
                }
            }
        }
    })
}

/// Wait for the pipe readers to hit EOF. A grandchild can keep a pipe open
/// after the child exits, so once `cancel` fires the readers get
/// [`DRAIN_GRACE`] more and are then aborted. Returns false if aborted.
async fn drain(readers: Vec<JoinHandle<()>>, cancel: &CancellationToken) -> bool {
    let aborts: Vec<_> = readers.iter().map(|r| r.abort_handle()).collect();
    let all = async {
        for reader in readers {
            let _ = reader.await;
        }
    };
    tokio::pin!(all);

    tokio::select! {
        biased;
        _ = &mut all => return true,
        _ = cancel.cancelled() => {}
    }

    if tokio::time::timeout(DRAIN_GRACE, &mut all).await.is_ok() {
        return true;
    }
    for abort in aborts {
        abort.abort();
    }
    false
}
