use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use kdev_types::{KdevError, PortMapping, Result};

/// A fully resolved invocation for the caller to run attached to a terminal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractiveCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Applied on top of the caller's environment
    pub env: Vec<(String, OsString)>,
}

impl InteractiveCommand {
    /// Single-line rendering for logs and terminal emulator `-e` flags
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) || arg.is_empty() {
                line.push('\'');
                line.push_str(&arg.replace('\'', r"'\''"));
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Build a command with inherited stdio
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(self.env.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

/// Stderr lines kept for the error a failed forward reports
const STDERR_TAIL_LINES: usize = 20;

/// A running `kubectl port-forward`
///
/// Stderr is drained continuously so a noisy forward never blocks on a full
/// pipe; only the last lines are kept. The child process is killed when the
/// handle is dropped.
#[derive(Debug)]
pub struct PortForward {
    pod: String,
    mapping: PortMapping,
    child: Child,
    stderr: Option<JoinHandle<Vec<String>>>,
}

impl PortForward {
    /// Must be called within a tokio runtime
    pub(crate) fn new(pod: String, mapping: PortMapping, mut child: Child) -> Self {
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain_tail(pipe)));
        Self {
            pod,
            mapping,
            child,
            stderr,
        }
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    pub fn mapping(&self) -> PortMapping {
        self.mapping
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the forward
    pub async fn stop(mut self) -> Result<()> {
        tracing::info!(pod = %self.pod, mapping = %self.mapping, "stopping port-forward");
        if let Some(drain) = self.stderr.take() {
            drain.abort();
        }
        self.child
            .kill()
            .await
            .map_err(|e| KdevError::Spawn(e.to_string()))
    }

    /// Wait for the forward to end on its own
    ///
    /// A failed forward reports the last lines it wrote to stderr, or its
    /// exit status when it wrote none.
    pub async fn wait(mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| KdevError::Spawn(e.to_string()))?;

        let tail = match self.stderr.take() {
            Some(drain) => drain.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if status.success() {
            Ok(())
        } else if tail.is_empty() {
            Err(KdevError::ExternalTool(format!("port-forward exited with {status}")))
        } else {
            Err(KdevError::ExternalTool(tail.join("\n").trim().to_string()))
        }
    }
}

/// Read `pipe` to the end, keeping the last few lines
async fn drain_tail(pipe: ChildStderr) -> Vec<String> {
    let mut lines = BufReader::new(pipe).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into()
}
