//! Agent process lifecycle management
//!
//! Each analysis phase maps to one spawned CLI process. The supervisor
//! merges stdout and stderr into a single line stream and separates the
//! stream (consumed by the session reader task) from the process handle
//! (held by the session manager for termination).

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Description of one agent invocation
#[derive(Debug, Clone)]
pub struct AgentCommand {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl AgentCommand {
    /// Create a command for the given executable and working directory
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Spawn the process, returning the handle and its merged output stream.
    ///
    /// A missing executable maps to [`Error::AgentNotFound`]; any other
    /// spawn failure maps to [`Error::Launch`].
    pub fn spawn(&self) -> Result<(AgentProcess, OutputLines)> {
        tracing::info!(
            program = %self.program,
            cwd = %self.cwd.display(),
            "Spawning agent process"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::AgentNotFound,
                _ => Error::Launch(e.to_string()),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(BufReader::new(stdout), tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(BufReader::new(stderr), tx));
        }

        Ok((AgentProcess { child }, OutputLines { rx }))
    }
}

/// Forward lines from one pipe into the merged output channel.
///
/// Lines keep their trailing newline so the accumulated buffer preserves
/// the process output verbatim.
async fn forward_lines<R>(mut reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                if tx.send(line.clone()).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Agent output read error: {}", e);
                break;
            }
        }
    }
}

/// Handle to a spawned agent process
pub struct AgentProcess {
    child: Child,
}

impl AgentProcess {
    /// OS process id, if the process has not been reaped yet
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit and return its exit code.
    ///
    /// A process killed by a signal has no code; it is reported as -1.
    pub async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    /// Terminate the process: polite signal first, force-kill after the
    /// grace period. Idempotent if the process already exited.
    pub async fn terminate(mut self, grace: Duration) {
        if let Ok(Some(status)) = self.child.try_wait() {
            tracing::debug!(code = ?status.code(), "Agent process already exited");
            return;
        }

        if let Some(pid) = self.child.id() {
            tracing::info!(pid, "Sending SIGTERM to agent process");
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("Grace period expired, force-killing agent process");
                let _ = self.child.kill().await;
            }
        }
    }
}

/// Merged stdout/stderr line stream of a spawned process.
///
/// Yields lines until both pipes close; not restartable.
pub struct OutputLines {
    rx: mpsc::UnboundedReceiver<String>,
}

impl OutputLines {
    /// Next output line, or `None` once the process has closed its pipes
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Build the standard agent invocation for a feature analysis phase:
/// `<binary> -f <feature file> -p <prompt>` with the workspace as cwd.
pub fn analysis_command(
    binary: &str,
    workspace: &Path,
    feature_file: &Path,
    prompt: &str,
) -> AgentCommand {
    AgentCommand::new(binary, workspace)
        .arg("-f")
        .arg(feature_file.to_string_lossy())
        .arg("-p")
        .arg(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let cmd = AgentCommand::new("definitely-not-a-real-binary-xyz", "/tmp");
        match cmd.spawn() {
            Err(Error::AgentNotFound) => {}
            other => panic!("expected AgentNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_merged_output_and_exit_code() {
        let cmd = AgentCommand::new("/bin/sh", "/tmp")
            .arg("-c")
            .arg("echo out; echo err >&2");
        let (mut process, mut lines) = cmd.spawn().unwrap();

        let mut collected = Vec::new();
        while let Some(line) = lines.next_line().await {
            collected.push(line);
        }
        assert!(collected.contains(&"out\n".to_string()));
        assert!(collected.contains(&"err\n".to_string()));

        assert_eq!(process.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let cmd = AgentCommand::new("/bin/sh", "/tmp").arg("-c").arg("exit 7");
        let (mut process, mut lines) = cmd.spawn().unwrap();
        while lines.next_line().await.is_some() {}
        assert_eq!(process.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_terminate_long_running_process() {
        let cmd = AgentCommand::new("/bin/sh", "/tmp").arg("-c").arg("sleep 30");
        let (process, _lines) = cmd.spawn().unwrap();

        let started = std::time::Instant::now();
        process.terminate(Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_terminate_already_exited() {
        let cmd = AgentCommand::new("/bin/true", "/tmp");
        let (mut process, mut lines) = cmd.spawn().unwrap();
        while lines.next_line().await.is_some() {}
        let _ = process.wait().await;

        // wait() reaped the child; terminate must be a no-op
        // (re-spawn to exercise the try_wait path on a finished child)
        let cmd = AgentCommand::new("/bin/true", "/tmp");
        let (process, mut lines) = cmd.spawn().unwrap();
        while lines.next_line().await.is_some() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        process.terminate(Duration::from_secs(1)).await;
    }

    #[test]
    fn test_analysis_command_shape() {
        let cmd = analysis_command(
            "cursor-agent",
            Path::new("/work"),
            Path::new("/work/features/x/feature.md"),
            "do the thing",
        );
        assert_eq!(cmd.program, "cursor-agent");
        assert_eq!(cmd.cwd, PathBuf::from("/work"));
        assert_eq!(
            cmd.args,
            vec!["-f", "/work/features/x/feature.md", "-p", "do the thing"]
        );
    }
}
