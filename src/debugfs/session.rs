//! A live editing-shell process driven one command at a time.

use super::error::SessionError;
use super::matcher::{EchoFraming, ResponseFraming};
use super::stream::ChildByteStream;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Idle prompt printed by `debugfs` when it is ready for a command.
pub const DEBUGFS_PROMPT: &str = "debugfs: ";

/// Something that runs one shell command and returns its output.
///
/// Implementations must not start a command before the previous one's
/// response has been fully consumed.
pub trait ShellSession {
    fn exec(&mut self, command: &str) -> Result<String, SessionError>;
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Marker that ends every response.
    pub prompt: String,
    /// Upper bound on the wait for each marker.
    pub timeout: Duration,
    /// How long `close` waits for the shell to exit after `quit`.
    pub close_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            prompt: DEBUGFS_PROMPT.to_string(),
            timeout: Duration::from_secs(30),
            close_grace: Duration::from_secs(5),
        }
    }
}

/// One spawned shell with its input pipe and merged output stream.
///
/// Dropping a session without calling [`DebugfsSession::close`] still
/// sends `quit` and reaps the child.
pub struct DebugfsSession {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stream: ChildByteStream,
    framing: Box<dyn ResponseFraming>,
    options: SessionOptions,
    label: String,
}

impl DebugfsSession {
    /// Open `image` for writing with the given debugfs binary.
    ///
    /// The tool is started through `sh` so its stderr shares the stdout
    /// pipe, keeping error text in order with the prompts around it.
    pub fn open_image(
        debugfs: &str,
        image: &Path,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exec \"$0\" \"$@\" 2>&1", debugfs, "-w"])
            .arg(image);
        Self::open(cmd, options, Box::new(EchoFraming))
    }

    /// Spawn `cmd` and wait for its first idle prompt.
    pub fn open(
        mut cmd: Command,
        options: SessionOptions,
        framing: Box<dyn ResponseFraming>,
    ) -> Result<Self, SessionError> {
        let label = describe(&cmd);
        debug!("cmd: {}", label);

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SessionError::Spawn {
                command: label.clone(),
                source,
            })?;

        let mut readers: Vec<Box<dyn Read + Send>> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(Box::new(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(Box::new(stderr));
        }
        let stdin = child.stdin.take();

        let mut session = Self {
            child: Some(child),
            stdin,
            stream: ChildByteStream::spawn(readers),
            framing,
            options,
            label,
        };

        // The session owns the child from here, so an early return below
        // still reaps it through Drop.
        let banner = session.framing.read_banner(
            &mut session.stream,
            &session.options.prompt,
            session.options.timeout,
        )?;
        debug!("{} ready: {:?}", session.label, banner);
        Ok(session)
    }

    /// Send `quit`, wait for the shell to exit, and collect its status.
    ///
    /// A shell that is still running after the grace period is killed.
    pub fn close(mut self) -> Result<Option<ExitStatus>, SessionError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<Option<ExitStatus>, SessionError> {
        if let Some(mut stdin) = self.stdin.take() {
            // Best effort: the shell may already be gone.
            let _ = stdin.write_all(b"quit\n").and_then(|_| stdin.flush());
        }

        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };

        let status = match child.wait_timeout(self.options.close_grace)? {
            Some(status) => status,
            None => {
                warn!(
                    "{} did not exit {}s after quit, killing",
                    self.label,
                    self.options.close_grace.as_secs()
                );
                child.kill()?;
                child.wait()?
            }
        };
        debug!("{} exited: {}", self.label, status);
        Ok(Some(status))
    }
}

impl ShellSession for DebugfsSession {
    fn exec(&mut self, command: &str) -> Result<String, SessionError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| SessionError::Closed {
            marker: self.options.prompt.clone(),
            partial: String::new(),
        })?;

        debug!("debugfs: {}", command);
        stdin.write_all(command.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;

        let response = self.framing.read_response(
            &mut self.stream,
            command,
            &self.options.prompt,
            self.options.timeout,
        )?;
        if !response.trim().is_empty() {
            debug!("  {}", response.trim());
        }
        Ok(response)
    }
}

impl Drop for DebugfsSession {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("failed to close {}: {}", self.label, e);
            }
        }
    }
}

fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
