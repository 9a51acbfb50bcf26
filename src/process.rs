//! Synchronous invocation of the non-interactive host tools.
//!
//! `Cmd` is a small builder around [`std::process::Command`] that logs the
//! command line, captures output, and turns a failed exit status into an
//! error unless the caller opted out with [`Cmd::allow_fail`].

use anyhow::{bail, Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or `None` if the process was terminated by a signal.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Builder for a single tool invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            error_msg: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Message used as the error context when the command fails.
    pub fn error_msg(mut self, msg: &str) -> Self {
        self.error_msg = Some(msg.to_string());
        self
    }

    /// Return the result instead of an error on a non-zero exit status.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// The command line as it would be typed in a shell, for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn run(&self) -> Result<CmdResult> {
        let cmdline = self.display();
        debug!("cmd: {}", cmdline);

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", cmdline))?;

        let result = CmdResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() && !self.allow_fail {
            let msg = self
                .error_msg
                .clone()
                .unwrap_or_else(|| format!("{} failed", cmdline));
            bail!(
                "{} (exit {})\n{}",
                msg,
                result
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}
