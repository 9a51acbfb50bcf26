//! Incremental editing of ext2/3/4 images through `debugfs`.
//!
//! `debugfs -w <image>` is an interactive shell: it prints a prompt, reads
//! one command line, echoes it, prints the result and prompts again. There
//! is no other framing and no structured error channel. This module drives
//! that protocol:
//!
//! - [`stream`] - merged, deadline-aware byte stream over the child's output
//! - [`matcher`] - prompt detection and per-command response framing
//! - [`session`] - process lifetime and one-command-at-a-time execution
//! - [`verifier`] - creates missing parent directories with few round trips
//! - [`inject`] - walks a host tree and writes it into the image
//!
//! # Example
//!
//! ```rust,ignore
//! use extimage::debugfs::{inject::Injector, session::{DebugfsSession, SessionOptions}};
//! use std::path::Path;
//!
//! let mut session = DebugfsSession::open_image("debugfs", Path::new("root.ext4"), SessionOptions::default())?;
//! let report = Injector::new(&mut session).inject(Path::new("overlay"), "/opt")?;
//! session.close()?;
//! ```

pub mod error;
pub mod inject;
pub mod matcher;
pub mod session;
pub mod stream;
pub mod verifier;

pub use error::SessionError;
pub use session::{DebugfsSession, SessionOptions, ShellSession};

use std::borrow::Cow;

/// Substring debugfs prints when a path lookup fails.
pub const NOT_FOUND: &str = "not found";

/// Substring debugfs prints when `write` targets an existing name.
pub const ALREADY_EXISTS: &str = "already exists";

/// Line debugfs prints when `write` created the file. Any other output
/// from `write` is an error message.
pub const ALLOCATED_INODE: &str = "Allocated inode";

/// A command understood by the editing shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand<'a> {
    Cd(&'a str),
    Mkdir(&'a str),
    /// Copy a host file into the current directory under `name`.
    Write { host: &'a str, name: &'a str },
    Quit,
}

impl ShellCommand<'_> {
    /// The command line to send, arguments quoted as needed.
    pub fn line(&self) -> String {
        match self {
            ShellCommand::Cd(path) => format!("cd {}", quote(path)),
            ShellCommand::Mkdir(path) => format!("mkdir {}", quote(path)),
            ShellCommand::Write { host, name } => {
                format!("write {} {}", quote(host), quote(name))
            }
            ShellCommand::Quit => "quit".to_string(),
        }
    }
}

/// Quote one argument for the shell's line parser.
///
/// Arguments with whitespace or quotes are wrapped in double quotes; an
/// embedded double quote is written twice.
pub fn quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"') {
        return Cow::Borrowed(arg);
    }
    Cow::Owned(format!("\"{}\"", arg.replace('"', "\"\"")))
}

/// Run `command` on `session`.
pub fn run(
    session: &mut dyn ShellSession,
    command: &ShellCommand<'_>,
) -> Result<String, SessionError> {
    session.exec(&command.line())
}

#[cfg(test)]
pub(crate) mod fake;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_leaves_plain_words() {
        assert_eq!(quote("/usr/share/doc"), "/usr/share/doc");
    }

    #[test]
    fn test_quote_wraps_whitespace_and_quotes() {
        assert_eq!(quote("my file"), "\"my file\"");
        assert_eq!(quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(quote(""), "\"\"");
    }

    #[test]
    fn test_command_lines() {
        assert_eq!(ShellCommand::Cd("/etc").line(), "cd /etc");
        assert_eq!(ShellCommand::Mkdir("/a b").line(), "mkdir \"/a b\"");
        assert_eq!(
            ShellCommand::Write {
                host: "/tmp/src/app.conf",
                name: "app.conf"
            }
            .line(),
            "write /tmp/src/app.conf app.conf"
        );
        assert_eq!(ShellCommand::Quit.line(), "quit");
    }
}
