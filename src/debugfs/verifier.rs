//! Directory creation inside the image.
//!
//! The shell has no "does this exist" command and `mkdir` fails unless the
//! parent exists, so missing directories are found by probing with `cd`
//! from the target path backwards, then created front to back. Directories
//! confirmed or created once are remembered for the rest of the session.

use super::{run, SessionError, ShellCommand, ShellSession, NOT_FOUND};
use std::collections::HashSet;
use tracing::debug;

/// Per-session cache of directories known to exist in the image, plus
/// the shell's current directory.
#[derive(Debug, Default)]
pub struct DirectoryVerifier {
    known: HashSet<String>,
    cwd: Option<String>,
}

impl DirectoryVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current directory of the shell, if this verifier has set it.
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    /// Make sure `path` and all of its ancestors exist, and leave the
    /// shell's current directory at `path`.
    ///
    /// Any `cd` response containing "not found" counts as a missing
    /// directory. A non-directory entry of the same name is therefore not
    /// told apart from a missing one; the following `mkdir` fails and the
    /// final `cd` reports it as [`SessionError::Rejected`].
    pub fn ensure_directory(
        &mut self,
        session: &mut dyn ShellSession,
        path: &str,
    ) -> Result<(), SessionError> {
        let target = normalize(path);
        let prefixes = ancestors(&target);

        // Backward probe: innermost first, stop at the first that exists.
        let mut existing = 0;
        for (i, dir) in prefixes.iter().enumerate().rev() {
            if self.known.contains(dir) || self.probe(session, dir)? {
                existing = i + 1;
                break;
            }
        }

        for dir in &prefixes[existing..] {
            let response = run(session, &ShellCommand::Mkdir(dir))?;
            if !response.trim().is_empty() {
                debug!("mkdir {}: {}", dir, response.trim());
            }
            self.known.insert(dir.clone());
        }

        self.change_dir(session, &target)
    }

    fn probe(&mut self, session: &mut dyn ShellSession, dir: &str) -> Result<bool, SessionError> {
        let response = run(session, &ShellCommand::Cd(dir))?;
        if response.contains(NOT_FOUND) {
            debug!("{} treated as missing: {}", dir, response.trim());
            return Ok(false);
        }
        self.known.insert(dir.to_string());
        self.cwd = Some(dir.to_string());
        Ok(true)
    }

    fn change_dir(&mut self, session: &mut dyn ShellSession, dir: &str) -> Result<(), SessionError> {
        if self.cwd.as_deref() == Some(dir) {
            return Ok(());
        }
        let command = ShellCommand::Cd(dir);
        let response = run(session, &command)?;
        if response.contains(NOT_FOUND) {
            self.cwd = None;
            self.known.remove(dir);
            return Err(SessionError::Rejected {
                command: command.line(),
                response,
            });
        }
        self.cwd = Some(dir.to_string());
        Ok(())
    }
}

/// Absolute form of an in-image path: leading slash, no empty or `.`
/// segments, no trailing slash.
pub fn normalize(path: &str) -> String {
    let segments = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>();
    format!("/{}", segments.join("/"))
}

/// Every proper prefix directory of `path` and `path` itself, outermost
/// first. The root is omitted since it always exists.
fn ancestors(path: &str) -> Vec<String> {
    path.match_indices('/')
        .map(|(i, _)| i)
        .skip(1)
        .map(|i| path[..i].to_string())
        .chain((path != "/").then(|| path.to_string()))
        .collect()
}
