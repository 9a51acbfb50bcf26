//! Copy a host file tree into an image through the editing shell.

use super::verifier::{normalize, DirectoryVerifier};
use super::{run, SessionError, ShellCommand, ShellSession, ALLOCATED_INODE, ALREADY_EXISTS};
use std::fs;
use std::path::{Component, Path};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Where a walk reads from and where it writes to.
#[derive(Debug, Clone, Copy)]
pub struct WalkContext<'a> {
    /// Host file or directory being injected.
    pub source_root: &'a Path,
    /// In-image path the source root maps to. Empty means the image root.
    pub target_prefix: &'a str,
}

/// Counts of what one injection did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InjectReport {
    pub files: usize,
    pub directories: usize,
    /// Symlinks seen. These are logged, not written into the image.
    pub symlinks: usize,
    pub skipped: usize,
}

impl std::ops::AddAssign for InjectReport {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.directories += other.directories;
        self.symlinks += other.symlinks;
        self.skipped += other.skipped;
    }
}

/// Writes host trees into one open session.
///
/// The directory cache lives as long as the injector, so several sources
/// injected into the same session share it.
pub struct Injector<'s> {
    session: &'s mut dyn ShellSession,
    verifier: DirectoryVerifier,
}

impl<'s> Injector<'s> {
    pub fn new(session: &'s mut dyn ShellSession) -> Self {
        Self {
            session,
            verifier: DirectoryVerifier::new(),
        }
    }

    /// Inject `source` at `target_prefix`.
    ///
    /// A relative `source` is taken from the current directory; the shell
    /// always receives absolute host paths. Unreadable entries, dangling
    /// symlinks and special files are warned about and skipped. Only shell
    /// failures abort the walk.
    pub fn inject(
        &mut self,
        source: &Path,
        target_prefix: &str,
    ) -> Result<InjectReport, SessionError> {
        let source = std::path::absolute(source)?;
        let ctx = WalkContext {
            source_root: &source,
            target_prefix,
        };
        self.walk(&ctx)
    }

    /// Depth-first walk of `ctx.source_root`, directories before their
    /// contents. Symlinks are never followed.
    pub fn walk(&mut self, ctx: &WalkContext<'_>) -> Result<InjectReport, SessionError> {
        let mut report = InjectReport::default();
        let mut walker = WalkDir::new(ctx.source_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    warn!("skipping {}: {}", path, e);
                    report.skipped += 1;
                    continue;
                }
            };

            let Some(target) = target_path(ctx, &entry) else {
                warn!("skipping {}: name is not valid UTF-8", entry.path().display());
                report.skipped += 1;
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            };

            self.visit(&entry, &target, &mut report)?;
        }

        info!(
            "{} -> {}: {} files, {} directories, {} symlinks, {} skipped",
            ctx.source_root.display(),
            normalize(ctx.target_prefix),
            report.files,
            report.directories,
            report.symlinks,
            report.skipped
        );
        Ok(report)
    }

    fn visit(
        &mut self,
        entry: &DirEntry,
        target: &str,
        report: &mut InjectReport,
    ) -> Result<(), SessionError> {
        let file_type = entry.file_type();
        let path = entry.path();

        if file_type.is_dir() {
            self.verifier.ensure_directory(self.session, target)?;
            report.directories += 1;
        } else if file_type.is_symlink() {
            match (fs::read_link(path), fs::metadata(path)) {
                (Ok(link), Ok(_)) => {
                    info!("symlink not transferred: {} -> {}", target, link.display());
                    report.symlinks += 1;
                }
                (Ok(link), Err(_)) => {
                    warn!("skipping dangling symlink {} -> {}", path.display(), link.display());
                    report.skipped += 1;
                }
                (Err(e), _) => {
                    warn!("skipping unreadable symlink {}: {}", path.display(), e);
                    report.skipped += 1;
                }
            }
        } else if file_type.is_file() {
            if self.write_file(path, target)? {
                report.files += 1;
            } else {
                report.skipped += 1;
            }
        } else {
            warn!("skipping special file {}", path.display());
            report.skipped += 1;
        }
        Ok(())
    }

    fn write_file(&mut self, host: &Path, target: &str) -> Result<bool, SessionError> {
        let Some(host_str) = host.to_str() else {
            warn!("skipping {}: path is not valid UTF-8", host.display());
            return Ok(false);
        };
        let (parent, name) = split_target(target);
        if name.is_empty() {
            warn!("skipping {}: no file name for target '{}'", host.display(), target);
            return Ok(false);
        }

        self.verifier.ensure_directory(self.session, parent)?;
        let response = run(
            self.session,
            &ShellCommand::Write {
                host: host_str,
                name,
            },
        )?;
        if let Some(error) = write_error(&response) {
            if error.contains(ALREADY_EXISTS) {
                warn!("not overwriting existing {}", target);
            } else {
                warn!("failed to write {} -> {}: {}", host.display(), target, error);
            }
            return Ok(false);
        }
        debug!("wrote {} -> {}", host.display(), target);
        Ok(true)
    }
}

/// First line of a `write` response that is not the success report.
fn write_error(response: &str) -> Option<&str> {
    response
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with(ALLOCATED_INODE))
}

/// In-image path for a walked entry, or `None` if it cannot be spelled.
///
/// The walk root maps to the prefix itself. A root that is a regular file
/// keeps its own name when the prefix is empty or ends in `/`.
fn target_path(ctx: &WalkContext<'_>, entry: &DirEntry) -> Option<String> {
    let prefix = ctx.target_prefix;

    if entry.depth() == 0 {
        if entry.file_type().is_dir() {
            return Some(normalize(prefix));
        }
        if prefix.is_empty() || prefix.ends_with('/') {
            let name = entry.file_name().to_str()?;
            return Some(normalize(&format!("{prefix}/{name}")));
        }
        return Some(normalize(prefix));
    }

    let relative = entry.path().strip_prefix(ctx.source_root).ok()?;
    let mut target = normalize(prefix);
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !target.ends_with('/') {
                target.push('/');
            }
            target.push_str(part.to_str()?);
        }
    }
    Some(target)
}

/// Split an absolute in-image path into its parent directory and leaf.
fn split_target(target: &str) -> (&str, &str) {
    match target.rfind('/') {
        Some(0) => ("/", &target[1..]),
        Some(i) => (&target[..i], &target[i + 1..]),
        None => ("/", target),
    }
}
