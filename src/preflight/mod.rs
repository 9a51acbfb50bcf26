//! Preflight checks for image builds.
//!
//! Validates that the host tools an image needs are installed before any
//! of them is invoked. This prevents a half-written image when, say,
//! `e2fsck` turns out to be missing after `genext2fs` already ran.
//!
//! # Example
//!
//! ```rust
//! use extimage::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("debugfs") {
//!     println!("e2fsprogs not installed");
//! }
//!
//! let tools = &[("tune2fs", "e2fsprogs"), ("e2fsck", "e2fsprogs")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

/// Check if a command exists on the host system.
///
/// Accepts either a bare name, looked up in PATH, or a path to an
/// executable.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Package that provides each tool, for the error message.
pub fn package_for(tool: &str) -> &'static str {
    let name = tool.rsplit('/').next().unwrap_or(tool);
    match name {
        "genext2fs" => "genext2fs",
        "tune2fs" | "e2fsck" | "debugfs" => "e2fsprogs",
        _ => "unknown",
    }
}

/// Check that specific tools are available.
///
/// # Arguments
///
/// * `tools` - Slice of (command, package) tuples
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect::<Vec<_>>();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        // 'sh' should exist on any Unix system
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_package_for_known_tools() {
        assert_eq!(package_for("debugfs"), "e2fsprogs");
        assert_eq!(package_for("/usr/sbin/e2fsck"), "e2fsprogs");
        assert_eq!(package_for("genext2fs"), "genext2fs");
    }

    #[test]
    fn test_check_required_tools_failure_lists_all() {
        let tools = &[
            ("sh", "coreutils"),
            ("nonexistent_command_xyz", "fake-package"),
            ("nonexistent_command_abc", "other-package"),
        ];
        let err = check_required_tools(tools).unwrap_err().to_string();
        assert!(err.contains("nonexistent_command_xyz (install: fake-package)"));
        assert!(err.contains("nonexistent_command_abc (install: other-package)"));
        assert!(!err.contains("  sh "));
    }
}
