//! Build-wide settings shared by every image of a run.
//!
//! - [`context`] - resolved paths, tool names and shell session options

pub mod context;
