//! Build ext2/ext3/ext4 filesystem images from host directory trees.
//!
//! Two build modes are supported per image:
//!
//! - **Full regeneration** - the image is created from a mount-point tree
//!   with `genext2fs`, tuned with `tune2fs` and checked with `e2fsck`.
//! - **Incremental injection** - host files are written into an existing
//!   image by driving an interactive `debugfs -w` session.
//!
//! # Architecture
//!
//! ```text
//! config (TOML) ──> build::context ──> artifact::ext
//!                                         │
//!                   ┌─────────────────────┴──────────────────┐
//!                   │                                        │
//!             process::Cmd                         debugfs::session
//!       (genext2fs, tune2fs, e2fsck)                        │
//!                                              debugfs::verifier, inject
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use extimage::{artifact::ext, build::context::Overrides, config, BuildContext};
//! use std::path::Path;
//!
//! let config = config::load_config(Path::new("images.toml"))?;
//! let ctx = BuildContext::new(&config, &Overrides::default());
//! ext::build_all(&ctx, &config.images)?;
//! ```

pub mod artifact;
pub mod build;
pub mod config;
pub mod debugfs;
pub mod logging;
pub mod preflight;
pub mod process;

pub use build::context::BuildContext;
pub use config::{Config, FsType, ImageConfig};
