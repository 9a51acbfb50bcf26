//! Build context for one run.
//!
//! Merges the `[paths]`, `[tools]` and `[options]` tables with CLI
//! overrides into the values every image build reads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Config, ImageConfig, ToolsConfig};
use crate::debugfs::SessionOptions;

/// Everything an image build needs besides the image itself.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Parent of the mount-point trees used for full regeneration.
    pub rootpath: PathBuf,
    /// Base for relative partition sources.
    pub inputpath: PathBuf,
    /// Where images are written.
    pub outputpath: PathBuf,
    pub tools: ToolsConfig,
    pub session: SessionOptions,
}

/// Values given on the command line, each overriding the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub rootpath: Option<PathBuf>,
    pub inputpath: Option<PathBuf>,
    pub outputpath: Option<PathBuf>,
    pub prompt_timeout: Option<u64>,
}

impl BuildContext {
    pub fn new(config: &Config, overrides: &Overrides) -> Self {
        let pick = |cli: &Option<PathBuf>, file: &Option<PathBuf>, fallback: &str| {
            cli.clone()
                .or_else(|| file.clone())
                .unwrap_or_else(|| PathBuf::from(fallback))
        };

        let mut session = SessionOptions::default();
        if let Some(secs) = overrides.prompt_timeout.or(config.options.prompt_timeout) {
            session.timeout = Duration::from_secs(secs);
        }

        Self {
            rootpath: pick(&overrides.rootpath, &config.paths.root, "root"),
            inputpath: pick(&overrides.inputpath, &config.paths.input, "input"),
            outputpath: pick(&overrides.outputpath, &config.paths.output, "images"),
            tools: config.tools.clone(),
            session,
        }
    }

    /// Directory tree an image is regenerated from.
    pub fn mountpath(&self, image: &ImageConfig) -> PathBuf {
        self.rootpath.join(image.mountpoint.trim_start_matches('/'))
    }

    /// Path of the image file.
    pub fn image_outfile(&self, image: &ImageConfig) -> PathBuf {
        self.outputpath.join(&image.file)
    }

    /// Absolute host path of a partition source. Relative sources resolve
    /// against the input path, which itself may be relative to the current
    /// directory.
    pub fn resolve_source(&self, source: &Path) -> PathBuf {
        let joined = self.inputpath.join(source);
        std::path::absolute(&joined).unwrap_or(joined)
    }
}
