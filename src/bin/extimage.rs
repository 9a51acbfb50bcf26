use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use extimage::artifact::ext;
use extimage::build::context::Overrides;
use extimage::config::load_config;
use extimage::logging::{self, LogLevel};
use extimage::BuildContext;
use tracing::info;

/// Build ext2/ext3/ext4 images described in a TOML file.
#[derive(Debug, Parser)]
#[command(name = "extimage", version)]
struct Cli {
    /// Image description file.
    #[arg(short, long, default_value = "extimage.toml")]
    config: PathBuf,

    /// Parent directory of the mount-point trees.
    #[arg(long)]
    rootpath: Option<PathBuf>,

    /// Base directory for relative partition sources.
    #[arg(long)]
    inputpath: Option<PathBuf>,

    /// Directory images are written to.
    #[arg(long)]
    outputpath: Option<PathBuf>,

    /// Verbosity: 0 errors, 1 progress, 2 commands, 3 shell traffic.
    #[arg(short, long)]
    loglevel: Option<u8>,

    /// Seconds to wait for each debugfs prompt.
    #[arg(long)]
    prompt_timeout: Option<u64>,

    /// Only build the named image(s).
    #[arg(long = "image", value_name = "NAME")]
    images: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let level = cli
        .loglevel
        .or(config.options.loglevel)
        .map(LogLevel)
        .unwrap_or_default();
    logging::init(level);

    let overrides = Overrides {
        rootpath: cli.rootpath,
        inputpath: cli.inputpath,
        outputpath: cli.outputpath,
        prompt_timeout: cli.prompt_timeout,
    };
    let ctx = BuildContext::new(&config, &overrides);

    let images = if cli.images.is_empty() {
        config.images.clone()
    } else {
        let selected = config
            .images
            .iter()
            .filter(|i| cli.images.contains(&i.file))
            .cloned()
            .collect::<Vec<_>>();
        if let Some(name) = cli
            .images
            .iter()
            .find(|n| !selected.iter().any(|i| &i.file == *n))
        {
            bail!("no image named '{}' in {}", name, cli.config.display());
        }
        selected
    };

    if images.is_empty() {
        info!("{}: no images configured", cli.config.display());
        return Ok(());
    }

    ext::build_all(&ctx, &images)
        .with_context(|| format!("building images from {}", cli.config.display()))?;
    info!("built {} image(s) in {}", images.len(), ctx.outputpath.display());
    Ok(())
}
