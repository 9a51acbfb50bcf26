//! ext2/ext3/ext4 image builder.
//!
//! An image without partitions is regenerated from its mount-point tree:
//!
//! 1. `genext2fs -d <tree> --size-in-blocks=<n> -i 16384 <image> <extraargs>`,
//!    with `extraargs` split by shell word rules
//! 2. `tune2fs -O <features> <image>` when features are set
//! 3. `tune2fs -L <label> <image>` when a label is set
//! 4. `e2fsck -pvfD <image>`, where exit codes 0 to 2 mean success
//!
//! An image with partitions must already exist. It is opened in `debugfs`
//! and every partition source is injected in order; regeneration and the
//! consistency check are skipped.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::build::context::BuildContext;
use crate::config::ImageConfig;
use crate::debugfs::inject::{InjectReport, Injector};
use crate::debugfs::DebugfsSession;
use crate::preflight::{check_required_tools, package_for};
use crate::process::Cmd;

/// Inodes per byte ratio handed to genext2fs.
const BYTES_PER_INODE: &str = "16384";

/// Highest e2fsck exit code that still means a usable filesystem
/// (1: errors corrected, 2: corrected, reboot advised).
const E2FSCK_MAX_OK: i32 = 2;

/// Build every image in order. The first failure stops the run.
pub fn build_all(ctx: &BuildContext, images: &[ImageConfig]) -> Result<()> {
    for image in images {
        build_image(ctx, image).map_err(|e| {
            error!("{}({}): {:#}", image.fs_type, image.file, e);
            e.context(format!("{}({})", image.fs_type, image.file))
        })?;
    }
    Ok(())
}

/// Build or update a single image.
pub fn build_image(ctx: &BuildContext, image: &ImageConfig) -> Result<()> {
    if image.is_incremental() {
        inject_partitions(ctx, image).map(|_| ())
    } else {
        generate(ctx, image)
    }
}

/// Regenerate an image from its mount-point tree.
pub fn generate(ctx: &BuildContext, image: &ImageConfig) -> Result<()> {
    let tools = &ctx.tools;
    require_tools(&tools.batch_tools())?;

    let mountpath = ctx.mountpath(image);
    let outfile = ctx.image_outfile(image);
    if !mountpath.is_dir() {
        bail!("mount-point tree '{}' does not exist", mountpath.display());
    }
    if image.size == 0 {
        bail!("no size set for image '{}'", image.file);
    }
    let extraargs = split_extraargs(&image.extraargs)?;
    fs::create_dir_all(&ctx.outputpath)
        .with_context(|| format!("creating output directory '{}'", ctx.outputpath.display()))?;

    info!(
        "{}({}): generating from {}",
        image.fs_type,
        image.file,
        mountpath.display()
    );

    Cmd::new(&tools.genext2fs)
        .arg("-d")
        .arg_path(&mountpath)
        .arg(format!("--size-in-blocks={}", image.size / 1024))
        .args(["-i", BYTES_PER_INODE])
        .arg_path(&outfile)
        .args(&extraargs)
        .error_msg("genext2fs failed")
        .run()?;

    if !image.features.is_empty() {
        Cmd::new(&tools.tune2fs)
            .args(["-O", image.features.as_str()])
            .arg_path(&outfile)
            .error_msg("tune2fs failed to set features")
            .run()?;
    }

    if let Some(label) = &image.label {
        Cmd::new(&tools.tune2fs)
            .args(["-L", label.as_str()])
            .arg_path(&outfile)
            .error_msg("tune2fs failed to set label")
            .run()?;
    }

    check_filesystem(&tools.e2fsck, &outfile)
}

/// Run e2fsck; "filesystem was modified" is not a failure.
fn check_filesystem(e2fsck: &str, outfile: &Path) -> Result<()> {
    let result = Cmd::new(e2fsck)
        .arg("-pvfD")
        .arg_path(outfile)
        .allow_fail()
        .run()?;

    match result.code() {
        Some(code) if code <= E2FSCK_MAX_OK => {
            if code != 0 {
                info!("e2fsck modified {} (exit {})", outfile.display(), code);
            }
            Ok(())
        }
        code => bail!(
            "e2fsck found unrecoverable errors in '{}' (exit {})\n{}",
            outfile.display(),
            code.map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            result.stderr.trim()
        ),
    }
}

/// Write every partition source into the existing image.
pub fn inject_partitions(ctx: &BuildContext, image: &ImageConfig) -> Result<InjectReport> {
    require_tools(&[ctx.tools.debugfs.as_str()])?;

    let outfile = ctx.image_outfile(image);
    if !outfile.is_file() {
        bail!(
            "image '{}' does not exist; incremental injection needs an existing image",
            outfile.display()
        );
    }

    let sources = image
        .partitions
        .iter()
        .map(|part| {
            let source = ctx.resolve_source(&part.source);
            if fs::symlink_metadata(&source).is_err() {
                bail!("partition source '{}' does not exist", source.display());
            }
            Ok((source, part.name.as_str()))
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "{}({}): injecting {} partition(s)",
        image.fs_type,
        image.file,
        sources.len()
    );

    let mut session = DebugfsSession::open_image(&ctx.tools.debugfs, &outfile, ctx.session.clone())
        .with_context(|| format!("opening '{}' in debugfs", outfile.display()))?;

    let mut total = InjectReport::default();
    {
        let mut injector = Injector::new(&mut session);
        for (source, name) in &sources {
            total += injector
                .inject(source, name)
                .with_context(|| format!("injecting '{}'", source.display()))?;
        }
    }

    let status = session.close().context("closing debugfs")?;
    if let Some(status) = status.filter(|s| !s.success()) {
        bail!("debugfs exited with {} on '{}'", status, outfile.display());
    }
    Ok(total)
}

/// Split `extraargs` the way a POSIX shell would, honouring quotes.
fn split_extraargs(raw: &str) -> Result<Vec<String>> {
    shlex::split(raw).with_context(|| format!("unbalanced quoting in extraargs '{}'", raw))
}

fn require_tools(tools: &[&str]) -> Result<()> {
    let pairs = tools
        .iter()
        .map(|t| (*t, package_for(t)))
        .collect::<Vec<_>>();
    check_required_tools(&pairs)
}
