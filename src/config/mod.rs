//! Image configuration.
//!
//! Parses a TOML description of one or more ext2/ext3/ext4 images into
//! [`ImageConfig`] values with an ordered partition list. Validation is
//! limited to what the build itself needs: known filesystem types, sizes
//! that parse, and sources that are non-empty.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Supported filesystem flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    Ext2,
    Ext3,
    Ext4,
}

impl FsType {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ext2" => Ok(FsType::Ext2),
            "ext3" => Ok(FsType::Ext3),
            "ext4" => Ok(FsType::Ext4),
            other => bail!(
                "unsupported image type '{}' (expected 'ext2', 'ext3' or 'ext4')",
                other
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FsType::Ext2 => "ext2",
            FsType::Ext3 => "ext3",
            FsType::Ext4 => "ext4",
        }
    }

    /// Features applied with `tune2fs -O` when the image does not set its own.
    pub fn default_features(&self) -> &'static str {
        match self {
            FsType::Ext2 => "",
            FsType::Ext3 => "has_journal",
            FsType::Ext4 => "extents,uninit_bg,dir_index,has_journal",
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source-to-target mapping to inject into an existing image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Target path inside the image. Empty means the image root.
    pub name: String,
    /// Host file or directory, relative paths resolve against the input path.
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Output file name, relative to the output path.
    pub file: String,
    pub fs_type: FsType,
    /// Image size in bytes.
    pub size: u64,
    /// Directory below the root path used for full regeneration.
    pub mountpoint: String,
    pub extraargs: String,
    pub features: String,
    pub label: Option<String>,
    pub partitions: Vec<Partition>,
}

impl ImageConfig {
    /// Incremental images are edited in place instead of regenerated.
    pub fn is_incremental(&self) -> bool {
        !self.partitions.is_empty()
    }
}

/// Paths from the `[paths]` table. CLI options may override any of them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    pub root: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Tool names or paths from the `[tools]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ToolsConfig {
    pub genext2fs: String,
    pub tune2fs: String,
    pub e2fsck: String,
    pub debugfs: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            genext2fs: "genext2fs".to_string(),
            tune2fs: "tune2fs".to_string(),
            e2fsck: "e2fsck".to_string(),
            debugfs: "debugfs".to_string(),
        }
    }
}

impl ToolsConfig {
    /// Tools needed to regenerate an image from a directory.
    pub fn batch_tools(&self) -> Vec<&str> {
        vec![&self.genext2fs, &self.tune2fs, &self.e2fsck]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionsConfig {
    pub loglevel: Option<u8>,
    /// Seconds to wait for each prompt of the editing shell.
    pub prompt_timeout: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub tools: ToolsConfig,
    pub options: OptionsConfig,
    pub images: Vec<ImageConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    #[serde(default)]
    paths: PathsConfig,
    #[serde(default)]
    tools: ToolsConfig,
    #[serde(default)]
    options: OptionsConfig,
    #[serde(default)]
    image: Vec<ImageToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImageToml {
    name: String,
    #[serde(rename = "type")]
    fs_type: String,
    size: Option<SizeToml>,
    mountpoint: Option<String>,
    extraargs: Option<String>,
    features: Option<String>,
    label: Option<String>,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    file: Vec<FileToml>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeToml {
    Bytes(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileToml {
    #[serde(default)]
    name: String,
    image: SourceToml,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceToml {
    One(String),
    Many(Vec<String>),
}

/// Load and parse a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config '{}'", path.display()))?;
    parse_config(&text).with_context(|| format!("parsing config '{}'", path.display()))
}

/// Parse configuration text.
pub fn parse_config(text: &str) -> Result<Config> {
    let parsed: ConfigToml = toml::from_str(text).context("invalid configuration")?;

    let images = parsed
        .image
        .into_iter()
        .map(image_from_toml)
        .collect::<Result<Vec<_>>>()?;

    Ok(Config {
        paths: parsed.paths,
        tools: parsed.tools,
        options: parsed.options,
        images,
    })
}

fn image_from_toml(raw: ImageToml) -> Result<ImageConfig> {
    let fs_type = FsType::parse(&raw.fs_type)
        .with_context(|| format!("image '{}'", raw.name))?;

    let size = match raw.size {
        None => 0,
        Some(SizeToml::Bytes(n)) => n,
        Some(SizeToml::Text(s)) => {
            parse_size(&s).with_context(|| format!("image '{}': size", raw.name))?
        }
    };

    let mut partitions = Vec::new();
    for entry in raw.file {
        let sources = match entry.image {
            SourceToml::One(s) => vec![s],
            SourceToml::Many(v) => v,
        };
        if sources.is_empty() {
            bail!(
                "image '{}': file '{}' has no image source",
                raw.name,
                entry.name
            );
        }
        for source in sources {
            partitions.push(partition(&raw.name, &entry.name, source)?);
        }
    }
    for source in raw.files {
        partitions.push(partition(&raw.name, "", source)?);
    }

    let label = raw.label.filter(|l| !l.is_empty());

    Ok(ImageConfig {
        features: raw
            .features
            .unwrap_or_else(|| fs_type.default_features().to_string()),
        fs_type,
        size,
        mountpoint: raw.mountpoint.unwrap_or_default(),
        extraargs: raw.extraargs.unwrap_or_default(),
        label,
        partitions,
        file: raw.name,
    })
}

fn partition(image: &str, name: &str, source: String) -> Result<Partition> {
    if source.trim().is_empty() {
        bail!("image '{}': empty source for target '{}'", image, name);
    }
    Ok(Partition {
        name: name.to_string(),
        source: PathBuf::from(source),
    })
}

/// Parse a byte count with an optional `k`/`K`, `M` or `G` suffix.
///
/// Suffixes are binary multiples. Anything after the suffix is rejected.
pub fn parse_size(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let digits_end = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, suffix) = raw.split_at(digits_end);
    if digits.is_empty() {
        bail!("invalid size '{}'", raw);
    }
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid size '{}'", raw))?;

    let multiplier: u64 = match suffix {
        "" => 1,
        "k" | "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        other => bail!("invalid size suffix '{}' in '{}'", other, raw),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("size '{}' overflows", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_handles_suffixes() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("4k").unwrap(), 4096);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("64M").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("M").is_err());
        assert!(parse_size("10T").is_err());
        assert!(parse_size("10MB").is_err());
    }

    #[test]
    fn default_features_follow_type() {
        let config = parse_config(
            r#"
            [[image]]
            name = "a.ext2"
            type = "ext2"

            [[image]]
            name = "b.ext3"
            type = "ext3"

            [[image]]
            name = "c.ext4"
            type = "ext4"
            "#,
        )
        .unwrap();

        let features: Vec<&str> = config.images.iter().map(|i| i.features.as_str()).collect();
        assert_eq!(
            features,
            ["", "has_journal", "extents,uninit_bg,dir_index,has_journal"]
        );
        assert!(config.images.iter().all(|i| !i.is_incremental()));
    }

    #[test]
    fn partitions_keep_declaration_order() {
        let config = parse_config(
            r#"
            [tools]
            debugfs = "/sbin/debugfs"

            [[image]]
            name = "data.ext4"
            type = "ext4"
            size = "16M"
            label = "data"
            files = ["top.txt"]

              [[image.file]]
              name = "/etc/app"
              image = "app"

              [[image.file]]
              name = "/srv"
              image = ["web", "static"]
            "#,
        )
        .unwrap();

        assert_eq!(config.tools.debugfs, "/sbin/debugfs");
        assert_eq!(config.tools.e2fsck, "e2fsck");

        let image = &config.images[0];
        assert_eq!(image.file, "data.ext4");
        assert_eq!(image.size, 16 * 1024 * 1024);
        assert_eq!(image.label.as_deref(), Some("data"));
        assert!(image.is_incremental());

        let parts: Vec<(&str, &Path)> = image
            .partitions
            .iter()
            .map(|p| (p.name.as_str(), p.source.as_path()))
            .collect();
        assert_eq!(
            parts,
            [
                ("/etc/app", Path::new("app")),
                ("/srv", Path::new("web")),
                ("/srv", Path::new("static")),
                ("", Path::new("top.txt")),
            ]
        );
    }

    #[test]
    fn explicit_empty_features_disable_tuning() {
        let config = parse_config(
            r#"
            [[image]]
            name = "x.ext4"
            type = "ext4"
            features = ""
            label = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.images[0].features, "");
        assert_eq!(config.images[0].label, None);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse_config(
            r#"
            [[image]]
            name = "x.img"
            type = "btrfs"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("unsupported image type 'btrfs'"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = parse_config(
            r#"
            [[image]]
            name = "x.ext4"
            type = "ext4"
            colour = "blue"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn options_section_is_parsed() {
        let config = parse_config(
            r#"
            [options]
            loglevel = 2
            prompt_timeout = 5

            [paths]
            output = "out"
            "#,
        )
        .unwrap();
        assert_eq!(config.options.loglevel, Some(2));
        assert_eq!(config.options.prompt_timeout, Some(5));
        assert_eq!(config.paths.output.as_deref(), Some(Path::new("out")));
        assert!(config.images.is_empty());
    }
}
