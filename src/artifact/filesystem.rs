//! File padding and splicing utilities for image artifacts.
//!
//! Images produced by the external tools are plain files; these helpers
//! grow them to a fixed size or patch bytes in place at a known offset.
//!
//! They are library helpers for callers that lay an ext image out inside a
//! larger disk file. The ext builder in [`super::ext`] does not use them.

use anyhow::{bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

const CHUNK: usize = 4096;

/// How [`pad_file`] opens the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMode {
    /// Truncate the output before writing.
    Overwrite,
    /// Append to whatever the output already holds.
    Append,
}

/// Copy `infile` into `outfile` and fill up to `size` bytes with `fill`.
///
/// With `infile = None` the existing `outfile` is padded in place up to
/// `size`. An input (or existing output) larger than `size` is an error.
///
/// # Example
///
/// ```rust,ignore
/// use extimage::artifact::filesystem::{pad_file, PadMode};
/// use std::path::Path;
///
/// pad_file(Some(Path::new("boot.bin")), Path::new("disk.img"), 1 << 20, 0xff, PadMode::Overwrite)?;
/// ```
pub fn pad_file(
    infile: Option<&Path>,
    outfile: &Path,
    size: u64,
    fill: u8,
    mode: PadMode,
) -> Result<()> {
    let mut input = match infile {
        Some(path) => Some(
            File::open(path).with_context(|| format!("open {}", path.display()))?,
        ),
        None => None,
    };

    let mut output = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(mode == PadMode::Overwrite)
        .append(mode == PadMode::Append)
        .open(outfile)
        .with_context(|| format!("open {}", outfile.display()))?;

    let mut remaining = size;
    let mut buf = vec![0u8; CHUNK];

    match input.as_mut() {
        None => {
            let current = fs::metadata(outfile)
                .with_context(|| format!("stat {}", outfile.display()))?
                .len();
            if current > size {
                bail!(
                    "'{}' is already {} bytes, larger than {}",
                    outfile.display(),
                    current,
                    size
                );
            }
            remaining = size - current;
        }
        Some(input) => {
            while remaining > 0 {
                let want = remaining.min(CHUNK as u64) as usize;
                let read = read_full(input, &mut buf[..want])?;
                output
                    .write_all(&buf[..read])
                    .with_context(|| format!("write {}", outfile.display()))?;
                remaining -= read as u64;
                if read < want {
                    break;
                }
            }

            if remaining == 0 {
                let mut probe = [0u8; 1];
                if read_full(input, &mut probe)? == 1 {
                    bail!(
                        "input file '{}' too large",
                        infile.map(|p| p.display().to_string()).unwrap_or_default()
                    );
                }
            }
        }
    }

    buf.fill(fill);
    while remaining > 0 {
        let now = remaining.min(CHUNK as u64) as usize;
        output
            .write_all(&buf[..now])
            .with_context(|| format!("write {}", outfile.display()))?;
        remaining -= now as u64;
    }

    Ok(())
}

/// Write `data` into `outfile` at byte `offset`, creating the file if needed.
///
/// Bytes outside `offset..offset + data.len()` are left untouched.
pub fn insert_data(data: &[u8], outfile: &Path, offset: u64) -> Result<()> {
    let mut output = match OpenOptions::new().read(true).write(true).open(outfile) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => File::create(outfile)
            .with_context(|| format!("open {}", outfile.display()))?,
        Err(e) => return Err(e).with_context(|| format!("open {}", outfile.display())),
    };

    output
        .seek(SeekFrom::Start(offset))
        .with_context(|| format!("seek {}", outfile.display()))?;
    output
        .write_all(data)
        .with_context(|| format!("write {}", outfile.display()))?;
    Ok(())
}

fn read_full(input: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("read input"),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pad_file_copies_and_fills() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("in.bin");
        let dst = temp.path().join("out.bin");
        fs::write(&src, b"abc").unwrap();

        pad_file(Some(&src), &dst, 8, 0xff, PadMode::Overwrite).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), b"abc\xff\xff\xff\xff\xff");
    }

    #[test]
    fn test_pad_file_appends() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("in.bin");
        let dst = temp.path().join("out.bin");
        fs::write(&src, b"xy").unwrap();
        fs::write(&dst, b"head").unwrap();

        pad_file(Some(&src), &dst, 4, 0, PadMode::Append).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), b"headxy\0\0");
    }

    #[test]
    fn test_pad_file_without_input_grows_output() {
        let temp = TempDir::new().unwrap();
        let dst = temp.path().join("out.bin");
        fs::write(&dst, b"12345").unwrap();

        pad_file(None, &dst, 7, b'.', PadMode::Append).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), b"12345..");
    }

    #[test]
    fn test_pad_file_rejects_oversized_input() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("in.bin");
        let dst = temp.path().join("out.bin");
        fs::write(&src, b"too long").unwrap();

        let err = pad_file(Some(&src), &dst, 3, 0, PadMode::Overwrite).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_pad_file_exact_size_is_ok() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("in.bin");
        let dst = temp.path().join("out.bin");
        fs::write(&src, b"four").unwrap();

        pad_file(Some(&src), &dst, 4, 0, PadMode::Overwrite).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"four");
    }

    #[test]
    fn test_insert_data_patches_in_place() {
        let temp = TempDir::new().unwrap();
        let dst = temp.path().join("disk.img");
        fs::write(&dst, b"0000000000").unwrap();

        insert_data(b"AB", &dst, 4).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), b"0000AB0000");
    }

    #[test]
    fn test_insert_data_creates_missing_file() {
        let temp = TempDir::new().unwrap();
        let dst = temp.path().join("new.img");

        insert_data(b"Z", &dst, 2).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), b"\0\0Z");
    }
}
