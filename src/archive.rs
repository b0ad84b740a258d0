//! Snapshot archiver.
//!
//! Produces one compressed archive (`.tar.zst`) of a directory tree. The
//! traversal is breadth-first over an explicit work queue so deep trees never
//! exhaust the stack, entry paths are stored relative to the source root with
//! forward-slash separators, and file bytes are streamed in fixed-size chunks
//! rather than buffered whole.
//!
//! The archive is written to a temporary sibling file and renamed into place
//! on success, so a file carrying the archive suffix is always complete.

use crate::error::{Result, VaultError};
use chrono::{DateTime, Datelike, Local, Timelike};
use std::collections::{HashSet, VecDeque};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix shared by every archive this crate produces or manages.
pub const ARCHIVE_SUFFIX: &str = ".tar.zst";

/// zstd compression level used for archives.
const COMPRESSION_LEVEL: i32 = 3;

/// Exclusion rule sets, matched against the bare final path segment only.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    files: HashSet<String>,
    dirs: HashSet<String>,
}

impl ExclusionRules {
    pub fn new(
        files: impl IntoIterator<Item = String>,
        dirs: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            files: files.into_iter().collect(),
            dirs: dirs.into_iter().collect(),
        }
    }

    pub fn is_excluded_file(&self, name: &str) -> bool {
        self.files.contains(name)
    }

    /// Matching a directory name prunes recursion into it entirely.
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.dirs.contains(name)
    }
}

/// Expand the filename template tokens with zero-padded values from `now`.
pub fn expand_template(template: &str, now: &DateTime<Local>) -> String {
    template
        .replace("%YEAR", &format!("{:04}", now.year()))
        .replace("%MONTH", &format!("{:02}", now.month()))
        .replace("%DAY", &format!("{:02}", now.day()))
        .replace("%HOUR", &format!("{:02}", now.hour()))
        .replace("%MINUTE", &format!("{:02}", now.minute()))
        .replace("%SECOND", &format!("{:02}", now.second()))
}

/// Full archive file name for a snapshot started at `now`.
pub fn archive_file_name(template: &str, now: &DateTime<Local>) -> String {
    format!("{}{}", expand_template(template, now), ARCHIVE_SUFFIX)
}

/// Archive `source_dir` into `dest_file`, honoring `rules`.
///
/// On success the archive is atomically visible at `dest_file`. On failure
/// the error carries the offending path and no file with the archive suffix
/// is left behind; the temporary file is removed best-effort.
pub fn write_archive(source_dir: &Path, dest_file: &Path, rules: &ExclusionRules) -> Result<()> {
    let tmp = temp_path(dest_file);

    match build_archive(source_dir, &tmp, rules) {
        Ok(()) => fs::rename(&tmp, dest_file).map_err(|e| VaultError::archive(dest_file, e)),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Temporary sibling of the destination, in the same directory so the final
/// rename never crosses a filesystem boundary.
fn temp_path(dest_file: &Path) -> PathBuf {
    let mut name = dest_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    dest_file.with_file_name(name)
}

fn build_archive(source_dir: &Path, tmp: &Path, rules: &ExclusionRules) -> Result<()> {
    let file = File::create(tmp).map_err(|e| VaultError::archive(tmp, e))?;
    let encoder = zstd::stream::write::Encoder::new(file, COMPRESSION_LEVEL)
        .map_err(|e| VaultError::archive(tmp, e))?;
    let mut builder = tar::Builder::new(encoder);

    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(source_dir.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        let entries = fs::read_dir(&dir).map_err(|e| VaultError::archive(&dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| VaultError::archive(&dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry
                .file_type()
                .map_err(|e| VaultError::archive(&path, e))?;

            if file_type.is_dir() {
                if rules.is_excluded_dir(&name) {
                    continue;
                }
                let entry_name = format!("{}/", relative_name(source_dir, &path));
                builder
                    .append_dir(&entry_name, &path)
                    .map_err(|e| VaultError::archive(&path, e))?;
                queue.push_back(path);
            } else if file_type.is_file() {
                if rules.is_excluded_file(&name) {
                    continue;
                }
                let entry_name = relative_name(source_dir, &path);
                let mut src = File::open(&path).map_err(|e| VaultError::archive(&path, e))?;
                // append_file streams the contents in fixed-size chunks
                builder
                    .append_file(&entry_name, &mut src)
                    .map_err(|e| VaultError::archive(&path, e))?;
            }
            // Symlinks and special files are not part of a snapshot.
        }
    }

    let encoder = builder.into_inner().map_err(|e| VaultError::archive(tmp, e))?;
    let mut file = encoder.finish().map_err(|e| VaultError::archive(tmp, e))?;
    file.flush().map_err(|e| VaultError::archive(tmp, e))?;
    Ok(())
}

/// Path of `path` relative to `source_dir`, with forward-slash separators
/// regardless of host OS.
fn relative_name(source_dir: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(source_dir).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
