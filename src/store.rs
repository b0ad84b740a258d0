//! On-disk state for one backup unit.
//!
//! A unit owns a single directory under the storage root. The store lists the
//! archives inside it, computes their aggregate size, and applies the
//! retention rules. Nothing here is fatal after initialization: a failed
//! deletion is logged and skipped, and a listing failure skips the pass.

use crate::archive::ARCHIVE_SUFFIX;
use crate::retention::{self, ArchiveInfo, RetentionLimits};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct UnitStore {
    dir: PathBuf,
}

impl UnitStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the unit's directory if it does not exist yet. Idempotent;
    /// called lazily before the first archive of a unit.
    pub fn ensure_dir(&self) -> crate::Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Immediate files in the unit directory that carry the archive suffix.
    /// Subdirectories and stray files are ignored. A directory that does not
    /// exist yet lists as empty.
    pub fn list_archives(&self) -> crate::Result<Vec<ArchiveInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut archives = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(ARCHIVE_SUFFIX) {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            let modified: DateTime<Utc> = metadata.modified()?.into();
            archives.push(ArchiveInfo {
                path: entry.path(),
                size: metadata.len(),
                modified,
            });
        }

        Ok(archives)
    }

    /// Sum of all archive sizes in the unit directory.
    pub fn total_size(&self) -> crate::Result<u64> {
        Ok(self.list_archives()?.iter().map(|a| a.size).sum())
    }

    /// Apply the three retention rules in order: age, size, count. The live
    /// set is re-listed between rules because each rule changes it.
    pub fn apply_retention(&self, limits: &RetentionLimits, now: DateTime<Utc>) {
        if limits.is_disabled() {
            return;
        }

        debug!(dir = %self.dir.display(), "Applying retention");

        if let Some(max_age_days) = limits.max_age_days {
            match self.list_archives() {
                Ok(archives) => {
                    self.delete_all(retention::select_expired(&archives, max_age_days, now))
                }
                Err(e) => warn!(dir = %self.dir.display(), error = %e, "Failed to list archives for age rule"),
            }
        }

        if let Some(max_total_size_mb) = limits.max_total_size_mb {
            match self.list_archives() {
                Ok(archives) => {
                    self.delete_all(retention::select_over_size(&archives, max_total_size_mb))
                }
                Err(e) => warn!(dir = %self.dir.display(), error = %e, "Failed to list archives for size rule"),
            }
        }

        if let Some(max_count) = limits.max_count {
            match self.list_archives() {
                Ok(archives) => {
                    self.delete_all(retention::select_over_count(&archives, max_count))
                }
                Err(e) => warn!(dir = %self.dir.display(), error = %e, "Failed to list archives for count rule"),
            }
        }
    }

    /// Delete the selected archives. Individual failures (already removed,
    /// permission denied) are logged and skipped, never fatal to the pass.
    fn delete_all(&self, paths: Vec<PathBuf>) {
        for path in paths {
            match fs::remove_file(&path) {
                Ok(()) => info!(path = %path.display(), "Deleted old backup archive"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete archive, skipping")
                }
            }
        }
    }
}
