//! Backup units and the collaborator seams around them.
//!
//! The core never touches host types directly: the live writer, the unit
//! registry, and the notification channel are narrow traits implemented by
//! adapters around whatever actually owns the data. The binary ships a
//! filesystem-backed registry so the daemon runs standalone.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// One backable directory tree. Registered at startup, never mutated.
#[derive(Debug, Clone)]
pub struct BackupUnit {
    /// Stable identifier; names the unit's directory under the storage root
    pub id: String,

    /// Absolute path to the live directory tree
    pub source_path: PathBuf,
}

/// The live writer of a unit's data.
///
/// Implementations mutate exactly one piece of external state: the
/// persistence-suspended flag consulted by the host's own save loop.
pub trait UnitWriter: Send + Sync {
    /// Set the persistence-suspended flag and return its prior value.
    fn suspend_persistence(&self, suspended: bool) -> bool;

    /// Force any in-flight writes to complete so a snapshot taken afterwards
    /// is crash-consistent.
    fn flush_pending(&self) -> crate::Result<()>;
}

/// Source of truth for which units exist right now.
pub trait UnitRegistry: Send + Sync {
    fn enumerate_units(&self) -> Vec<BackupUnit>;

    /// The writer for a unit, or `None` if the unit is currently absent.
    fn writer_for(&self, id: &str) -> Option<Arc<dyn UnitWriter>>;
}

/// Textual backup events. Audience filtering and delivery belong to the
/// collaborator; the core only emits.
#[derive(Debug, Clone)]
pub enum BackupEvent {
    Started { unit: String },
    Finished { unit: String, archive: PathBuf },
    Failed { unit: String, error: String },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: BackupEvent);
}

/// Default notifier that reports through the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: BackupEvent) {
        match event {
            BackupEvent::Started { unit } => info!(unit = %unit, "Backup started"),
            BackupEvent::Finished { unit, archive } => {
                info!(unit = %unit, archive = %archive.display(), "Backup finished")
            }
            BackupEvent::Failed { unit, error } => {
                error!(unit = %unit, error = %error, "Backup failed")
            }
        }
    }
}

/// Restores the writer's prior persistence state when dropped, so the flag is
/// put back on every exit path, including archiver failure.
pub struct QuiesceGuard {
    writer: Arc<dyn UnitWriter>,
    prior: bool,
}

impl QuiesceGuard {
    /// Suspend persistence on the writer, remembering the prior state.
    pub fn acquire(writer: Arc<dyn UnitWriter>) -> Self {
        let prior = writer.suspend_persistence(true);
        Self { writer, prior }
    }
}

impl Drop for QuiesceGuard {
    fn drop(&mut self) {
        self.writer.suspend_persistence(self.prior);
    }
}

/// Writer for a plain directory with no host process behind it. Quiescing is
/// a flag flip with nothing to flush.
#[derive(Default)]
pub struct DirWriter {
    suspended: AtomicBool,
}

impl DirWriter {
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

impl UnitWriter for DirWriter {
    fn suspend_persistence(&self, suspended: bool) -> bool {
        self.suspended.swap(suspended, Ordering::SeqCst)
    }

    fn flush_pending(&self) -> crate::Result<()> {
        Ok(())
    }
}

/// Registry over a fixed set of units declared in configuration. A unit whose
/// source directory is missing is reported as absent.
pub struct StaticRegistry {
    units: Vec<BackupUnit>,
    writers: HashMap<String, Arc<dyn UnitWriter>>,
}

impl StaticRegistry {
    pub fn new(units: Vec<BackupUnit>) -> Self {
        let writers = units
            .iter()
            .map(|u| {
                (
                    u.id.clone(),
                    Arc::new(DirWriter::default()) as Arc<dyn UnitWriter>,
                )
            })
            .collect();
        Self { units, writers }
    }

    pub fn from_config(units: &[crate::config::UnitConfig]) -> Self {
        Self::new(
            units
                .iter()
                .map(|u| BackupUnit {
                    id: u.id.clone(),
                    source_path: u.path.clone(),
                })
                .collect(),
        )
    }
}

impl UnitRegistry for StaticRegistry {
    fn enumerate_units(&self) -> Vec<BackupUnit> {
        self.units.clone()
    }

    fn writer_for(&self, id: &str) -> Option<Arc<dyn UnitWriter>> {
        let unit = self.units.iter().find(|u| u.id == id)?;
        if !unit.source_path.is_dir() {
            return None;
        }
        self.writers.get(id).cloned()
    }
}
