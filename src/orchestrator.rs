//! Drives one backup cycle across all configured units.
//!
//! Per unit the steps are strictly ordered: quiesce the writer, archive,
//! restore the writer's prior persistence state, then apply retention.
//! Each unit's work runs on its own background task so an interactive
//! trigger never blocks on disk I/O; across units nothing is ordered.
//! A per-unit lock prevents two cycles from archiving the same unit
//! concurrently; a busy unit is skipped with a warning.

use crate::archive::{self, ExclusionRules};
use crate::config::Config;
use crate::error::{Result, VaultError};
use crate::retention::RetentionLimits;
use crate::store::UnitStore;
use crate::unit::{BackupEvent, BackupUnit, Notifier, QuiesceGuard, UnitRegistry, UnitWriter};
use chrono::{Local, Utc};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    storage_root: PathBuf,
    filename_template: String,
    rules: ExclusionRules,
    limits: RetentionLimits,
    excluded_units: HashSet<String>,
    registry: Arc<dyn UnitRegistry>,
    notifier: Arc<dyn Notifier>,
    unit_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        registry: Arc<dyn UnitRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            storage_root: config.storage.root.clone(),
            filename_template: config.storage.filename_template.clone(),
            rules: config.exclude.rules(),
            limits: config.retention,
            excluded_units: config.exclude.units.iter().cloned().collect(),
            registry,
            notifier,
            unit_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one backup cycle over every enumerated unit. Each unit's work is
    /// spawned onto its own task; the returned handles let a caller that
    /// wants completion (tests, `--run-once`) await them, while the
    /// scheduler simply detaches.
    pub async fn run_cycle(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let units = self.registry.enumerate_units();
        info!(count = units.len(), "Starting backup cycle");

        let mut handles = Vec::new();
        for unit in units {
            if self.excluded_units.contains(&unit.id) {
                debug!(unit = %unit.id, "Unit is blacklisted, skipping");
                continue;
            }

            let Some(writer) = self.registry.writer_for(&unit.id) else {
                warn!(unit = %unit.id, "Not backing up unit, it doesn't exist");
                continue;
            };

            let orchestrator = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                orchestrator.backup_unit(unit, writer).await;
            }));
        }

        handles
    }

    /// Full per-unit state machine. Retention runs whether or not archiving
    /// succeeded, because stale backups may need pruning either way.
    async fn backup_unit(&self, unit: BackupUnit, writer: Arc<dyn UnitWriter>) {
        let lock = self.lock_for(&unit.id);
        let Ok(_guard) = lock.try_lock_owned() else {
            warn!(unit = %unit.id, "Skipping backup, unit is already being archived");
            return;
        };

        self.notifier.notify(BackupEvent::Started {
            unit: unit.id.clone(),
        });

        let store = UnitStore::new(self.storage_root.join(&unit.id));
        match self.archive_unit(&unit, &writer, &store).await {
            Ok(archive) => {
                info!(unit = %unit.id, archive = %archive.display(), "Archived unit");
                self.notifier.notify(BackupEvent::Finished {
                    unit: unit.id.clone(),
                    archive,
                });
            }
            Err(e) => {
                error!(unit = %unit.id, error = %e, "Failed to archive unit");
                self.notifier.notify(BackupEvent::Failed {
                    unit: unit.id.clone(),
                    error: e.to_string(),
                });
            }
        }

        store.apply_retention(&self.limits, Utc::now());
    }

    /// Quiesce, archive, release. The quiesce guard restores the writer's
    /// prior persistence state on every exit path.
    async fn archive_unit(
        &self,
        unit: &BackupUnit,
        writer: &Arc<dyn UnitWriter>,
        store: &UnitStore,
    ) -> Result<PathBuf> {
        store.ensure_dir()?;

        let name = archive::archive_file_name(&self.filename_template, &Local::now());
        let dest = store.dir().join(name);

        if let Err(e) = writer.flush_pending() {
            warn!(unit = %unit.id, error = %e, "Failed to flush pending writes before snapshot");
        }

        let guard = QuiesceGuard::acquire(Arc::clone(writer));

        let source = unit.source_path.clone();
        let rules = self.rules.clone();
        let dest_for_task = dest.clone();
        let result = tokio::task::spawn_blocking(move || {
            archive::write_archive(&source, &dest_for_task, &rules)
        })
        .await;

        drop(guard);

        match result {
            Ok(Ok(())) => Ok(dest),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(VaultError::archive(
                dest,
                io::Error::other(format!("archive task panicked: {e}")),
            )),
        }
    }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.unit_locks.lock().expect("unit lock map poisoned");
        locks.entry(id.to_string()).or_default().clone()
    }
}
