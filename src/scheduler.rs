//! Fires backup cycles on a fixed wall-clock interval.
//!
//! The interval is measured from the end of the previous fire, not from
//! process start. A manual trigger runs a cycle immediately regardless of the
//! timer's phase and, unless configured otherwise, does not reset the timer.
//! With automatic backups disabled the timer does nothing but manual triggers
//! keep working.

use crate::config::ScheduleConfig;
use crate::orchestrator::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handle for requesting an immediate cycle, intended for an operator-only
/// command surface. Cloneable and cheap.
#[derive(Clone)]
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Request a cycle now. Returns false if the scheduler is gone or a
    /// trigger is already pending.
    pub fn trigger_now(&self) -> bool {
        match self.trigger_tx.try_send(()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Manual backup trigger not accepted");
                false
            }
        }
    }
}

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    config: ScheduleConfig,
    trigger_rx: mpsc::Receiver<()>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: ScheduleConfig) -> (Self, SchedulerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        (
            Self {
                orchestrator,
                config,
                trigger_rx,
            },
            SchedulerHandle { trigger_tx },
        )
    }

    /// Control loop. Exits when `shutdown` is cancelled; any archival tasks
    /// already spawned run to completion on their own.
    pub async fn run(self, shutdown: CancellationToken) {
        let interval = Duration::from_secs(self.config.interval_minutes.saturating_mul(60));
        self.run_with_interval(interval, shutdown).await;
    }

    async fn run_with_interval(mut self, interval: Duration, shutdown: CancellationToken) {
        let enabled = self.config.enabled;
        let manual_resets_timer = self.config.manual_resets_timer;

        if enabled {
            info!(interval_secs = interval.as_secs(), "Automatic backups enabled");
        } else {
            info!("Automatic backups disabled, manual triggers remain available");
        }

        let mut deadline = Instant::now() + interval;

        loop {
            let timer = async move {
                if enabled {
                    tokio::time::sleep_until(deadline).await;
                } else {
                    std::future::pending::<()>().await;
                }
            };

            tokio::select! {
                _ = timer => {
                    info!("Backup interval elapsed, starting automatic cycle");
                    self.fire().await;
                    // Next fire is one interval after this one ended
                    deadline = Instant::now() + interval;
                }
                Some(()) = self.trigger_rx.recv() => {
                    info!("Manual backup trigger received, starting cycle");
                    self.fire().await;
                    if manual_resets_timer {
                        deadline = Instant::now() + interval;
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// Spawn the per-unit archival tasks and detach them; the control loop is
    /// never blocked on disk I/O.
    async fn fire(&self) {
        let _detached = Arc::clone(&self.orchestrator).run_cycle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::unit::{BackupUnit, LogNotifier, StaticRegistry};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn archive_count(unit_dir: &Path) -> usize {
        match fs::read_dir(unit_dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    async fn wait_for_archive(unit_dir: &Path) -> bool {
        for _ in 0..100 {
            if archive_count(unit_dir) > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn fixture() -> (TempDir, TempDir, Arc<Orchestrator>) {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("data.bin"), b"payload").unwrap();
        let root = TempDir::new().unwrap();

        let mut config = Config::default();
        config.storage.root = root.path().to_path_buf();

        let registry = Arc::new(StaticRegistry::new(vec![BackupUnit {
            id: "world".to_string(),
            source_path: source.path().to_path_buf(),
        }]));
        let orchestrator = Arc::new(Orchestrator::new(&config, registry, Arc::new(LogNotifier)));
        (source, root, orchestrator)
    }

    #[tokio::test]
    async fn test_manual_trigger_works_while_disabled() {
        let (_source, root, orchestrator) = fixture();

        let config = ScheduleConfig {
            enabled: false,
            interval_minutes: 1440,
            manual_resets_timer: false,
        };
        let (scheduler, handle) = Scheduler::new(orchestrator, config);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(shutdown.clone()));

        assert!(handle.trigger_now());
        assert!(wait_for_archive(&root.path().join("world")).await);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_interval_fires_cycle() {
        let (_source, root, orchestrator) = fixture();

        let config = ScheduleConfig {
            enabled: true,
            interval_minutes: 1440,
            manual_resets_timer: false,
        };
        let (scheduler, _handle) = Scheduler::new(orchestrator, config);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            scheduler.run_with_interval(Duration::from_millis(25), shutdown.clone()),
        );

        assert!(wait_for_archive(&root.path().join("world")).await);

        shutdown.cancel();
        task.await.unwrap();
    }
}
