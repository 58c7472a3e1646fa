use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::services::registry::ClinicQueueRegistry;
use crate::{MaintenanceConfig, QueueError, VisitEntry};

/// Sink for terminal entries leaving the in-memory queue.
#[async_trait]
pub trait VisitArchive: Send + Sync {
    async fn archive(&self, clinic_id: &str, entries: &[VisitEntry]) -> Result<(), QueueError>;
}

#[derive(Default)]
pub struct InMemoryArchive {
    records: RwLock<Vec<VisitEntry>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn archived(&self) -> Vec<VisitEntry> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl VisitArchive for InMemoryArchive {
    async fn archive(&self, _clinic_id: &str, entries: &[VisitEntry]) -> Result<(), QueueError> {
        self.records.write().await.extend_from_slice(entries);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub clinics: usize,
    pub archived: usize,
    pub estimate_updates: usize,
}

/// Periodically archives old terminal entries and refreshes wait estimates
/// for every clinic in the registry.
pub struct QueueMaintenanceService {
    registry: ClinicQueueRegistry,
    archive: Arc<dyn VisitArchive>,
    config: MaintenanceConfig,
    is_running: RwLock<bool>,
}

impl QueueMaintenanceService {
    pub fn new(
        registry: ClinicQueueRegistry,
        archive: Arc<dyn VisitArchive>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            registry,
            archive,
            config,
            is_running: RwLock::new(false),
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), QueueError> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                warn!("Queue maintenance is already running");
                return Ok(());
            }
            *running = true;
        }

        info!(
            "Starting queue maintenance every {}s (archive after {} min)",
            self.config.interval_seconds, self.config.archive_after_minutes
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_seconds));
        loop {
            ticker.tick().await;

            if !*self.is_running.read().await {
                debug!("Maintenance loop stopping due to shutdown");
                break;
            }

            let report = self.run_once().await;
            if report.archived > 0 || report.estimate_updates > 0 {
                info!(
                    "Maintenance pass: {} clinics, {} archived, {} estimate updates",
                    report.clinics, report.archived, report.estimate_updates
                );
            }
        }

        debug!("Maintenance loop ended");
        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut running = self.is_running.write().await;
        *running = false;
        info!("Queue maintenance shutdown requested");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn run_once(&self) -> MaintenanceReport {
        let cutoff = Utc::now() - ChronoDuration::minutes(self.config.archive_after_minutes);
        let queues = self.registry.queues().await;
        let mut report = MaintenanceReport {
            clinics: queues.len(),
            ..MaintenanceReport::default()
        };

        for queue in queues {
            let candidates = queue.terminal_entries_before(cutoff).await;
            if !candidates.is_empty() {
                match self.archive.archive(queue.clinic_id(), &candidates).await {
                    Ok(()) => {
                        let ids: Vec<Uuid> = candidates.iter().map(|entry| entry.id).collect();
                        report.archived += queue.purge(&ids).await.len();
                    }
                    Err(e) => {
                        error!(
                            "Failed to archive {} entries for clinic {}: {}",
                            candidates.len(),
                            queue.clinic_id(),
                            e
                        );
                    }
                }
            }

            report.estimate_updates += queue.refresh_estimates().await;
        }

        report
    }
}
