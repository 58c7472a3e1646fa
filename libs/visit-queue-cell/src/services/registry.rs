use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::services::lifecycle::VisitQueue;
use crate::{QueueError, QueueSettings, VisitEntry};

/// Owns one [`VisitQueue`] per clinic for the lifetime of the process.
#[derive(Clone)]
pub struct ClinicQueueRegistry {
    queues: Arc<RwLock<HashMap<String, Arc<VisitQueue>>>>,
    settings: QueueSettings,
}

impl ClinicQueueRegistry {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
            settings,
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub async fn create(&self, clinic_id: &str) -> Result<Arc<VisitQueue>, QueueError> {
        validate_clinic_id(clinic_id)?;

        let mut queues = self.queues.write().await;
        if queues.contains_key(clinic_id) {
            return Err(QueueError::ClinicAlreadyExists(clinic_id.to_string()));
        }

        let queue = Arc::new(VisitQueue::new(clinic_id, self.settings.clone()));
        queues.insert(clinic_id.to_string(), Arc::clone(&queue));
        info!("Created visit queue for clinic {}", clinic_id);
        Ok(queue)
    }

    pub async fn get(&self, clinic_id: &str) -> Result<Arc<VisitQueue>, QueueError> {
        let queues = self.queues.read().await;
        queues
            .get(clinic_id)
            .cloned()
            .ok_or_else(|| QueueError::ClinicNotFound(clinic_id.to_string()))
    }

    pub async fn get_or_create(&self, clinic_id: &str) -> Result<Arc<VisitQueue>, QueueError> {
        if let Ok(queue) = self.get(clinic_id).await {
            return Ok(queue);
        }
        validate_clinic_id(clinic_id)?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .entry(clinic_id.to_string())
            .or_insert_with(|| {
                debug!("Creating visit queue for clinic {} on first use", clinic_id);
                Arc::new(VisitQueue::new(clinic_id, self.settings.clone()))
            });
        Ok(Arc::clone(queue))
    }

    /// Removes the clinic's queue, closes its subscriptions and returns the
    /// entries it still held.
    pub async fn destroy(&self, clinic_id: &str) -> Result<Vec<VisitEntry>, QueueError> {
        let queue = {
            let mut queues = self.queues.write().await;
            queues
                .remove(clinic_id)
                .ok_or_else(|| QueueError::ClinicNotFound(clinic_id.to_string()))?
        };

        let entries = queue.close().await;
        info!("Destroyed visit queue for clinic {}", clinic_id);
        Ok(entries)
    }

    pub async fn clinic_ids(&self) -> Vec<String> {
        let queues = self.queues.read().await;
        let mut ids: Vec<String> = queues.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn queues(&self) -> Vec<Arc<VisitQueue>> {
        let queues = self.queues.read().await;
        queues.values().cloned().collect()
    }
}

impl Default for ClinicQueueRegistry {
    fn default() -> Self {
        Self::new(QueueSettings::default())
    }
}

fn validate_clinic_id(clinic_id: &str) -> Result<(), QueueError> {
    if clinic_id.trim().is_empty() {
        return Err(QueueError::Validation("clinic_id is required".to_string()));
    }
    Ok(())
}
