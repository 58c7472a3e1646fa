use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::services::ordering::PriorityOrderer;
use crate::services::store::EntryStore;
use crate::{QueueEvent, QueueSettings, ServiceTimeModel};

#[derive(Debug, Clone)]
pub struct WaitTimeEstimator {
    base_minutes: u32,
    model: ServiceTimeModel,
    observed_minutes: f64,
}

impl WaitTimeEstimator {
    pub fn new(settings: &QueueSettings) -> Self {
        let base_minutes = settings.average_service_minutes.max(1);
        Self {
            base_minutes,
            model: settings.service_time_model,
            observed_minutes: base_minutes as f64,
        }
    }

    /// Minutes assumed per patient ahead in the queue.
    pub fn average_service_minutes(&self) -> u32 {
        match self.model {
            ServiceTimeModel::Fixed => self.base_minutes,
            ServiceTimeModel::Smoothed { .. } => (self.observed_minutes.ceil() as u32).max(1),
        }
    }

    /// Estimate for the entry at zero-based `index` in call order.
    pub fn estimate_for_index(&self, index: usize) -> u32 {
        let ahead_and_self = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
        ahead_and_self.saturating_mul(self.average_service_minutes())
    }

    /// Feeds an observed service duration into the smoothed model. Returns
    /// whether the per-patient average changed.
    pub fn record_service(&mut self, minutes: f64) -> bool {
        let ServiceTimeModel::Smoothed { alpha } = self.model else {
            return false;
        };
        if !minutes.is_finite() || minutes < 0.0 {
            return false;
        }

        let before = self.average_service_minutes();
        self.observed_minutes = alpha * minutes + (1.0 - alpha) * self.observed_minutes;
        before != self.average_service_minutes()
    }

    /// Rewrites position, estimate and expected call time for every waiting
    /// entry, returning the change events for entries whose position or
    /// estimate moved.
    pub(crate) fn refresh(&self, store: &mut EntryStore) -> Vec<QueueEvent> {
        let now = Utc::now();
        let ordered: Vec<Uuid> = PriorityOrderer::call_order(store.all())
            .into_iter()
            .map(|entry| entry.id)
            .collect();

        let mut events = Vec::new();
        for (index, id) in ordered.into_iter().enumerate() {
            let position = index as u32 + 1;
            let estimate = self.estimate_for_index(index);
            let mut position_changed = false;
            let mut estimate_changed = false;

            let updated = store.update(id, |entry| {
                position_changed = entry.position != Some(position);
                estimate_changed = entry.estimated_wait_time != estimate;
                entry.position = Some(position);
                entry.estimated_wait_time = estimate;
                entry.estimated_call_time = Some(now + Duration::minutes(i64::from(estimate)));
            });
            if updated.is_err() {
                continue;
            }

            if position_changed {
                events.push(QueueEvent::PositionChanged { entry_id: id, position });
            }
            if estimate_changed {
                events.push(QueueEvent::EstimatedTimeUpdated {
                    entry_id: id,
                    estimated_wait_time: estimate,
                });
            }
        }
        events
    }
}
