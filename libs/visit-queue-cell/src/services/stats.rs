use crate::services::store::EntryStore;
use crate::{QueueStats, VisitStatus};

pub struct StatsAggregator;

impl StatsAggregator {
    /// Single pass over the store; never mutates entries.
    pub fn compute(store: &EntryStore) -> QueueStats {
        let mut stats = QueueStats::default();
        let mut wait_total = 0u64;
        let mut service_total = 0.0f64;
        let mut service_samples = 0usize;

        for entry in store.all() {
            stats.total += 1;
            match entry.status {
                VisitStatus::Waiting => {
                    stats.waiting += 1;
                    wait_total += u64::from(entry.estimated_wait_time);
                }
                VisitStatus::Called => stats.called += 1,
                VisitStatus::InService => stats.in_service += 1,
                VisitStatus::Completed => {
                    stats.completed += 1;
                    if let Some(minutes) = entry.service_minutes() {
                        service_total += minutes;
                        service_samples += 1;
                    }
                }
                VisitStatus::Cancelled => stats.cancelled += 1,
                VisitStatus::NoShow => stats.no_show += 1,
            }
        }

        if stats.waiting > 0 {
            stats.average_wait_time = wait_total as f64 / stats.waiting as f64;
        }
        if service_samples > 0 {
            stats.average_service_time = service_total / service_samples as f64;
        }
        stats
    }
}
