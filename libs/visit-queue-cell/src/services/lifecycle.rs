use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::estimator::WaitTimeEstimator;
use crate::services::notifier::{GlobalReceiver, QueueNotifier, QueueSubscription};
use crate::services::ordering::PriorityOrderer;
use crate::services::station::StationFilter;
use crate::services::stats::StatsAggregator;
use crate::services::store::EntryStore;
use crate::{
    JoinQueueRequest, QueueError, QueueEvent, QueueOperation, QueueSettings, QueueStats,
    VisitEntry, VisitStatus,
};

struct QueueState {
    store: EntryStore,
    estimator: WaitTimeEstimator,
    next_queue_number: u32,
    queue_day: Option<NaiveDate>,
    last_check_in: Option<DateTime<Utc>>,
    closed: bool,
}

impl QueueState {
    fn new(settings: &QueueSettings) -> Self {
        Self {
            store: EntryStore::new(),
            estimator: WaitTimeEstimator::new(settings),
            next_queue_number: 1,
            queue_day: None,
            last_check_in: None,
            closed: false,
        }
    }

    /// A closed queue has been handed back to the registry; nothing may be
    /// added to it afterwards.
    fn ensure_open(&self, clinic_id: &str) -> Result<(), QueueError> {
        if self.closed {
            return Err(QueueError::ClinicNotFound(clinic_id.to_string()));
        }
        Ok(())
    }

    fn take_queue_number(&mut self, now: DateTime<Utc>) -> u32 {
        let today = now.date_naive();
        if self.queue_day != Some(today) {
            self.queue_day = Some(today);
            self.next_queue_number = 1;
        }
        let number = self.next_queue_number;
        self.next_queue_number = self.next_queue_number.saturating_add(1);
        number
    }

    /// Check-in times never go backwards, so queue numbers and check-in
    /// order agree even if the wall clock steps back.
    fn check_in_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let time = match self.last_check_in {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_check_in = Some(time);
        time
    }
}

/// Visit queue for one clinic. Every mutating operation runs its
/// read-modify-write under a single lock; subscribers are notified after the
/// lock is released, in the order the operations committed.
pub struct VisitQueue {
    clinic_id: String,
    settings: QueueSettings,
    state: Mutex<QueueState>,
    publish_order: Mutex<()>,
    notifier: QueueNotifier,
}

impl VisitQueue {
    pub fn new(clinic_id: &str, settings: QueueSettings) -> Self {
        Self {
            clinic_id: clinic_id.to_string(),
            state: Mutex::new(QueueState::new(&settings)),
            publish_order: Mutex::new(()),
            notifier: QueueNotifier::new(clinic_id, settings.event_buffer),
            settings,
        }
    }

    pub fn clinic_id(&self) -> &str {
        &self.clinic_id
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub async fn join_queue(&self, request: JoinQueueRequest) -> Result<VisitEntry, QueueError> {
        validate_join_request(&request)?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.ensure_open(&self.clinic_id)?;
        if state.store.by_patient(&request.patient_id).is_some() {
            warn!(
                "Patient {} already has an active entry in clinic {}",
                request.patient_id, self.clinic_id
            );
            return Err(QueueError::DuplicateActivePatient(request.patient_id));
        }

        let check_in_time = state.check_in_time();
        let queue_number = state.take_queue_number(check_in_time);
        let entry = VisitEntry::new(&self.clinic_id, request, queue_number, check_in_time);
        let id = entry.id;
        state.store.insert(entry)?;

        let refresh = state.estimator.refresh(&mut state.store);
        let entry = state.store.get(id)?.clone();

        let mut events = vec![QueueEvent::Joined { entry: entry.clone() }];
        events.extend(refresh);
        self.publish_after(guard, events).await;

        info!(
            "Patient {} joined clinic {} queue as #{} ({:?})",
            entry.patient_id, self.clinic_id, entry.queue_number, entry.priority
        );
        Ok(entry)
    }

    /// Calls the highest-ranked waiting entry the filter accepts. Selection
    /// and transition happen under one lock, so concurrent stations never
    /// receive the same entry.
    pub async fn call_next(&self, filter: Option<&dyn StationFilter>) -> Result<VisitEntry, QueueError> {
        let mut state = self.state.lock().await;
        state.ensure_open(&self.clinic_id)?;
        let next_id = PriorityOrderer::call_order(state.store.all())
            .into_iter()
            .find(|entry| filter.map_or(true, |f| f.accepts(entry)))
            .map(|entry| entry.id)
            .ok_or(QueueError::QueueEmpty)?;

        let station = filter.and_then(|f| f.station_id());
        let (entry, events) = commit_transition(&mut state, next_id, QueueOperation::Call, station, None)?;
        self.publish_after(state, events).await;

        info!(
            "Called #{} ({}) in clinic {}",
            entry.queue_number, entry.patient_name, self.clinic_id
        );
        Ok(entry)
    }

    pub async fn call_patient(
        &self,
        id: Uuid,
        filter: Option<&dyn StationFilter>,
    ) -> Result<VisitEntry, QueueError> {
        let mut state = self.state.lock().await;
        state.ensure_open(&self.clinic_id)?;
        let current = state.store.get(id)?;
        if current.status != VisitStatus::Waiting {
            return Err(QueueError::InvalidTransition {
                id,
                from: current.status,
                operation: QueueOperation::Call,
            });
        }
        if let Some(filter) = filter {
            if !filter.accepts(current) {
                return Err(QueueError::NotEligible {
                    id,
                    station: filter.station_id().unwrap_or("unassigned").to_string(),
                });
            }
        }

        let station = filter.and_then(|f| f.station_id());
        let (entry, events) = commit_transition(&mut state, id, QueueOperation::Call, station, None)?;
        self.publish_after(state, events).await;

        info!("Called entry {} in clinic {}", id, self.clinic_id);
        Ok(entry)
    }

    pub async fn start_service(&self, id: Uuid) -> Result<VisitEntry, QueueError> {
        self.transition(id, QueueOperation::StartService, None).await
    }

    pub async fn complete_service(&self, id: Uuid) -> Result<VisitEntry, QueueError> {
        self.transition(id, QueueOperation::CompleteService, None).await
    }

    pub async fn cancel_entry(&self, id: Uuid, reason: Option<String>) -> Result<VisitEntry, QueueError> {
        self.transition(id, QueueOperation::Cancel, reason).await
    }

    pub async fn mark_no_show(&self, id: Uuid) -> Result<VisitEntry, QueueError> {
        self.transition(id, QueueOperation::MarkNoShow, None).await
    }

    pub async fn update_notes(&self, id: Uuid, notes: Option<String>) -> Result<VisitEntry, QueueError> {
        let mut state = self.state.lock().await;
        state.ensure_open(&self.clinic_id)?;
        let now = Utc::now();
        let entry = state
            .store
            .update(id, |entry| {
                entry.notes = notes;
                entry.updated_at = now;
            })?
            .clone();
        self.publish_after(state, vec![QueueEvent::Updated { entry: entry.clone() }])
            .await;

        debug!("Updated notes for entry {} in clinic {}", id, self.clinic_id);
        Ok(entry)
    }

    pub async fn get_entry(&self, id: Uuid) -> Result<VisitEntry, QueueError> {
        let state = self.state.lock().await;
        state.store.get(id).cloned()
    }

    /// 1-based rank among waiting entries; `None` if the entry is not waiting.
    pub async fn get_position(&self, id: Uuid) -> Option<u32> {
        let state = self.state.lock().await;
        match state.store.get(id) {
            Ok(entry) if entry.is_waiting() => PriorityOrderer::position_of(state.store.all(), id),
            _ => None,
        }
    }

    pub async fn get_entry_by_patient_id(&self, patient_id: &str) -> Option<VisitEntry> {
        let state = self.state.lock().await;
        state.store.by_patient(patient_id).cloned()
    }

    /// Waiting entries come back in call order, all others by check-in.
    pub async fn get_entries_by_status(&self, status: VisitStatus) -> Vec<VisitEntry> {
        let state = self.state.lock().await;
        if status == VisitStatus::Waiting {
            return PriorityOrderer::call_order(state.store.all())
                .into_iter()
                .cloned()
                .collect();
        }
        sorted_by_check_in(state.store.by_status(status))
    }

    pub async fn get_all_entries(&self) -> Vec<VisitEntry> {
        let state = self.state.lock().await;
        sorted_by_check_in(state.store.all())
    }

    /// Called or in-service entries held by a station.
    pub async fn get_active_for_station(&self, station_id: &str) -> Vec<VisitEntry> {
        let state = self.state.lock().await;
        sorted_by_check_in(state.store.all().filter(|entry| {
            matches!(entry.status, VisitStatus::Called | VisitStatus::InService)
                && entry.station_id.as_deref() == Some(station_id)
        }))
    }

    pub async fn get_stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        StatsAggregator::compute(&state.store)
    }

    pub fn subscribe(&self) -> QueueSubscription {
        self.notifier.subscribe()
    }

    pub fn subscribe_global(&self) -> GlobalReceiver {
        self.notifier.subscribe_global()
    }

    pub fn subscriber_count(&self) -> usize {
        self.notifier.subscriber_count()
    }

    /// Restores entries loaded from the persistent store. The batch is
    /// rejected as a whole if any entry collides with another.
    pub async fn seed(&self, entries: Vec<VisitEntry>) -> Result<usize, QueueError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.ensure_open(&self.clinic_id)?;

        let mut ids = HashSet::new();
        let mut active_patients = HashSet::new();
        for entry in &entries {
            if state.store.contains(entry.id) || !ids.insert(entry.id) {
                return Err(QueueError::DuplicateId(entry.id));
            }
            if !entry.status.is_terminal()
                && (state.store.by_patient(&entry.patient_id).is_some()
                    || !active_patients.insert(entry.patient_id.as_str()))
            {
                return Err(QueueError::DuplicateActivePatient(entry.patient_id.clone()));
            }
        }

        let today = Utc::now().date_naive();
        let mut sorted = entries;
        sorted.sort_by(|a, b| {
            a.check_in_time
                .cmp(&b.check_in_time)
                .then_with(|| a.queue_number.cmp(&b.queue_number))
        });

        let count = sorted.len();
        for mut entry in sorted {
            entry.clinic_id = self.clinic_id.clone();
            if entry.check_in_time.date_naive() == today {
                if state.queue_day != Some(today) {
                    state.queue_day = Some(today);
                    state.next_queue_number = 1;
                }
                state.next_queue_number = state
                    .next_queue_number
                    .max(entry.queue_number.saturating_add(1));
            }
            if state.last_check_in.map_or(true, |last| entry.check_in_time > last) {
                state.last_check_in = Some(entry.check_in_time);
            }
            if !entry.is_waiting() {
                entry.position = None;
                entry.estimated_call_time = None;
            }
            state.store.insert(entry)?;
        }

        let events = state.estimator.refresh(&mut state.store);
        self.publish_after(guard, events).await;

        info!("Seeded {} entries into clinic {} queue", count, self.clinic_id);
        Ok(count)
    }

    /// Terminal entries last updated before `cutoff`, oldest first.
    pub async fn terminal_entries_before(&self, cutoff: DateTime<Utc>) -> Vec<VisitEntry> {
        let state = self.state.lock().await;
        let mut entries: Vec<VisitEntry> = state
            .store
            .all()
            .filter(|entry| entry.status.is_terminal() && entry.updated_at < cutoff)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        entries
    }

    /// Removes the given entries if they are terminal; active ids are skipped.
    pub async fn purge(&self, ids: &[Uuid]) -> Vec<VisitEntry> {
        let mut state = self.state.lock().await;
        let removed: Vec<VisitEntry> = ids
            .iter()
            .filter_map(|id| state.store.remove_terminal(*id))
            .collect();
        if !removed.is_empty() {
            debug!("Purged {} terminal entries from clinic {}", removed.len(), self.clinic_id);
        }
        removed
    }

    pub async fn archive_terminal(&self, cutoff: DateTime<Utc>) -> Vec<VisitEntry> {
        let ids: Vec<Uuid> = self
            .terminal_entries_before(cutoff)
            .await
            .iter()
            .map(|entry| entry.id)
            .collect();
        self.purge(&ids).await
    }

    /// Recomputes positions and estimates; returns the number of change events.
    pub async fn refresh_estimates(&self) -> usize {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let events = state.estimator.refresh(&mut state.store);
        let count = events.len();
        self.publish_after(guard, events).await;
        count
    }

    /// Tears the queue down: closes subscriptions and hands back every entry.
    /// Later mutations fail with `ClinicNotFound`.
    pub async fn close(&self) -> Vec<VisitEntry> {
        let entries = {
            let mut state = self.state.lock().await;
            state.closed = true;
            state.store.drain()
        };
        {
            let _order = self.publish_order.lock().await;
            self.notifier.close_all();
        }
        info!("Closed clinic {} queue with {} entries", self.clinic_id, entries.len());
        entries
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    async fn transition(
        &self,
        id: Uuid,
        operation: QueueOperation,
        note: Option<String>,
    ) -> Result<VisitEntry, QueueError> {
        let mut state = self.state.lock().await;
        state.ensure_open(&self.clinic_id)?;
        let (entry, events) = commit_transition(&mut state, id, operation, None, note)?;
        self.publish_after(state, events).await;

        info!(
            "Entry {} in clinic {} is now {} after {}",
            id, self.clinic_id, entry.status, operation
        );
        Ok(entry)
    }

    /// Takes the publish slot before releasing the state lock, so batches
    /// reach subscribers in commit order without notifying under the lock.
    async fn publish_after(&self, state: MutexGuard<'_, QueueState>, events: Vec<QueueEvent>) {
        let _order = self.publish_order.lock().await;
        drop(state);
        self.notifier.publish(events);
    }
}

fn validate_join_request(request: &JoinQueueRequest) -> Result<(), QueueError> {
    if request.patient_id.trim().is_empty() {
        return Err(QueueError::Validation("patient_id is required".to_string()));
    }
    if request.patient_name.trim().is_empty() {
        return Err(QueueError::Validation("patient_name is required".to_string()));
    }
    Ok(())
}

fn sorted_by_check_in<'a, I>(entries: I) -> Vec<VisitEntry>
where
    I: Iterator<Item = &'a VisitEntry>,
{
    let mut entries: Vec<VisitEntry> = entries.cloned().collect();
    entries.sort_by(|a, b| {
        a.check_in_time
            .cmp(&b.check_in_time)
            .then_with(|| a.sequence.cmp(&b.sequence))
    });
    entries
}

/// Validates and applies one state-machine edge, then refreshes estimates
/// when the waiting set or the service-time average changed. Nothing is
/// mutated when validation fails.
fn commit_transition(
    state: &mut QueueState,
    id: Uuid,
    operation: QueueOperation,
    station: Option<&str>,
    note: Option<String>,
) -> Result<(VisitEntry, Vec<QueueEvent>), QueueError> {
    let from = state.store.get(id)?.status;
    let target = operation.target_status();
    if !from.can_transition_to(&target) {
        warn!("Rejected {} for entry {} in status {}", operation, id, from);
        return Err(QueueError::InvalidTransition { id, from, operation });
    }

    let now = Utc::now();
    let entry = state
        .store
        .update(id, |entry| {
            entry.status = target;
            entry.updated_at = now;
            match operation {
                QueueOperation::Call => {
                    entry.called_time = Some(now);
                    entry.station_id = station.map(str::to_string);
                }
                QueueOperation::StartService => entry.service_start_time = Some(now),
                QueueOperation::CompleteService => entry.completed_time = Some(now),
                QueueOperation::Cancel | QueueOperation::MarkNoShow => {}
            }
            if let Some(note) = note {
                entry.notes = Some(note);
            }
            if from == VisitStatus::Waiting {
                entry.position = None;
                entry.estimated_call_time = None;
            }
        })?
        .clone();

    let mut refresh_needed = from == VisitStatus::Waiting;
    if operation == QueueOperation::CompleteService {
        if let Some(minutes) = entry.service_minutes() {
            refresh_needed |= state.estimator.record_service(minutes);
        }
    }

    let mut events = vec![match operation {
        QueueOperation::Call => QueueEvent::Called { entry: entry.clone() },
        QueueOperation::CompleteService => QueueEvent::Completed { entry: entry.clone() },
        QueueOperation::Cancel => QueueEvent::Cancelled { entry: entry.clone() },
        QueueOperation::StartService | QueueOperation::MarkNoShow => {
            QueueEvent::Updated { entry: entry.clone() }
        }
    }];
    if refresh_needed {
        events.extend(state.estimator.refresh(&mut state.store));
    }

    Ok((entry, events))
}
