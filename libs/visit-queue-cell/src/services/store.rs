use std::collections::HashMap;

use uuid::Uuid;

use crate::{QueueError, VisitEntry, VisitStatus};

/// Authoritative entry map for one clinic, with a secondary index from
/// patient id to that patient's single non-terminal entry.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: HashMap<Uuid, VisitEntry>,
    active_by_patient: HashMap<String, Uuid>,
    next_sequence: u64,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut entry: VisitEntry) -> Result<&VisitEntry, QueueError> {
        if self.entries.contains_key(&entry.id) {
            return Err(QueueError::DuplicateId(entry.id));
        }
        let is_active = !entry.status.is_terminal();
        if is_active && self.active_by_patient.contains_key(&entry.patient_id) {
            return Err(QueueError::DuplicateActivePatient(entry.patient_id));
        }

        entry.sequence = self.next_sequence;
        self.next_sequence += 1;

        let id = entry.id;
        if is_active {
            self.active_by_patient.insert(entry.patient_id.clone(), id);
        }
        Ok(self.entries.entry(id).or_insert(entry))
    }

    pub fn get(&self, id: Uuid) -> Result<&VisitEntry, QueueError> {
        self.entries.get(&id).ok_or(QueueError::NotFound(id))
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    /// The patient's non-terminal entry, if any.
    pub fn by_patient(&self, patient_id: &str) -> Option<&VisitEntry> {
        self.active_by_patient
            .get(patient_id)
            .and_then(|id| self.entries.get(id))
    }

    pub fn all(&self) -> impl Iterator<Item = &VisitEntry> + Clone + '_ {
        self.entries.values()
    }

    pub fn by_status(&self, status: VisitStatus) -> impl Iterator<Item = &VisitEntry> + Clone + '_ {
        self.entries.values().filter(move |entry| entry.status == status)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies `apply` to the entry and keeps the patient index in step with
    /// the resulting status.
    pub(crate) fn update<F>(&mut self, id: Uuid, apply: F) -> Result<&VisitEntry, QueueError>
    where
        F: FnOnce(&mut VisitEntry),
    {
        let entry = self.entries.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        apply(entry);

        if entry.status.is_terminal()
            && self.active_by_patient.get(&entry.patient_id) == Some(&id)
        {
            self.active_by_patient.remove(&entry.patient_id);
        }
        Ok(entry)
    }

    /// Removes an entry only if it is already terminal.
    pub(crate) fn remove_terminal(&mut self, id: Uuid) -> Option<VisitEntry> {
        match self.entries.get(&id) {
            Some(entry) if entry.status.is_terminal() => self.entries.remove(&id),
            _ => None,
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<VisitEntry> {
        self.active_by_patient.clear();
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}
