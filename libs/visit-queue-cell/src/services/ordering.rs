use std::cmp::Ordering;

use uuid::Uuid;

use crate::VisitEntry;

/// Call order for waiting entries: priority tier first, then arrival.
pub struct PriorityOrderer;

impl PriorityOrderer {
    /// Waiting entries from `entries` in the order they should be called.
    /// Non-waiting entries are ignored.
    pub fn call_order<'a, I>(entries: I) -> Vec<&'a VisitEntry>
    where
        I: IntoIterator<Item = &'a VisitEntry>,
    {
        let mut waiting: Vec<&VisitEntry> = entries
            .into_iter()
            .filter(|entry| entry.is_waiting())
            .collect();
        waiting.sort_by(|a, b| Self::compare(a, b));
        waiting
    }

    /// 1-based rank of `id` among waiting entries.
    pub fn position_of<'a, I>(entries: I, id: Uuid) -> Option<u32>
    where
        I: IntoIterator<Item = &'a VisitEntry>,
    {
        Self::call_order(entries)
            .iter()
            .position(|entry| entry.id == id)
            .map(|index| index as u32 + 1)
    }

    pub fn compare(a: &VisitEntry, b: &VisitEntry) -> Ordering {
        b.priority
            .rank()
            .cmp(&a.priority.rank())
            .then_with(|| a.check_in_time.cmp(&b.check_in_time))
            .then_with(|| a.sequence.cmp(&b.sequence))
    }
}
