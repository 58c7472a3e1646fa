use crate::VisitEntry;

/// Eligibility predicate a station applies when calling patients.
pub trait StationFilter: Send + Sync {
    fn accepts(&self, entry: &VisitEntry) -> bool;

    /// Station recorded on entries this filter calls.
    fn station_id(&self) -> Option<&str> {
        None
    }
}

impl<F> StationFilter for F
where
    F: Fn(&VisitEntry) -> bool + Send + Sync,
{
    fn accepts(&self, entry: &VisitEntry) -> bool {
        self(entry)
    }
}

/// Accepts entries that have no preferred station or prefer this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedStation(pub String);

impl AssignedStation {
    pub fn new(station_id: &str) -> Self {
        Self(station_id.to_string())
    }
}

impl StationFilter for AssignedStation {
    fn accepts(&self, entry: &VisitEntry) -> bool {
        entry
            .preferred_station
            .as_deref()
            .map_or(true, |preferred| preferred == self.0)
    }

    fn station_id(&self) -> Option<&str> {
        Some(&self.0)
    }
}
