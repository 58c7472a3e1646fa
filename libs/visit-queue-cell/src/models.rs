use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitEntry {
    pub id: Uuid,
    pub clinic_id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub queue_number: u32,
    pub appointment_type: String,
    pub priority: VisitPriority,
    pub status: VisitStatus,
    pub check_in_time: DateTime<Utc>,
    pub called_time: Option<DateTime<Utc>>,
    pub service_start_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Minutes. Only meaningful while the entry is waiting.
    pub estimated_wait_time: u32,
    /// Wall-clock time the entry is expected to be called, refreshed with the estimate.
    pub estimated_call_time: Option<DateTime<Utc>>,
    /// 1-based rank among waiting entries, `None` once the entry left the waiting set.
    pub position: Option<u32>,
    pub preferred_station: Option<String>,
    pub station_id: Option<String>,
    pub notes: Option<String>,
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl VisitEntry {
    pub fn new(
        clinic_id: &str,
        request: JoinQueueRequest,
        queue_number: u32,
        check_in_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            clinic_id: clinic_id.to_string(),
            patient_id: request.patient_id,
            patient_name: request.patient_name,
            queue_number,
            appointment_type: request.appointment_type,
            priority: request.priority,
            status: VisitStatus::Waiting,
            check_in_time,
            called_time: None,
            service_start_time: None,
            completed_time: None,
            updated_at: check_in_time,
            estimated_wait_time: 0,
            estimated_call_time: None,
            position: None,
            preferred_station: request.preferred_station,
            station_id: None,
            notes: request.notes,
            sequence: 0,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == VisitStatus::Waiting
    }

    /// Minutes between being called and completing service.
    pub fn service_minutes(&self) -> Option<f64> {
        match (self.called_time, self.completed_time) {
            (Some(called), Some(completed)) => {
                let millis = (completed - called).num_milliseconds().max(0);
                Some(millis as f64 / 60_000.0)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinQueueRequest {
    pub patient_id: String,
    pub patient_name: String,
    #[serde(default = "default_appointment_type")]
    pub appointment_type: String,
    #[serde(default)]
    pub priority: VisitPriority,
    pub notes: Option<String>,
    pub preferred_station: Option<String>,
}

fn default_appointment_type() -> String {
    "walk-in".to_string()
}

impl JoinQueueRequest {
    pub fn new(patient_id: &str, patient_name: &str, priority: VisitPriority) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            patient_name: patient_name.to_string(),
            appointment_type: default_appointment_type(),
            priority,
            notes: None,
            preferred_station: None,
        }
    }

    pub fn with_appointment_type(mut self, appointment_type: &str) -> Self {
        self.appointment_type = appointment_type.to_string();
        self
    }

    pub fn with_preferred_station(mut self, station_id: &str) -> Self {
        self.preferred_station = Some(station_id.to_string());
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum VisitPriority {
    #[default]
    Normal,
    Urgent,
    Emergency,
}

impl VisitPriority {
    /// Higher rank is called first.
    pub fn rank(&self) -> u8 {
        match self {
            VisitPriority::Normal => 0,
            VisitPriority::Urgent => 1,
            VisitPriority::Emergency => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum VisitStatus {
    Waiting,
    Called,
    InService,
    Completed,
    Cancelled,
    NoShow,
}

impl VisitStatus {
    pub const ALL: [VisitStatus; 6] = [
        VisitStatus::Waiting,
        VisitStatus::Called,
        VisitStatus::InService,
        VisitStatus::Completed,
        VisitStatus::Cancelled,
        VisitStatus::NoShow,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Completed | VisitStatus::Cancelled | VisitStatus::NoShow)
    }

    pub fn can_transition_to(&self, target: &VisitStatus) -> bool {
        use VisitStatus::*;
        match (self, target) {
            (Waiting, Called) => true,
            (Called, InService) => true,
            (InService, Completed) => true,
            (Waiting | Called, Cancelled) => true,
            (Waiting | Called, NoShow) => true,
            _ => false,
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VisitStatus::Waiting => "waiting",
            VisitStatus::Called => "called",
            VisitStatus::InService => "in-service",
            VisitStatus::Completed => "completed",
            VisitStatus::Cancelled => "cancelled",
            VisitStatus::NoShow => "no-show",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOperation {
    Call,
    StartService,
    CompleteService,
    Cancel,
    MarkNoShow,
}

impl QueueOperation {
    pub fn target_status(&self) -> VisitStatus {
        match self {
            QueueOperation::Call => VisitStatus::Called,
            QueueOperation::StartService => VisitStatus::InService,
            QueueOperation::CompleteService => VisitStatus::Completed,
            QueueOperation::Cancel => VisitStatus::Cancelled,
            QueueOperation::MarkNoShow => VisitStatus::NoShow,
        }
    }
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueueOperation::Call => "call",
            QueueOperation::StartService => "start service",
            QueueOperation::CompleteService => "complete service",
            QueueOperation::Cancel => "cancel",
            QueueOperation::MarkNoShow => "mark no-show",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub total: usize,
    pub waiting: usize,
    pub called: usize,
    pub in_service: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
    pub average_wait_time: f64,
    pub average_service_time: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventKind {
    Joined,
    Updated,
    Called,
    Completed,
    Cancelled,
    PositionChanged,
    EstimatedTimeUpdated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    Joined { entry: VisitEntry },
    Updated { entry: VisitEntry },
    Called { entry: VisitEntry },
    Completed { entry: VisitEntry },
    Cancelled { entry: VisitEntry },
    PositionChanged { entry_id: Uuid, position: u32 },
    EstimatedTimeUpdated { entry_id: Uuid, estimated_wait_time: u32 },
}

impl QueueEvent {
    pub fn kind(&self) -> QueueEventKind {
        match self {
            QueueEvent::Joined { .. } => QueueEventKind::Joined,
            QueueEvent::Updated { .. } => QueueEventKind::Updated,
            QueueEvent::Called { .. } => QueueEventKind::Called,
            QueueEvent::Completed { .. } => QueueEventKind::Completed,
            QueueEvent::Cancelled { .. } => QueueEventKind::Cancelled,
            QueueEvent::PositionChanged { .. } => QueueEventKind::PositionChanged,
            QueueEvent::EstimatedTimeUpdated { .. } => QueueEventKind::EstimatedTimeUpdated,
        }
    }

    pub fn entry_id(&self) -> Uuid {
        match self {
            QueueEvent::Joined { entry }
            | QueueEvent::Updated { entry }
            | QueueEvent::Called { entry }
            | QueueEvent::Completed { entry }
            | QueueEvent::Cancelled { entry } => entry.id,
            QueueEvent::PositionChanged { entry_id, .. }
            | QueueEvent::EstimatedTimeUpdated { entry_id, .. } => *entry_id,
        }
    }
}

/// Envelope handed to subscribers and transport adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueNotification {
    pub clinic_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: QueueEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ServiceTimeModel {
    Fixed,
    /// Exponentially weighted average of observed service durations.
    Smoothed { alpha: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    pub average_service_minutes: u32,
    pub service_time_model: ServiceTimeModel,
    pub event_buffer: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            average_service_minutes: 15,
            service_time_model: ServiceTimeModel::Fixed,
            event_buffer: 256,
        }
    }
}

impl QueueSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let service_time_model = match config.queue_service_time_smoothing {
            Some(alpha) if alpha > 0.0 && alpha <= 1.0 => ServiceTimeModel::Smoothed { alpha },
            _ => ServiceTimeModel::Fixed,
        };

        Self {
            average_service_minutes: config.queue_average_service_minutes.max(1),
            service_time_model,
            event_buffer: config.queue_event_buffer.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceConfig {
    pub interval_seconds: u64,
    pub archive_after_minutes: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            archive_after_minutes: 240,
        }
    }
}

impl MaintenanceConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interval_seconds: config.queue_maintenance_interval_seconds.max(1),
            archive_after_minutes: config.queue_archive_after_minutes.max(0),
        }
    }
}
