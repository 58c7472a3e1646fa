use thiserror::Error;
use uuid::Uuid;

use crate::{QueueOperation, VisitStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Visit entry not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot {operation} entry {id} while it is {from}")]
    InvalidTransition {
        id: Uuid,
        from: VisitStatus,
        operation: QueueOperation,
    },

    #[error("Visit entry {0} already exists")]
    DuplicateId(Uuid),

    #[error("Patient {0} already has an active visit entry")]
    DuplicateActivePatient(String),

    #[error("No waiting entries are eligible to be called")]
    QueueEmpty,

    #[error("Entry {id} is not eligible for station {station}")]
    NotEligible { id: Uuid, station: String },

    #[error("Clinic queue not found: {0}")]
    ClinicNotFound(String),

    #[error("Clinic queue already exists: {0}")]
    ClinicAlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Archive error: {0}")]
    Archive(String),
}
