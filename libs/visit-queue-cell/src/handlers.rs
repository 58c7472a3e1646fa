use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::{
    AssignedStation, ClinicQueueRegistry, JoinQueueRequest, QueueError, QueueSettings,
    QueueStats, StationFilter, VisitEntry, VisitStatus,
};

pub struct QueueAppState {
    pub registry: ClinicQueueRegistry,
    pub config: Arc<AppConfig>,
}

impl QueueAppState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let settings = QueueSettings::from_config(&config);
        Self {
            registry: ClinicQueueRegistry::new(settings),
            config,
        }
    }

    pub fn with_registry(registry: ClinicQueueRegistry, config: Arc<AppConfig>) -> Self {
        Self { registry, config }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EntriesQuery {
    pub status: Option<VisitStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallRequest {
    pub station_id: Option<String>,
}

impl CallRequest {
    fn station(&self) -> Option<AssignedStation> {
        self.station_id.as_deref().map(AssignedStation::new)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotesRequest {
    pub notes: Option<String>,
}

/// Create a clinic queue
pub async fn create_clinic_queue(
    State(state): State<Arc<QueueAppState>>,
    Path(clinic_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), QueueError> {
    let queue = state.registry.create(&clinic_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "clinic_id": queue.clinic_id(),
            "average_service_minutes": queue.settings().average_service_minutes,
        })),
    ))
}

/// Tear down a clinic queue, returning the entries it still held
pub async fn destroy_clinic_queue(
    State(state): State<Arc<QueueAppState>>,
    Path(clinic_id): Path<String>,
) -> Result<Json<Value>, QueueError> {
    let entries = state.registry.destroy(&clinic_id).await?;
    info!("Clinic {} queue destroyed with {} entries", clinic_id, entries.len());

    Ok(Json(json!({
        "success": true,
        "clinic_id": clinic_id,
        "entries": entries,
    })))
}

/// Add a patient to the queue
pub async fn join_queue(
    State(state): State<Arc<QueueAppState>>,
    Path(clinic_id): Path<String>,
    Json(request): Json<JoinQueueRequest>,
) -> Result<(StatusCode, Json<VisitEntry>), QueueError> {
    let queue = state.registry.get_or_create(&clinic_id).await?;
    let entry = queue.join_queue(request).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list_entries(
    State(state): State<Arc<QueueAppState>>,
    Path(clinic_id): Path<String>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<Vec<VisitEntry>>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    let entries = match query.status {
        Some(status) => queue.get_entries_by_status(status).await,
        None => queue.get_all_entries().await,
    };
    Ok(Json(entries))
}

pub async fn get_entry(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, entry_id)): Path<(String, Uuid)>,
) -> Result<Json<VisitEntry>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    Ok(Json(queue.get_entry(entry_id).await?))
}

/// Call the next eligible patient. The body is optional; without a
/// `station_id` any waiting entry may be called.
pub async fn call_next(
    State(state): State<Arc<QueueAppState>>,
    Path(clinic_id): Path<String>,
    body: Option<Json<CallRequest>>,
) -> Result<Json<VisitEntry>, QueueError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let queue = state.registry.get(&clinic_id).await?;
    let station = request.station();
    let filter = station.as_ref().map(|s| s as &dyn StationFilter);
    Ok(Json(queue.call_next(filter).await?))
}

pub async fn call_patient(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, entry_id)): Path<(String, Uuid)>,
    body: Option<Json<CallRequest>>,
) -> Result<Json<VisitEntry>, QueueError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let queue = state.registry.get(&clinic_id).await?;
    let station = request.station();
    let filter = station.as_ref().map(|s| s as &dyn StationFilter);
    Ok(Json(queue.call_patient(entry_id, filter).await?))
}

pub async fn start_service(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, entry_id)): Path<(String, Uuid)>,
) -> Result<Json<VisitEntry>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    Ok(Json(queue.start_service(entry_id).await?))
}

pub async fn complete_service(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, entry_id)): Path<(String, Uuid)>,
) -> Result<Json<VisitEntry>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    Ok(Json(queue.complete_service(entry_id).await?))
}

pub async fn cancel_entry(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, entry_id)): Path<(String, Uuid)>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<VisitEntry>, QueueError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let queue = state.registry.get(&clinic_id).await?;
    Ok(Json(queue.cancel_entry(entry_id, request.reason).await?))
}

pub async fn mark_no_show(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, entry_id)): Path<(String, Uuid)>,
) -> Result<Json<VisitEntry>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    Ok(Json(queue.mark_no_show(entry_id).await?))
}

pub async fn update_notes(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, entry_id)): Path<(String, Uuid)>,
    Json(request): Json<NotesRequest>,
) -> Result<Json<VisitEntry>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    Ok(Json(queue.update_notes(entry_id, request.notes).await?))
}

/// Position among waiting entries, -1 when the entry is not waiting
pub async fn get_position(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, entry_id)): Path<(String, Uuid)>,
) -> Result<Json<Value>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    let position = queue
        .get_position(entry_id)
        .await
        .map_or(-1, i64::from);

    Ok(Json(json!({
        "entry_id": entry_id,
        "position": position,
    })))
}

pub async fn get_entry_by_patient(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, patient_id)): Path<(String, String)>,
) -> Result<Json<Value>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    let entry = queue.get_entry_by_patient_id(&patient_id).await;

    Ok(Json(json!({
        "patient_id": patient_id,
        "entry": entry,
    })))
}

pub async fn get_station_entries(
    State(state): State<Arc<QueueAppState>>,
    Path((clinic_id, station_id)): Path<(String, String)>,
) -> Result<Json<Vec<VisitEntry>>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    Ok(Json(queue.get_active_for_station(&station_id).await))
}

pub async fn get_queue_stats(
    State(state): State<Arc<QueueAppState>>,
    Path(clinic_id): Path<String>,
) -> Result<Json<QueueStats>, QueueError> {
    let queue = state.registry.get(&clinic_id).await?;
    Ok(Json(queue.get_stats().await))
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueueError::NotFound(_) | QueueError::ClinicNotFound(_) => StatusCode::NOT_FOUND,
            QueueError::InvalidTransition { .. }
            | QueueError::DuplicateId(_)
            | QueueError::DuplicateActivePatient(_)
            | QueueError::ClinicAlreadyExists(_)
            | QueueError::QueueEmpty => StatusCode::CONFLICT,
            QueueError::NotEligible { .. } | QueueError::Validation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            QueueError::Archive(_) => StatusCode::BAD_GATEWAY,
        };

        if status.is_server_error() {
            error!("Queue request failed: {}", self);
        } else {
            warn!("Queue request rejected: {}", self);
        }

        (
            status,
            Json(json!({
                "error": self.to_string(),
                "timestamp": chrono::Utc::now(),
            })),
        )
            .into_response()
    }
}
