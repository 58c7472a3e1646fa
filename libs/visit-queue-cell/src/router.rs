use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::{
    call_next, call_patient, cancel_entry, complete_service, create_clinic_queue,
    destroy_clinic_queue, get_entry, get_entry_by_patient, get_position, get_queue_stats,
    get_station_entries, join_queue, list_entries, mark_no_show, start_service, update_notes,
    QueueAppState,
};

pub fn create_visit_queue_router(state: Arc<QueueAppState>) -> Router {
    Router::new()
        .route(
            "/clinics/{clinic_id}",
            post(create_clinic_queue).delete(destroy_clinic_queue),
        )
        .route("/clinics/{clinic_id}/entries", post(join_queue).get(list_entries))
        .route("/clinics/{clinic_id}/entries/{entry_id}", get(get_entry))
        .route("/clinics/{clinic_id}/call-next", post(call_next))
        .route("/clinics/{clinic_id}/entries/{entry_id}/call", post(call_patient))
        .route("/clinics/{clinic_id}/entries/{entry_id}/start", post(start_service))
        .route("/clinics/{clinic_id}/entries/{entry_id}/complete", post(complete_service))
        .route("/clinics/{clinic_id}/entries/{entry_id}/cancel", post(cancel_entry))
        .route("/clinics/{clinic_id}/entries/{entry_id}/no-show", post(mark_no_show))
        .route("/clinics/{clinic_id}/entries/{entry_id}/notes", put(update_notes))
        .route("/clinics/{clinic_id}/entries/{entry_id}/position", get(get_position))
        .route("/clinics/{clinic_id}/patients/{patient_id}", get(get_entry_by_patient))
        .route("/clinics/{clinic_id}/stations/{station_id}", get(get_station_entries))
        .route("/clinics/{clinic_id}/stats", get(get_queue_stats))
        .with_state(state)
}
