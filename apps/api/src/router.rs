use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use visit_queue_cell::{create_visit_queue_router, QueueAppState};

pub fn create_router(state: Arc<QueueAppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic visit queue API is running!" }))
        .nest("/queue", create_visit_queue_router(state))
}
