pub mod models;
pub mod services;
pub mod error;
pub mod handlers;
pub mod router;

pub use models::*;
pub use error::*;
pub use services::*;
pub use handlers::QueueAppState;
pub use router::create_visit_queue_router;
