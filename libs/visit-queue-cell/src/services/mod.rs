pub mod store;
pub mod ordering;
pub mod estimator;
pub mod station;
pub mod lifecycle;
pub mod stats;
pub mod notifier;
pub mod registry;
pub mod maintenance;

pub use store::*;
pub use ordering::*;
pub use estimator::*;
pub use station::*;
pub use lifecycle::*;
pub use stats::*;
pub use notifier::*;
pub use registry::*;
pub use maintenance::*;
