pub mod metrics;
pub mod user_id;

pub use metrics::http_metrics_middleware;
pub use user_id::UserId;
