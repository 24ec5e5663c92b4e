pub mod registry;
pub mod middleware;
pub mod collectors;

pub use registry::MetricsRegistry;
pub use middleware::metrics_middleware;
pub use collectors::AccountMetricsCollector;
