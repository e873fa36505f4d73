pub mod logging;
pub mod metrics;

// Re-export commonly used items
pub use logging::{init_structured_logging, LogConfig, LogFormat};
pub use tracing_appender::non_blocking::WorkerGuard;
