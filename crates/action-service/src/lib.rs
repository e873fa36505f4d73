pub mod api;
pub mod config;
pub mod recognition;
pub mod state;

pub use config::ActionServiceConfig;
pub use state::{ActionServiceState, ServiceError};
