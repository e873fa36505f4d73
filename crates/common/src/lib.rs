pub mod actions;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
