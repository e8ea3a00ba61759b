//! System-level modules
//!
//! - Logging initialization (main log + access log)
//! - Panic reporting

pub mod logging;
pub mod panic_handler;

pub use logging::{LoggingGuards, init_logging};
pub use panic_handler::install_panic_hook;
