//! Configuration management
//!
//! One immutable `AppConfig` is loaded at startup (defaults → TOML file →
//! `WTTR__SECTION__KEY` → legacy `WTTR_*` variables) and passed explicitly.

pub mod args;
mod credentials;
mod structs;
pub mod validators;

pub use args::Args;
pub use credentials::{Credentials, Secret, read_secret_file};
pub use structs::*;
