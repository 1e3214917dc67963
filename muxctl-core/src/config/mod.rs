//! Configuration management
//!
//! Loaded once from `$XDG_CONFIG_HOME/muxctl/config.toml`; a missing file
//! means defaults.

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::*;
