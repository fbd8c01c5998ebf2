//! # modelcheck-core: foundation for the modelcheck harness
//!
//! Shared plumbing used by the verification crate: layered configuration
//! loading, crash-safe file persistence, and test logging setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;

pub use config::{config_exists, load_config, parse_config_str, save_config};
pub use error::CoreError;
pub use logging::init_test_logging;
