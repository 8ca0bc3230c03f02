//! Engine configuration

pub mod toml_config;

pub use toml_config::{EngineConfig, ENV_DATA_DIR, ENV_DEBOUNCE_MS, ENV_GUEST_MODE};
