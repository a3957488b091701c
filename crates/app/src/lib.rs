pub mod config;
pub mod logging;
pub mod sync;

pub use config::{Config, ConfigError, Settings, DEFAULT_CONFIG_PATH};
pub use sync::SyncManager;
