//! Configuration Management Module
//!
//! Connection settings come from `config.json` in the config directory,
//! overlaid by a `.env` file and the process environment.

pub mod storage;
pub mod types;

pub use storage::{
    config_dir, config_file, data_dir, load_app_config, log_dir, metadata_db_path, temp_dir,
    ConfigError, ConfigStorage,
};
pub use types::AppConfig;
