// Configuration module for p2shuffle
// Handles loading and managing game configuration from TOML file

pub mod loader;
pub mod types;

pub use loader::{create_default_config, get_config_path, load_config, load_config_from};
pub use types::{
    AIConfig, Config, DisplayConfig, NetworkConfig, PhysicsConfig, RulesConfig, TableConfig,
};
