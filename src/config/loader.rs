// Configuration file loading and creation

use super::types::Config;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Get the path to the configuration file
pub fn get_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("p2shuffle");

    // Create config directory if it doesn't exist
    fs::create_dir_all(&path).ok();

    path.push("config.toml");
    path
}

/// Load configuration from file, or create default if it doesn't exist
pub fn load_config() -> Result<Config, io::Error> {
    load_config_from(&get_config_path())
}

/// Load configuration from an explicit path, creating it with defaults when missing
pub fn load_config_from(config_path: &Path) -> Result<Config, io::Error> {
    if config_path.exists() {
        let contents = fs::read_to_string(config_path)?;
        match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to parse config file {}: {}", config_path.display(), e);
                warn!("Using default configuration");
                Ok(Config::default())
            }
        }
    } else {
        create_default_config(config_path)?;
        Ok(Config::default())
    }
}

/// Create a default configuration file with helpful comments
pub fn create_default_config(path: &Path) -> Result<(), io::Error> {
    let config = Config::default();
    let toml_string = toml::to_string_pretty(&config).map_err(io::Error::other)?;

    let commented_toml = format!(
        "# p2shuffle configuration file\n\
         # Edit this file to customize game behavior\n\
         # Both peers of a networked match must use the same [rules], [physics] and [table]\n\
         #\n\
         # Distances are table units (cm); the table runs along +X from start_position\n\
         # Scoring zones are listed innermost first\n\
         #\n\
         # AI difficulties: \"easy\", \"medium\", \"hard\"\n\n\
         {}",
        toml_string
    );

    fs::write(path, commented_toml)?;
    info!("Created default config file at: {}", path.display());
    Ok(())
}
