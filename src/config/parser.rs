use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded, clamped and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use price_sync::config::load_config;
///
/// let config = load_config(Path::new("price-sync.toml")).unwrap();
/// println!("Max errors: {}", config.sync.max_errors);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses configuration from TOML text
///
/// Out-of-range numeric options are clamped before validation runs, so only
/// structural problems (empty paths, malformed e-mail) are reported as errors.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(content)?;
    config.sync = config.sync.clamped();

    validate(&config)?;

    Ok(config)
}
