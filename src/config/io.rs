//! Configuration I/O - Loading configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file if a path was given, otherwise defaults
/// 2. Environment variable overrides (includes .env for local development)
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => load_config_from_path(p)?,
        None => Config::default(),
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` if present, then overlays any set `CODEBOX_*` variables.
/// Env vars have the highest precedence: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();

    if let Ok(bind) = std::env::var("CODEBOX_BIND") {
        config.server.bind = bind;
    }
    if let Ok(port) = std::env::var("CODEBOX_PORT") {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }
    if let Ok(volume) = std::env::var("CODEBOX_LIBRARY_VOLUME") {
        config.sandbox.library_volume = volume.into();
    }
    if let Ok(memory) = std::env::var("CODEBOX_MEMORY_LIMIT") {
        config.sandbox.memory_limit = memory;
    }
    if let Ok(pull) = std::env::var("CODEBOX_PULL_IMAGES") {
        if let Ok(pull) = pull.parse() {
            config.sandbox.pull_images = pull;
        }
    }
    if let Ok(rate) = std::env::var("CODEBOX_RATE_LIMIT") {
        if let Ok(rate) = rate.parse() {
            config.limiter.rate = rate;
        }
    }
    if let Ok(window) = std::env::var("CODEBOX_RATE_WINDOW_SECS") {
        if let Ok(secs) = window.parse() {
            config.limiter.window = std::time::Duration::from_secs(secs);
        }
    }
    if let Ok(path) = std::env::var("CODEBOX_AUDIT_PATH") {
        config.audit.path = path.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_json5_config_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // local overrides
                server: { port: 9000 },
                sandbox: { memory_limit: "256m" },
            }"#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.sandbox.memory_limit, "256m");
        // Untouched sections keep their defaults
        assert_eq!(config.limiter.rate, 10);
    }

    #[test]
    fn loads_toml_config_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[limiter]\nrate = 2\nwindow = \"30s\"\n",
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.limiter.rate, 2);
        assert_eq!(config.limiter.window, std::time::Duration::from_secs(30));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = load_config_from_path(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = Config::default();
        std::env::set_var("CODEBOX_PORT", "9999");
        std::env::set_var("CODEBOX_RATE_LIMIT", "42");

        apply_env_overrides(&mut config);

        std::env::remove_var("CODEBOX_PORT");
        std::env::remove_var("CODEBOX_RATE_LIMIT");

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.limiter.rate, 42);
    }
}
