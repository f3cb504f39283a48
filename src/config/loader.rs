//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered with the
//! `config` crate, later sources overriding earlier ones:
//!
//! 1. `config/coordinator.toml` (required)
//! 2. `config/coordinator.<environment>.toml` (optional)
//! 3. Environment variables such as `REQCOORD_BATCH__DELAY_MS=25`

use super::error::{ConfigResult, ConfigurationError};
use super::CoordinatorConfig;
use crate::constants::system;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: CoordinatorConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_options(config_dir, environment, system::ENV_PREFIX)
    }

    /// Load configuration reading overrides from variables named `<env_prefix>_SECTION__KEY`
    ///
    /// A distinct prefix lets tests exercise environment overrides without
    /// racing on shared process environment.
    pub fn load_with_options(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment, env_prefix)?;

        config.validate()?;

        crate::log_config!(info, "Configuration loaded successfully",
            environment: environment,
            batch_delay_ms: config.batch.delay_ms,
            dedup_window_ms: config.dedup.window_ms,
            breakers_enabled: config.circuit_breakers.enabled
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: CoordinatorConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// JSON view of the effective configuration
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    /// Detect current environment from environment variables
    fn detect_environment() -> String {
        env::var(system::ENVIRONMENT_VAR)
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        let possible_dirs = [PathBuf::from("config"), PathBuf::from("../config")];

        for dir in possible_dirs {
            if dir.join(system::CONFIG_FILE_NAME).exists() {
                debug!("Found config directory: {}", dir.display());
                return dir;
            }
        }

        // Fallback to ./config
        PathBuf::from("config")
    }

    /// Find the configuration file
    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let config_path = config_directory.join(system::CONFIG_FILE_NAME);

        if config_path.is_file() {
            debug!("Found configuration file: {}", config_path.display());
            Ok(config_path)
        } else {
            Err(ConfigurationError::config_file_not_found(vec![config_path]))
        }
    }

    /// Path of the optional overlay for an environment, e.g. `coordinator.test.toml`
    fn environment_overlay_path(config_file: &Path, environment: &str) -> PathBuf {
        let stem = config_file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("coordinator");
        let extension = config_file
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("toml");

        config_file.with_file_name(format!("{stem}.{environment}.{extension}"))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        env_prefix: &str,
    ) -> ConfigResult<CoordinatorConfig> {
        if environment.is_empty() || environment.contains(['/', '\\', '.']) {
            return Err(ConfigurationError::environment_error(
                environment,
                "environment name must be a plain identifier",
            ));
        }

        let config_file = Self::find_config_file(config_directory)?;
        let overlay = Self::environment_overlay_path(&config_file, environment);

        if overlay.exists() {
            debug!(
                "Applying environment-specific overrides from: {}",
                overlay.display()
            );
        }

        let settings = Config::builder()
            .add_source(File::from(config_file.as_path()).format(FileFormat::Toml))
            .add_source(
                File::from(overlay.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::parse_error(config_file.display().to_string(), e))?;

        settings.try_deserialize::<CoordinatorConfig>().map_err(|e| {
            ConfigurationError::parse_error(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_config_toml() -> &'static str {
        r#"
[batch]
delay_ms = 25
max_batch_size = 4

[dedup]
window_ms = 750

[retry]
max_attempts = 2
base_delay_ms = 100
max_delay_ms = 400

[circuit_breakers.default_config]
failure_threshold = 5
recovery_timeout_seconds = 30

[circuit_breakers.component_configs.datastore]
failure_threshold = 3
recovery_timeout_seconds = 15
"#
    }

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();

        fs::write(
            config_dir.join(system::CONFIG_FILE_NAME),
            create_test_config_toml(),
        )
        .unwrap();

        (temp_dir, config_dir)
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let result = ConfigManager::find_config_file(temp_dir.path());

        if let Err(ConfigurationError::ConfigFileNotFound { searched_paths }) = result {
            assert_eq!(searched_paths.len(), 1);
        } else {
            panic!("Expected ConfigFileNotFound error");
        }
    }

    #[test]
    fn test_basic_config_loading() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let manager = ConfigManager::load_with_options(
            Some(config_dir),
            "development",
            "REQCOORD_LOADER_BASIC",
        )
        .unwrap();
        let config = manager.config();

        assert_eq!(config.batch.delay(), Duration::from_millis(25));
        assert_eq!(config.batch.max_batch_size, 4);
        assert_eq!(config.dedup.window_ms, 750);
        // Unspecified sections and keys fall back to defaults
        assert_eq!(config.throttle.interval_ms, 500);
        assert_eq!(config.dedup.max_age_seconds, 300);
        assert_eq!(config.retry.backoff_factor, 2.0);
        assert_eq!(
            config
                .circuit_breakers
                .config_for_component("datastore")
                .failure_threshold,
            3
        );
        assert_eq!(manager.environment(), "development");
    }

    #[test]
    fn test_environment_specific_overlay() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        fs::write(
            config_dir.join("coordinator.test.toml"),
            "[batch]\ndelay_ms = 5\n\n[throttle]\ninterval_ms = 50\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_with_options(Some(config_dir.clone()), "test", "REQCOORD_LOADER_OVERLAY")
                .unwrap();
        assert_eq!(manager.config().batch.delay_ms, 5);
        assert_eq!(manager.config().batch.max_batch_size, 4);
        assert_eq!(manager.config().throttle.interval_ms, 50);

        let production =
            ConfigManager::load_with_options(Some(config_dir), "production", "REQCOORD_LOADER_OVERLAY")
                .unwrap();
        assert_eq!(production.config().batch.delay_ms, 25);
    }

    #[test]
    fn test_environment_variable_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        env::set_var("REQCOORD_LOADER_ENVVAR_BATCH__MAX_BATCH_SIZE", "7");
        env::set_var("REQCOORD_LOADER_ENVVAR_CIRCUIT_BREAKERS__ENABLED", "false");
        let result =
            ConfigManager::load_with_options(Some(config_dir), "development", "REQCOORD_LOADER_ENVVAR");
        env::remove_var("REQCOORD_LOADER_ENVVAR_BATCH__MAX_BATCH_SIZE");
        env::remove_var("REQCOORD_LOADER_ENVVAR_CIRCUIT_BREAKERS__ENABLED");

        let manager = result.unwrap();
        assert_eq!(manager.config().batch.max_batch_size, 7);
        assert!(!manager.config().circuit_breakers.enabled);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(system::CONFIG_FILE_NAME),
            "[batch]\nmax_batch_size = 0\n",
        )
        .unwrap();

        let result = ConfigManager::load_with_options(
            Some(temp_dir.path().to_path_buf()),
            "development",
            "REQCOORD_LOADER_INVALID",
        );
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(system::CONFIG_FILE_NAME),
            "[batch\ndelay_ms = ",
        )
        .unwrap();

        let result = ConfigManager::load_with_options(
            Some(temp_dir.path().to_path_buf()),
            "development",
            "REQCOORD_LOADER_MALFORMED",
        );
        assert!(matches!(result, Err(ConfigurationError::ParseError { .. })));
    }

    #[test]
    fn test_rejects_path_like_environment() {
        let (_temp_dir, config_dir) = setup_test_config_dir();

        let result =
            ConfigManager::load_with_options(Some(config_dir), "../prod", "REQCOORD_LOADER_PATH");
        assert!(matches!(
            result,
            Err(ConfigurationError::EnvironmentConfigError { .. })
        ));
    }
}
