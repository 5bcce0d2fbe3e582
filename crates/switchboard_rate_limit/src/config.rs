//! TOML configuration for backends and broker limits.
//!
//! Sources, later overriding earlier:
//! 1. Bundled defaults (`switchboard.toml` compiled into the crate)
//! 2. `~/.config/switchboard/switchboard.toml`
//! 3. `./switchboard.toml`

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use switchboard_core::{
    BackendDescriptor, DEFAULT_MAX_CONTEXT_UNITS, DEFAULT_TIMEOUT, DEFAULT_WINDOW, TokenEstimator,
};
use switchboard_error::{
    BuilderError, ConfigError, ConfigErrorKind, SwitchboardError, SwitchboardResult,
};
use tracing::{debug, instrument};

/// Limits for one backend as written in the configuration file.
///
/// ```toml
/// [backends.gemini]
/// max_concurrent = 2
/// requests_per_window = 15
/// window_secs = 60
/// timeout_secs = 120
/// max_context_units = 1_000_000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Maximum concurrent calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Admissions per window (0 = unlimited)
    #[serde(default)]
    pub requests_per_window: u32,
    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Per-call timeout in seconds, counted from the admission request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Context budget in estimated units
    #[serde(default = "default_max_context_units")]
    pub max_context_units: u64,
    /// Whether the backend joins the table
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_concurrent() -> usize {
    1
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW.as_secs()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_max_context_units() -> u64 {
    DEFAULT_MAX_CONTEXT_UNITS
}

fn default_enabled() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            requests_per_window: 0,
            window_secs: default_window_secs(),
            timeout_secs: default_timeout_secs(),
            max_context_units: default_max_context_units(),
            enabled: default_enabled(),
        }
    }
}

impl BackendConfig {
    /// Build a validated descriptor for backend `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit is out of range.
    pub fn to_descriptor(&self, id: &str) -> Result<BackendDescriptor, BuilderError> {
        Ok(BackendDescriptor::builder()
            .id(id)
            .max_concurrent(self.max_concurrent)
            .requests_per_window(self.requests_per_window)
            .window(Duration::from_secs(self.window_secs))
            .timeout(Duration::from_secs(self.timeout_secs))
            .max_context_units(self.max_context_units)
            .build()?)
    }
}

/// Broker-wide backpressure settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CapacityConfig {
    /// Ceiling on backend calls outstanding across one broker. Unset means
    /// unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_outstanding: Option<usize>,
}

/// Top-level Switchboard configuration.
///
/// # Example
///
/// ```no_run
/// use switchboard_rate_limit::SwitchboardConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SwitchboardConfig::load()?;
/// for descriptor in config.descriptors()? {
///     println!("{}: {} concurrent", descriptor.id(), descriptor.max_concurrent());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct SwitchboardConfig {
    /// Broker-wide settings
    #[serde(default)]
    pub broker: CapacityConfig,
    /// Estimator ratios; defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimator: Option<TokenEstimator>,
    /// Backend table keyed by backend id
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
}

impl SwitchboardConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> SwitchboardResult<Self> {
        debug!("Loading configuration from file");
        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                SwitchboardError::from(ConfigError::new(ConfigErrorKind::Unreadable {
                    source_name: path.as_ref().display().to_string(),
                    reason: e.to_string(),
                }))
            })?
            .try_deserialize()
            .map_err(|e| {
                SwitchboardError::from(ConfigError::new(ConfigErrorKind::Malformed(
                    e.to_string(),
                )))
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence: current dir > home dir > bundled.
    ///
    /// User config files are optional and skipped if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if any present source is malformed.
    #[instrument]
    pub fn load() -> SwitchboardResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        const DEFAULT_CONFIG: &str = include_str!("../../../switchboard.toml");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/switchboard/switchboard.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("switchboard").required(false));

        let config: Self = builder
            .build()
            .map_err(|e| {
                SwitchboardError::from(ConfigError::new(ConfigErrorKind::Unreadable {
                    source_name: "layered switchboard.toml".to_string(),
                    reason: e.to_string(),
                }))
            })?
            .try_deserialize()
            .map_err(|e| {
                SwitchboardError::from(ConfigError::new(ConfigErrorKind::Malformed(
                    e.to_string(),
                )))
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check estimator ratios and every backend's limits.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> SwitchboardResult<()> {
        if let Some(estimator) = &self.estimator {
            estimator.validate()?;
        }
        if self.broker.max_outstanding == Some(0) {
            return Err(ConfigError::new(ConfigErrorKind::InvalidSetting {
                key: "broker.max_outstanding".to_string(),
                reason: "must be at least 1".to_string(),
            })
            .into());
        }
        self.descriptors().map(|_| ())
    }

    /// Estimator to use, falling back to defaults.
    pub fn estimator(&self) -> TokenEstimator {
        self.estimator.unwrap_or_default()
    }

    /// Configuration for one backend.
    pub fn backend(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.get(id)
    }

    /// Descriptors for every enabled backend, sorted by id.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend's limits are invalid.
    pub fn descriptors(&self) -> SwitchboardResult<Vec<BackendDescriptor>> {
        let mut ids: Vec<&String> = self
            .backends
            .iter()
            .filter(|(_, backend)| backend.enabled)
            .map(|(id, _)| id)
            .collect();
        ids.sort();

        ids.into_iter()
            .map(|id| {
                self.backends[id].to_descriptor(id).map_err(|e| {
                    SwitchboardError::from(ConfigError::new(ConfigErrorKind::InvalidBackend {
                        backend: id.clone(),
                        reason: e.to_string(),
                    }))
                })
            })
            .collect()
    }
}
