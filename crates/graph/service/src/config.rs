//! Configuration for the FrameGraph service

use std::path::Path;

use framegraph_estimation::DEFAULT_STRATEGY;
use framegraph_store::DEFAULT_RETENTION_WARNING;
use framegraph_triggers::DEFAULT_CHANNEL_CAPACITY;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameGraphConfig {
    /// Version store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Estimation configuration
    #[serde(default)]
    pub estimation: EstimationConfig,

    /// Trigger delivery configuration
    #[serde(default)]
    pub triggers: TriggerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Version store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Retained version count above which a warning is logged
    #[serde(default = "default_max_retained_versions")]
    pub max_retained_versions: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_retained_versions: default_max_retained_versions(),
        }
    }
}

/// Estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Strategy used when a request names none (or an unknown one)
    #[serde(default = "default_strategy")]
    pub default_strategy: String,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
        }
    }
}

/// Trigger delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Capacity of each subscriber channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_max_retained_versions() -> usize {
    DEFAULT_RETENTION_WARNING
}

fn default_strategy() -> String {
    DEFAULT_STRATEGY.to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FrameGraphConfig {
    /// Load configuration from defaults, an optional file (format chosen by
    /// extension) and `FRAMEGRAPH_*` environment variables, in that order.
    ///
    /// Nested keys use a double underscore:
    /// `FRAMEGRAPH_TRIGGERS__CHANNEL_CAPACITY=64`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&FrameGraphConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            std::fs::metadata(path)?;
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FRAMEGRAPH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}
