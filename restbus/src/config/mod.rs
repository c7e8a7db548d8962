//! Restbus configuration loading and manual override parsing.
//!
//! Settings come from two places, merged in [`RestbusConfig::merge_cli`]:
//! an optional YAML file and the command line (which wins).
//!
//! The expected YAML structure is:
//! ```yaml
//! url: "http://127.0.0.1:50051"
//! configure: "configuration_can"   # optional folder uploaded before discovery
//! namespace: "ChassisBus"
//! client_id: "MyRestbus"
//! frames: ["BrakeFrame", "SpeedFrame"]
//! exclude: false
//! publish_timeout_ms: 500
//! overrides:
//!   VehicleSpeed: [10.0, 20.0, 30.0]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::scheduler::DEFAULT_CLIENT_ID;
use crate::selection::OverrideValues;

/// Broker address used when neither file nor CLI gives one.
pub const DEFAULT_BROKER_URL: &str = "http://127.0.0.1:50051";

// ── Override parsing ──────────────────────────────────────────────────────────

/// Malformed `NAME=VALUE[,VALUE…]` override argument.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid override '{argument}': use pattern SIGNAL_NAME=VALUE[,VALUE…]")]
    MalformedOverride { argument: String },

    #[error("invalid override '{argument}': '{value}' is not a number")]
    InvalidOverrideValue { argument: String, value: String },
}

/// Parse one `NAME=v1,v2,…` override.
///
/// `NAME` must consist of letters, digits and `_`; at least one value is
/// required.
pub fn parse_override(argument: &str) -> Result<(String, Vec<f64>), ConfigError> {
    let malformed = || ConfigError::MalformedOverride {
        argument: argument.to_string(),
    };

    let (name, values) = argument.split_once('=').ok_or_else(malformed)?;
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(malformed());
    }
    if values.is_empty() {
        return Err(malformed());
    }

    let values = values
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| ConfigError::InvalidOverrideValue {
                    argument: argument.to_string(),
                    value: v.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((name.to_string(), values))
}

/// Parse every override argument into a map.  A later entry for the same
/// signal replaces an earlier one.
pub fn parse_overrides<S: AsRef<str>>(arguments: &[S]) -> Result<OverrideValues, ConfigError> {
    arguments
        .iter()
        .map(|a| parse_override(a.as_ref()))
        .collect()
}

// ── Private YAML deserialization types ────────────────────────────────────────

/// Mirrors the YAML file layout.  Every field is optional so partial files are
/// accepted; missing values fall back to defaults in [`RestbusConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RestbusConfigFile {
    url: Option<String>,
    configure: Option<PathBuf>,
    namespace: Option<String>,
    client_id: Option<String>,
    #[serde(default)]
    frames: Vec<String>,
    #[serde(default)]
    exclude: bool,
    publish_timeout_ms: Option<u64>,
    #[serde(default)]
    overrides: HashMap<String, Vec<f64>>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Everything needed to connect to the broker and run the restbus.
#[derive(Debug, Clone, PartialEq)]
pub struct RestbusConfig {
    pub url: String,
    pub x_api_key: Option<String>,
    pub access_token: Option<String>,
    /// Folder uploaded to the broker, followed by a reload, before frames
    /// are listed.
    pub configure: Option<PathBuf>,
    /// Empty until set by file or CLI; required before running.
    pub namespace: String,
    pub client_id: String,
    /// Frame names to select; empty selects every frame in the namespace.
    pub frames: Vec<String>,
    pub exclude: bool,
    pub verbose: bool,
    pub publish_timeout_ms: Option<u64>,
    pub overrides: OverrideValues,
}

impl Default for RestbusConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BROKER_URL.to_string(),
            x_api_key: None,
            access_token: None,
            configure: None,
            namespace: String::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            frames: Vec::new(),
            exclude: false,
            verbose: false,
            publish_timeout_ms: None,
            overrides: OverrideValues::new(),
        }
    }
}

/// Command-line values layered on top of the file.
///
/// `None`/empty means "not given on the command line".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub x_api_key: Option<String>,
    pub access_token: Option<String>,
    pub configure: Option<PathBuf>,
    pub namespace: Option<String>,
    pub frames: Vec<String>,
    pub exclude: bool,
    pub verbose: bool,
    pub publish_timeout_ms: Option<u64>,
    pub overrides: OverrideValues,
}

impl RestbusConfig {
    /// Parse `path` into a config.  Fields absent from the file keep their
    /// defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid YAML for
    /// this layout (unknown keys are rejected).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading restbus configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: RestbusConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let defaults = Self::default();
        let config = Self {
            url: file.url.unwrap_or(defaults.url),
            configure: file.configure,
            namespace: file.namespace.unwrap_or_default(),
            client_id: file.client_id.unwrap_or(defaults.client_id),
            frames: file.frames,
            exclude: file.exclude,
            publish_timeout_ms: file.publish_timeout_ms,
            overrides: file.overrides,
            ..defaults
        };

        debug!(
            url = %config.url,
            namespace = %config.namespace,
            frames = ?config.frames,
            overrides = config.overrides.len(),
            "configuration file loaded"
        );

        Ok(config)
    }

    /// Apply command-line values.  Scalars given on the CLI replace file
    /// values, CLI frames replace the file's frame list, `exclude`/`verbose`
    /// are OR-ed and CLI overrides are merged over file overrides.
    pub fn merge_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(url) = cli.url {
            self.url = url;
        }
        if cli.x_api_key.is_some() {
            self.x_api_key = cli.x_api_key;
        }
        if cli.access_token.is_some() {
            self.access_token = cli.access_token;
        }
        if cli.configure.is_some() {
            self.configure = cli.configure;
        }
        if let Some(namespace) = cli.namespace {
            self.namespace = namespace;
        }
        if !cli.frames.is_empty() {
            self.frames = cli.frames;
        }
        self.exclude |= cli.exclude;
        self.verbose |= cli.verbose;
        if cli.publish_timeout_ms.is_some() {
            self.publish_timeout_ms = cli.publish_timeout_ms;
        }
        self.overrides.extend(cli.overrides);
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
