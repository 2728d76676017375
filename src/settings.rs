//! Application configuration
//!
//! Configuration is read from a JSON file with environment overrides
//! (`RTSP_MUX_*`, e.g. `RTSP_MUX_JPEG_QUALITY=90`):
//!
//! ```json
//! {
//!   "jpeg_quality": 80,
//!   "retry_interval_secs": 5,
//!   "connect_timeout_secs": 10,
//!   "motion_sensitivity": "medium",
//!   "motion_min_area": 500,
//!   "motion_default": false,
//!   "sources": [
//!     { "id": "1", "name": "Front door", "address": "rtsp://user:pw@10.0.0.5:554/ch0" },
//!     { "id": "2", "name": "Garage", "address": "rtsp://10.0.0.6/ch0", "enabled": false }
//!   ]
//! }
//! ```
//!
//! Loading is forgiving: a malformed source entry is skipped with a warning,
//! and a missing or invalid tunable falls back to its default.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::handler::HandlerConfig;
use crate::motion::{MotionConfig, Sensitivity};
use crate::registry::RegistryConfig;
use crate::source::{address_for_quality, redact_address, Quality, SourceId};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "RTSP_MUX";

const ADDRESS_SCHEMES: &[&str] = &["rtsp", "rtsps", "http", "https"];

/// One configured camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub id: SourceId,
    pub name: String,
    /// Primary stream address, credentials included. Empty for placeholders.
    pub address: String,
    /// Explicit secondary stream address
    pub secondary_address: Option<String>,
    /// Disabled sources are listed but never dialled
    pub enabled: bool,
}

impl SourceConfig {
    pub fn new(id: impl Into<SourceId>, address: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: format!("Camera {}", id),
            id,
            address: address.into(),
            secondary_address: None,
            enabled: true,
        }
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set an explicit secondary stream address
    pub fn secondary_address(mut self, address: impl Into<String>) -> Self {
        self.secondary_address = Some(address.into());
        self
    }

    /// Mark the source as disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn has_address(&self) -> bool {
        !self.address.is_empty()
    }

    /// Whether the source can be dialled
    pub fn is_available(&self) -> bool {
        self.enabled && self.has_address()
    }

    /// Address to dial for `quality`
    pub fn address_for(&self, quality: Quality) -> String {
        match (quality, &self.secondary_address) {
            (Quality::Secondary, Some(address)) => address.clone(),
            _ => address_for_quality(&self.address, quality),
        }
    }
}

/// Camera summary for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraInfo {
    pub id: String,
    pub name: String,
    pub has_address: bool,
    pub enabled: bool,
}

/// Fully resolved application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub sources: Vec<SourceConfig>,
    pub handler: HandlerConfig,
    pub registry: RegistryConfig,
}

impl AppConfig {
    /// Load from a JSON file plus `RTSP_MUX_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Json))
            .add_source(Environment::with_prefix(ENV_PREFIX));
        Self::from_builder(builder)
    }

    /// Parse a JSON document, without environment overrides
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder().add_source(File::from_str(json, FileFormat::Json));
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let raw: Map<String, Value> = builder.build()?.try_deserialize()?;
        Ok(Self::from_map(&raw))
    }

    fn from_map(raw: &Map<String, Value>) -> Self {
        let handler = HandlerConfig::default();
        let motion = MotionConfig::default();
        let registry = RegistryConfig::default();

        let jpeg_quality = tunable(raw, "jpeg_quality", handler.jpeg_quality, |v| {
            number(v)
                .filter(|n| n.fract() == 0.0 && (1.0..=100.0).contains(n))
                .map(|n| n as u8)
        });
        let retry_interval =
            tunable(raw, "retry_interval_secs", handler.retry_interval, positive_secs);
        let connect_timeout =
            tunable(raw, "connect_timeout_secs", handler.connect_timeout, positive_secs);
        let read_timeout = tunable(raw, "read_timeout_secs", connect_timeout, positive_secs);
        let sensitivity = tunable(raw, "motion_sensitivity", motion.sensitivity, |v| {
            v.as_str().and_then(Sensitivity::parse)
        });
        let min_area = tunable(raw, "motion_min_area", motion.min_area, |v| {
            number(v).filter(|n| n.is_finite() && *n >= 0.0)
        });
        let motion_default = tunable(raw, "motion_default", registry.motion_default, boolean);
        let grace_period = tunable(raw, "grace_period_secs", registry.grace_period, |v| {
            number(v)
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(Duration::from_secs_f64)
        });

        let motion = motion.sensitivity(sensitivity).min_area(min_area);
        let handler = handler
            .jpeg_quality(jpeg_quality)
            .retry_interval(retry_interval)
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .motion(motion);
        let registry = registry.grace_period(grace_period).motion_default(motion_default);

        let sources = match raw.get("sources") {
            Some(Value::Array(entries)) => parse_sources(entries),
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                tracing::warn!(value = %other, "Ignoring sources: expected a list");
                Vec::new()
            }
        };

        Self {
            sources,
            handler,
            registry,
        }
    }

    /// Look up a source by id
    pub fn source(&self, id: &SourceId) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| &s.id == id)
    }

    /// Summary of every configured source, in configuration order
    pub fn camera_list(&self) -> Vec<CameraInfo> {
        self.sources
            .iter()
            .map(|s| CameraInfo {
                id: s.id.to_string(),
                name: s.name.clone(),
                has_address: s.has_address(),
                enabled: s.enabled,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawSource {
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "url")]
    address: String,
    #[serde(default)]
    secondary_address: Option<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

fn parse_sources(entries: &[Value]) -> Vec<SourceConfig> {
    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        match parse_source(index, entry) {
            Ok(source) if !seen.insert(source.id.clone()) => {
                tracing::warn!(index = index, source = %source.id, "Skipping duplicate source id");
            }
            Ok(source) => sources.push(source),
            Err(e) => tracing::warn!(error = %e, "Skipping source"),
        }
    }

    sources
}

fn parse_source(index: usize, entry: &Value) -> Result<SourceConfig, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSource { index, reason };

    let raw: RawSource =
        serde_json::from_value(entry.clone()).map_err(|e| invalid(e.to_string()))?;

    let id = match &raw.id {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err(invalid("id must be a non-empty string or number".into())),
    };

    let address = raw.address.trim().to_string();
    if address.is_empty() {
        if raw.enabled {
            return Err(invalid("enabled source has no address".into()));
        }
    } else {
        check_address(&address).map_err(invalid)?;
    }

    if let Some(secondary) = &raw.secondary_address {
        check_address(secondary).map_err(invalid)?;
    }

    Ok(SourceConfig {
        name: raw.name.unwrap_or_else(|| format!("Camera {}", id)),
        id: SourceId::new(id),
        address,
        secondary_address: raw.secondary_address,
        enabled: raw.enabled,
    })
}

fn check_address(address: &str) -> Result<(), String> {
    let url = url::Url::parse(address)
        .map_err(|e| format!("invalid address {}: {}", redact_address(address), e))?;

    if !ADDRESS_SCHEMES.contains(&url.scheme()) {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if !url.has_host() {
        return Err(format!("address {} has no host", redact_address(address)));
    }
    Ok(())
}

/// Read one tunable, falling back to `default` when absent or invalid
fn tunable<T>(
    raw: &Map<String, Value>,
    key: &str,
    default: T,
    parse: impl Fn(&Value) -> Option<T>,
) -> T {
    match raw.get(key) {
        None | Some(Value::Null) => default,
        Some(value) => parse(value).unwrap_or_else(|| {
            tracing::warn!(setting = key, value = %value, "Invalid setting, using default");
            default
        }),
    }
}

/// Numbers may arrive as strings from environment overrides
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn positive_secs(value: &Value) -> Option<Duration> {
    number(value)
        .filter(|n| n.is_finite() && *n > 0.0)
        .map(Duration::from_secs_f64)
}
