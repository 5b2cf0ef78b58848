//! Replicator configuration.
//!
//! Settings are read from an optional `replicator.toml` and layered over the
//! stock defaults. Command-line flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [tool]
//! timeout_secs = 600                    # Limit for one tool invocation
//! log_file = "replicator-tool-log.txt"  # Combined tool output, kept on failure
//!
//! [templates]
//! resolution = "1280x768"   # Image, video and animation templates
//! duration = 1.0            # Seconds, audio and video templates
//! video_frames = 0          # 0 for no limit (duration applies)
//! animation_frames = 5      # Animation templates are frame limited
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse, override just the values you want:
//!
//! ```toml
//! [tool]
//! timeout_secs = 60
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::process::{DEFAULT_TIMEOUT, ProcessRunner, TOOL_LOG};
use crate::recipe::Medium;
use crate::template::{Resolution, TemplateOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is not
/// given.
pub const DEFAULT_CONFIG_FILE: &str = "replicator.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config file does not exist: '{}'", .0.display())]
    NotFound(PathBuf),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Settings loaded from `replicator.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// External tool invocation.
    pub tool: ToolConfig,
    /// Template synthesis defaults.
    pub templates: TemplateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub timeout_secs: u64,
    pub log_file: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            log_file: PathBuf::from(TOOL_LOG),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateConfig {
    pub resolution: Resolution,
    pub duration: f64,
    pub video_frames: u32,
    pub animation_frames: u32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            duration: 1.0,
            video_frames: 0,
            animation_frames: 5,
        }
    }
}

impl Settings {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "tool.timeout_secs must be positive".into(),
            ));
        }
        if self.tool.log_file.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "tool.log_file must not be empty".into(),
            ));
        }
        if self.templates.duration.is_nan() || self.templates.duration <= 0.0 {
            return Err(ConfigError::Validation(
                "templates.duration must be positive".into(),
            ));
        }
        if self.templates.animation_frames == 0 {
            return Err(ConfigError::Validation(
                "templates.animation_frames must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Runner for real tool invocations with the configured log and timeout.
    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(
            &self.tool.log_file,
            Duration::from_secs(self.tool.timeout_secs),
        )
    }

    /// Template options for `medium`. Animations are limited by frame count
    /// only, audio and images ignore the fields they have no use for.
    pub fn template_options(&self, medium: Medium) -> TemplateOptions {
        let templates = &self.templates;
        let (duration, frames) = match medium {
            Medium::Animation => (0.0, templates.animation_frames),
            Medium::Video => (templates.duration, templates.video_frames),
            Medium::Audio | Medium::Image => (templates.duration, 0),
        };
        TemplateOptions {
            duration,
            frames,
            resolution: templates.resolution,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Settings::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<Settings, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let settings: Settings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings.
///
/// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] in
/// the working directory is used if present, stock defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let overlay = match path {
        Some(path) => {
            Some(load_raw_config(path)?.ok_or_else(|| ConfigError::NotFound(path.to_path_buf()))?)
        }
        None => load_raw_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock `replicator.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Corpus Replicator Configuration
# ===============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# The file is read from ./replicator.toml or the path given with --config.
# Command-line flags override values set here.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# External tools
# ---------------------------------------------------------------------------
[tool]
# Seconds a single FFmpeg/ImageMagick invocation may run before it is killed.
timeout_secs = 600

# Combined stdout/stderr of the running tool. Removed after each successful
# invocation, left behind for inspection when a tool fails.
log_file = "replicator-tool-log.txt"

# ---------------------------------------------------------------------------
# Template synthesis
# ---------------------------------------------------------------------------
[templates]
# Frame size (WIDTHxHEIGHT) of image, video and animation templates.
resolution = "1280x768"

# Runtime in seconds of audio and video templates.
duration = 1.0

# Frame limit of video templates. 0 means no limit (duration applies).
video_frames = 0

# Frame count of animation templates.
animation_frames = 5
"##
}
