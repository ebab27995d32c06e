use crate::validate_enum;
use anyhow::{Context, Result};
use common::{DisplayEffect, RenderMode, ShaderParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub recording: RecordingSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub shader_preset: Vec<ShaderPresetConfig>,
}

/// General capture settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Integer upscale factor applied to the native 160x144 picture
    #[serde(default = "default_render_scale")]
    pub render_scale: u32,

    /// Shader preset id
    #[serde(default = "default_preset")]
    pub preset: String,

    /// auto, gpu, raster-2d or raw
    #[serde(default = "default_preferred_mode")]
    pub preferred_mode: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            render_scale: default_render_scale(),
            preset: default_preset(),
            preferred_mode: default_preferred_mode(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_render_scale() -> u32 {
    4
}
fn default_preset() -> String {
    "lcd".to_string()
}
fn default_preferred_mode() -> String {
    "auto".to_string()
}

/// Recording output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingSettings {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Pixel memory one clip may hold, in MiB
    #[serde(default = "default_max_clip_mb")]
    pub max_clip_mb: usize,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            max_clip_mb: default_max_clip_mb(),
        }
    }
}

fn default_frame_rate() -> u32 {
    60
}
fn default_output_dir() -> String {
    "~/Videos/retrocast".to_string()
}
fn default_file_prefix() -> String {
    "retrocast".to_string()
}
fn default_max_clip_mb() -> usize {
    256
}

impl RecordingSettings {
    /// Output directory with `~` and environment variables expanded
    pub fn output_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.output_dir)
            .with_context(|| format!("Failed to expand output directory: {}", self.output_dir))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

/// Render health probe settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthSettings {
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    #[serde(default = "default_max_consecutive_stalls")]
    pub max_consecutive_stalls: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            max_consecutive_stalls: default_max_consecutive_stalls(),
        }
    }
}

fn default_check_interval_ms() -> u64 {
    1000
}
fn default_max_consecutive_stalls() -> u32 {
    3
}

impl HealthSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Shader preset configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShaderPresetConfig {
    /// Identifier referenced by `general.preset`
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub brightness: Option<f32>,

    #[serde(default)]
    pub contrast: Option<f32>,

    #[serde(default)]
    pub saturation: Option<f32>,

    #[serde(default)]
    pub gamma: Option<f32>,

    /// Screen simulation (none, crt, lcd)
    #[serde(default)]
    pub effect: Option<String>,

    #[serde(default)]
    pub effect_strength: Option<f32>,

    #[serde(default)]
    pub curvature: Option<f32>,
}

impl ShaderPresetConfig {
    /// Convert to ShaderParams, unset fields keep their identity value
    pub fn to_params(&self) -> ShaderParams {
        let defaults = ShaderParams::default();
        ShaderParams {
            brightness: self.brightness.unwrap_or(defaults.brightness),
            contrast: self.contrast.unwrap_or(defaults.contrast),
            saturation: self.saturation.unwrap_or(defaults.saturation),
            gamma: self.gamma.unwrap_or(defaults.gamma),
            effect: self
                .effect
                .as_deref()
                .and_then(DisplayEffect::from_str)
                .unwrap_or(defaults.effect),
            effect_strength: self.effect_strength.unwrap_or(defaults.effect_strength),
            curvature: self.curvature.unwrap_or(defaults.curvature),
        }
    }

    /// Convert to a preset, falling back to the id when no name is given
    pub fn to_preset(&self) -> common::ShaderPreset {
        common::ShaderPreset {
            id: self.id.clone(),
            name: if self.name.is_empty() {
                self.id.clone()
            } else {
                self.name.clone()
            },
            params: self.to_params(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("retrocast");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        validate_enum!(
            self.general.log_level.as_str(),
            "trace",
            "debug",
            "info",
            "warn",
            "error"
        )
        .context("Invalid log level")?;

        if !(1..=8).contains(&self.general.render_scale) {
            anyhow::bail!(
                "Invalid render scale (must be 1-8): {}",
                self.general.render_scale
            );
        }

        validate_enum!(
            self.general.preferred_mode.as_str(),
            "auto",
            "gpu",
            "raster-2d",
            "raw"
        )
        .context("Invalid preferred mode")?;

        if !(1..=crate::media::MAX_FRAME_RATE).contains(&self.recording.frame_rate) {
            anyhow::bail!(
                "Invalid frame rate (must be 1-{}): {}",
                crate::media::MAX_FRAME_RATE,
                self.recording.frame_rate
            );
        }

        if self.recording.max_clip_mb == 0 {
            anyhow::bail!("max_clip_mb must be at least 1");
        }

        if self.health.check_interval_ms == 0 {
            anyhow::bail!("Health check interval must be positive");
        }
        if self.health.max_consecutive_stalls == 0 {
            anyhow::bail!("max_consecutive_stalls must be at least 1");
        }

        for preset in &self.shader_preset {
            if preset.id.is_empty() {
                anyhow::bail!("Shader preset is missing an id");
            }
            if let Some(ref effect) = preset.effect {
                validate_enum!(effect.as_str(), "none", "crt", "lcd")
                    .with_context(|| format!("Invalid effect in preset '{}'", preset.id))?;
            }
        }

        Ok(())
    }

    /// Mode forced by configuration, `None` for automatic selection
    pub fn preferred_mode(&self) -> Option<RenderMode> {
        match self.general.preferred_mode.as_str() {
            "auto" => None,
            other => RenderMode::from_str(other),
        }
    }

    /// Get a configured preset by id
    pub fn get_preset(&self, id: &str) -> Option<&ShaderPresetConfig> {
        self.shader_preset.iter().find(|p| p.id == id)
    }
}
