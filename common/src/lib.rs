//! Common types for retrocast.
//!
//! This crate defines the data model shared between the capture engine and
//! whatever front-end consumes it: render tiers, frame dimensions, shader
//! parameters, pipeline notifications and the error taxonomy.
//!
//! Every type here is serializable so notifications can be forwarded to a UI
//! process or logged as JSON lines.
//!
//! # Examples
//!
//! ```
//! use common::{PipelineEvent, RenderMode};
//!
//! let event = PipelineEvent::ModeChanged {
//!     mode: RenderMode::Raster2d,
//! };
//!
//! let json = serde_json::to_string(&event).unwrap();
//! assert!(json.contains("raster-2d"));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Native resolution of the handheld device's LCD.
pub const NATIVE_WIDTH: u32 = 160;
/// Native resolution of the handheld device's LCD.
pub const NATIVE_HEIGHT: u32 = 144;

/// Error taxonomy for the capture engine.
///
/// All errors are serializable so they can be surfaced to a front-end as-is.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineError {
    /// Operation is invalid in the current state
    #[error("{0} is not active")]
    NotActive(String),

    /// Duplicate start rejected
    #[error("{0} is already active")]
    AlreadyActive(String),

    /// The GPU device backing the shader pipeline is gone
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// No source stream was supplied
    #[error("No source stream available")]
    NoSource,

    /// Transient per-frame capture failure
    #[error("Frame capture failed: {0}")]
    FrameCapture(String),

    /// Zero-sized frame or target surface
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Frame rate outside the supported range
    #[error("Invalid frame rate: {0} fps")]
    InvalidFrameRate(u32),

    /// Image or clip encoding failed
    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl PipelineError {
    /// Transient errors are absorbed by per-frame loops instead of escaping
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::FrameCapture(_) | Self::InvalidDimensions { .. }
        )
    }
}

/// Rendering tier currently driving the display.
///
/// Tiers are ordered from richest to simplest. Automatic transitions only
/// ever move down this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    /// Raw passthrough of the source stream
    Raw,
    /// CPU rasterizer drawing onto a 2D surface
    #[serde(rename = "raster-2d")]
    Raster2d,
    /// GPU shader pipeline
    Gpu,
}

impl RenderMode {
    /// Parse mode name from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "raw" | "passthrough" => Some(Self::Raw),
            "raster-2d" | "raster" | "2d" | "canvas" => Some(Self::Raster2d),
            "gpu" | "webgpu" | "shader" => Some(Self::Gpu),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Raster2d => "raster-2d",
            Self::Gpu => "gpu",
        }
    }

    /// The tier to fall back to after a stall, if any
    pub fn downgrade(&self) -> Option<Self> {
        match self {
            Self::Gpu => Some(Self::Raster2d),
            Self::Raster2d => Some(Self::Raw),
            Self::Raw => None,
        }
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Width and height of a frame or surface in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The device's native LCD resolution
    pub const fn native() -> Self {
        Self::new(NATIVE_WIDTH, NATIVE_HEIGHT)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Multiply both axes by an integer factor
    pub fn scaled(&self, factor: u32) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    /// Number of bytes in a tightly packed RGBA8 image of this size
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Fail with `InvalidDimensions` when either axis is zero
    pub fn validate(self) -> Result<Self, PipelineError> {
        if self.is_empty() {
            return Err(PipelineError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Screen simulation applied by the last shader pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayEffect {
    /// No simulation pass
    #[default]
    None,
    /// CRT scanlines and barrel curvature
    Crt,
    /// LCD pixel grid
    Lcd,
}

impl DisplayEffect {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Some(Self::None),
            "crt" => Some(Self::Crt),
            "lcd" | "grid" => Some(Self::Lcd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Crt => "crt",
            Self::Lcd => "lcd",
        }
    }

    /// Index used by the effect shader to select its branch
    pub fn shader_index(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Crt => 1,
            Self::Lcd => 2,
        }
    }
}

/// Effect parameters consumed by the shader passes.
///
/// The defaults describe an identity transform: the color pass leaves pixels
/// untouched and no screen simulation is applied.
///
/// # Examples
///
/// ```
/// use common::{DisplayEffect, ShaderParams};
///
/// let params = ShaderParams {
///     saturation: 1.3,
///     effect: DisplayEffect::Lcd,
///     ..Default::default()
/// };
/// assert!(!params.is_identity());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShaderParams {
    /// Additive brightness offset (-1.0 to 1.0)
    pub brightness: f32,
    /// Contrast multiplier around mid-grey
    pub contrast: f32,
    /// Saturation multiplier (0.0 = greyscale)
    pub saturation: f32,
    /// Output gamma
    pub gamma: f32,
    /// Screen simulation pass
    pub effect: DisplayEffect,
    /// Strength of the screen simulation (0.0-1.0)
    pub effect_strength: f32,
    /// Barrel curvature for the CRT simulation (0.0-0.5)
    pub curvature: f32,
}

impl Default for ShaderParams {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            gamma: 1.0,
            effect: DisplayEffect::None,
            effect_strength: 0.0,
            curvature: 0.0,
        }
    }
}

impl ShaderParams {
    /// True when every pass would leave pixels unchanged
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// A named shader configuration selected from settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderPreset {
    /// Stable identifier used in configuration
    pub id: String,
    /// Human readable name
    pub name: String,
    pub params: ShaderParams,
}

/// Severity of a status notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Notifications emitted by the capture engine.
///
/// Serialized with an internal `type` tag so a front-end can dispatch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PipelineEvent {
    /// The active rendering tier changed
    ModeChanged { mode: RenderMode },
    /// The recording loop dropped a full batch of frames
    RecordingDegraded { dropped_frames: u32 },
    RecordingStarted,
    RecordingStopped,
    /// A finished clip was handed to the save collaborator
    RecordingReady { filename: String, size_bytes: usize },
    RecordingError { reason: String },
    /// The display surface was replaced (a GPU surface cannot be reused for 2D drawing)
    CanvasRecreated { old_surface: u64, new_surface: u64 },
    ScreenshotSaved { filename: String },
    /// User-facing status line
    Status { level: StatusLevel, message: String },
}

impl PipelineEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::ModeChanged { .. } => "mode-changed",
            Self::RecordingDegraded { .. } => "recording-degraded",
            Self::RecordingStarted => "recording-started",
            Self::RecordingStopped => "recording-stopped",
            Self::RecordingReady { .. } => "recording-ready",
            Self::RecordingError { .. } => "recording-error",
            Self::CanvasRecreated { .. } => "canvas-recreated",
            Self::ScreenshotSaved { .. } => "screenshot-saved",
            Self::Status { .. } => "status",
        }
    }
}
