//! Render device configuration.
//!
//! `DeviceConfig` carries everything the display pipeline reads from the persisted device
//! settings: screen geometry and colour depth, the feature toggles advertised to the scene
//! renderer, and the knobs of the buffer pipeline itself (VRAM pool size, hardware row
//! pitch, vblank rate, sync timeout, which device classes to instantiate).
//!
//! The configuration is read-only input. It can be built in code through
//! [`DeviceConfig::builder()`] or loaded from JSON produced by the host's settings layer.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use gu_display::config::DeviceConfig;
//! let cfg = DeviceConfig::default();
//! assert_eq!((cfg.screen_width, cfg.screen_height), (480, 272));
//! assert_eq!(cfg.buffer_pitch, Some(512));
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use gu_display::config::DeviceConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = DeviceConfig::builder()
//!     .screen_size(480, 272)
//!     .color_depth(16)
//!     .tight_pitch()
//!     .vram_bytes(3 * 480 * 272 * 2)
//!     .build()?;
//! assert_eq!(cfg.buffer_pitch_for(480), 480);
//! # Ok(()) }
//! ```
//!
//! # Errors
//!
//! Builder validation and loading return [`ConfigError`] when values cannot describe a
//! working display (zero-sized screen, unsupported colour depth, pitch narrower than the
//! screen, a colour format used as depth format, and so on).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::vram::PixelFormat;

/// Registry name of the hardware (GU) render device.
pub const GU_RENDER_DEVICE: &str = "GuDrv.GuRenderDevice";
/// Registry name of the CPU rasterizer used as fallback.
pub const SOFTWARE_RENDER_DEVICE: &str = "SoftDrv.SoftwareRenderDevice";
/// Registry name of the device that accepts everything and draws nothing.
pub const NULL_RENDER_DEVICE: &str = "NullDrv.NullRenderDevice";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    /// Colour depth in bits per pixel (16 or 32).
    pub color_depth: u32,
    pub full_screen: bool,

    pub detail_textures: bool,
    pub coronas: bool,
    pub shiny_surfaces: bool,
    pub volumetric_lighting: bool,

    /// Size of the dedicated video memory pool.
    pub vram_bytes: u64,
    /// Hardware row pitch of the colour and depth buffers, in pixels. `None` packs rows
    /// tightly at the viewport width.
    pub buffer_pitch: Option<u32>,
    pub depth_format: PixelFormat,
    /// Display refresh rate; `None` disables vblank throttling.
    pub vblank_hz: Option<u32>,
    /// How long `unlock` waits for the command processor before giving up.
    pub sync_timeout_ms: u64,
    /// Size of one display list.
    pub command_list_bytes: usize,

    /// Device the client instantiates first.
    pub game_render_device: String,
    /// Device the client falls back to when the game device cannot be brought up.
    pub fallback_render_device: String,
    /// CPU rasterizer the hardware device delegates drawing to. `None` keeps the pure
    /// hardware path.
    pub rasterizer_device: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            screen_width: 480,
            screen_height: 272,
            color_depth: 32,
            full_screen: true,
            detail_textures: true,
            coronas: false,
            shiny_surfaces: true,
            volumetric_lighting: false,
            vram_bytes: 2 * 1024 * 1024,
            buffer_pitch: Some(512),
            depth_format: PixelFormat::Depth16,
            vblank_hz: Some(60),
            sync_timeout_ms: 1000,
            command_list_bytes: 256 * 1024,
            game_render_device: GU_RENDER_DEVICE.to_string(),
            fallback_render_device: SOFTWARE_RENDER_DEVICE.to_string(),
            rasterizer_device: Some(SOFTWARE_RENDER_DEVICE.to_string()),
        }
    }
}

impl DeviceConfig {
    pub fn builder() -> DeviceConfigBuilder {
        DeviceConfigBuilder::default()
    }

    /// Parses and validates a JSON document. Missing keys take their default value.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: DeviceConfig = serde_json::from_str(json)?;
        validate(&cfg)?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Colour format derived from `color_depth`.
    pub fn color_format(&self) -> Result<PixelFormat, ConfigError> {
        PixelFormat::from_color_depth(self.color_depth).ok_or(ConfigError::UnsupportedColorDepth(self.color_depth))
    }

    /// Row pitch in pixels for a buffer holding a viewport of `width` pixels.
    pub fn buffer_pitch_for(&self, width: u32) -> u32 {
        self.buffer_pitch.unwrap_or(width)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate(self)
    }
}

/// Builder for [`DeviceConfig`].
#[derive(Debug, Clone, Default)]
pub struct DeviceConfigBuilder {
    inner: DeviceConfig,
}

impl DeviceConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut DeviceConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn screen_size(self, width: u32, height: u32) -> Self {
        self.map(|c| {
            c.screen_width = width;
            c.screen_height = height;
        })
    }
    pub fn color_depth(self, bits: u32) -> Self { self.map(|c| c.color_depth = bits) }
    pub fn full_screen(self, on: bool) -> Self { self.map(|c| c.full_screen = on) }
    pub fn detail_textures(self, on: bool) -> Self { self.map(|c| c.detail_textures = on) }
    pub fn coronas(self, on: bool) -> Self { self.map(|c| c.coronas = on) }
    pub fn shiny_surfaces(self, on: bool) -> Self { self.map(|c| c.shiny_surfaces = on) }
    pub fn volumetric_lighting(self, on: bool) -> Self { self.map(|c| c.volumetric_lighting = on) }
    pub fn vram_bytes(self, bytes: u64) -> Self { self.map(|c| c.vram_bytes = bytes) }
    pub fn buffer_pitch(self, pixels: u32) -> Self { self.map(|c| c.buffer_pitch = Some(pixels)) }
    pub fn tight_pitch(self) -> Self { self.map(|c| c.buffer_pitch = None) }
    pub fn depth_format(self, format: PixelFormat) -> Self { self.map(|c| c.depth_format = format) }
    pub fn vblank_hz(self, hz: Option<u32>) -> Self { self.map(|c| c.vblank_hz = hz) }
    pub fn sync_timeout_ms(self, ms: u64) -> Self { self.map(|c| c.sync_timeout_ms = ms) }
    pub fn command_list_bytes(self, bytes: usize) -> Self { self.map(|c| c.command_list_bytes = bytes) }
    pub fn game_render_device<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.game_render_device = name.into()) }
    pub fn fallback_render_device<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.fallback_render_device = name.into()) }
    pub fn rasterizer_device<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.rasterizer_device = Some(name.into())) }
    pub fn hardware_only(self) -> Self { self.map(|c| c.rasterizer_device = None) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut DeviceConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<DeviceConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("screen size {width}x{height} must be non-zero")]
    ZeroScreen { width: u32, height: u32 },

    #[error("color depth {0} is not supported (expected 16 or 32)")]
    UnsupportedColorDepth(u32),

    #[error("buffer pitch {pitch} is narrower than the screen width {width}")]
    PitchTooSmall { pitch: u32, width: u32 },

    #[error("{0} is not a depth format")]
    NotADepthFormat(PixelFormat),

    #[error("vram pool must not be empty")]
    ZeroVram,

    #[error("command list size {0} must be a non-zero multiple of 4")]
    CommandListSize(usize),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

fn validate(c: &DeviceConfig) -> Result<(), ConfigError> {
    if c.screen_width == 0 || c.screen_height == 0 {
        return Err(ConfigError::ZeroScreen { width: c.screen_width, height: c.screen_height });
    }
    c.color_format()?;
    if let Some(pitch) = c.buffer_pitch {
        if pitch < c.screen_width {
            return Err(ConfigError::PitchTooSmall { pitch, width: c.screen_width });
        }
    }
    if !c.depth_format.is_depth() {
        return Err(ConfigError::NotADepthFormat(c.depth_format));
    }
    if c.vram_bytes == 0 {
        return Err(ConfigError::ZeroVram);
    }
    if c.command_list_bytes == 0 || c.command_list_bytes % 4 != 0 {
        return Err(ConfigError::CommandListSize(c.command_list_bytes));
    }
    Ok(())
}
