//! Client side of the display pipeline: viewports, render device selection and the
//! per-frame repaint.
//!
//! # Examples
//!
//! ```
//! use gu_display::client::Client;
//! use gu_display::config::DeviceConfig;
//!
//! let mut client = Client::new(DeviceConfig::default());
//! let id = client.new_viewport(480, 272);
//! client.open_window(id, 0, 0).unwrap();
//!
//! let result = client.tick(|device, _viewport| {
//!     device.clear_depth(&Default::default())?;
//!     Ok(())
//! });
//! assert_eq!(result.viewport, Some(id));
//! assert!(result.presented);
//! ```

use std::fmt::Display;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DeviceConfig;
use crate::errors::DisplayError;
use crate::render::{DeviceRegistry, DeviceState, LockParams, RenderDevice, Viewport};
use crate::tick::TickResult;

/// A unique identifier for a viewport, represented as a UUID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewportId(Uuid);

impl ViewportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ViewportId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ViewportId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for ViewportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A viewport owned by the client, with the device rendering it.
pub struct ClientViewport {
    pub id: ViewportId,
    pub viewport: Viewport,
    /// Realtime viewports are repainted by `Client::tick`.
    pub realtime: bool,
    pub on_hold: bool,
    /// Parameters used to lock the device for each repaint
    pub lock_params: LockParams,
    device: Option<Box<dyn RenderDevice>>,
    last_updated: Option<Instant>,
    /// Tick sequence number of the last repaint, 0 when never painted.
    painted_at: u64,
}

impl ClientViewport {
    pub fn device(&self) -> Option<&dyn RenderDevice> {
        self.device.as_deref()
    }

    pub fn device_mut(&mut self) -> Option<&mut (dyn RenderDevice + 'static)> {
        self.device.as_deref_mut()
    }

    pub fn last_updated(&self) -> Option<Instant> {
        self.last_updated
    }

    fn is_eligible(&self) -> bool {
        self.realtime
            && !self.on_hold
            && self.viewport.has_size()
            && self.device.as_ref().is_some_and(|d| d.state() == DeviceState::Initialized)
    }

    fn exit_device(&mut self) {
        if let Some(mut device) = self.device.take() {
            log::info!("Viewport[{}]: releasing {}", self.id, device.name());
            device.exit();
        }
        self.viewport.clear_published();
    }
}

impl std::fmt::Debug for ClientViewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientViewport")
            .field("id", &self.id)
            .field("viewport", &self.viewport)
            .field("device", &self.device.as_ref().map(|d| d.name()))
            .field("realtime", &self.realtime)
            .field("on_hold", &self.on_hold)
            .finish()
    }
}

pub struct Client {
    config: DeviceConfig,
    registry: DeviceRegistry,
    viewports: Vec<ClientViewport>,
    tick_seq: u64,
}

impl Client {
    pub fn new(config: DeviceConfig) -> Self {
        Self::with_registry(config, DeviceRegistry::with_builtin())
    }

    pub fn with_registry(config: DeviceConfig, registry: DeviceRegistry) -> Self {
        Self { config, registry, viewports: Vec::new(), tick_seq: 0 }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    /// Creates a realtime viewport without a device. A zero size takes the configured
    /// screen size.
    pub fn new_viewport(&mut self, width: u32, height: u32) -> ViewportId {
        let mut viewport = Viewport::new(self.config.screen_width, self.config.screen_height);
        viewport.requested_color_bytes = self.config.color_depth / 8;
        viewport.resize(width, height);

        let id = ViewportId::new();
        self.viewports.push(ClientViewport {
            id,
            viewport,
            realtime: true,
            on_hold: false,
            lock_params: LockParams::default(),
            device: None,
            last_updated: None,
            painted_at: 0,
        });
        id
    }

    pub fn viewport(&self, id: ViewportId) -> Option<&ClientViewport> {
        self.viewports.iter().find(|v| v.id == id)
    }

    pub fn viewport_mut(&mut self, id: ViewportId) -> Option<&mut ClientViewport> {
        self.viewports.iter_mut().find(|v| v.id == id)
    }

    pub fn viewports(&self) -> impl Iterator<Item = &ClientViewport> {
        self.viewports.iter()
    }

    fn lookup(&mut self, id: ViewportId) -> Result<&mut ClientViewport, DisplayError> {
        self.viewports
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| DisplayError::SubsystemUnavailable(format!("no viewport {id}")))
    }

    /// Sizes the viewport (zero keeps the current value) and brings up a render device
    /// for it: the configured game device, or the fallback device if that fails.
    pub fn open_window(&mut self, id: ViewportId, width: u32, height: u32) -> Result<(), DisplayError> {
        let cv = self.lookup(id)?;
        cv.exit_device();
        cv.viewport.resize(width, height);

        let game = self.config.game_render_device.clone();
        let fallback = self.config.fallback_render_device.clone();
        match self.try_render_device(id, &game) {
            Ok(()) => Ok(()),
            Err(e) if game != fallback => {
                log::warn!("Viewport[{}]: {} unavailable ({}), falling back to {}", id, game, e, fallback);
                self.try_render_device(id, &fallback)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates and initializes a device of class `name` for the viewport. The previous device
    /// is released first.
    pub fn try_render_device(&mut self, id: ViewportId, name: &str) -> Result<(), DisplayError> {
        let config = self.config.clone();
        let registry = self.registry.clone();
        let cv = self.lookup(id)?;
        cv.exit_device();

        let mut device = registry.create(name, &config).map_err(|e| {
            log::error!("Viewport[{}]: cannot create {}: {}", id, name, e);
            e
        })?;
        if let Err(e) = device.init(&mut cv.viewport) {
            log::error!("Viewport[{}]: {} failed to initialize: {}", id, name, e);
            device.exit();
            cv.viewport.clear_published();
            return Err(e);
        }

        log::info!(
            "Viewport[{}]: using {} at {}x{}",
            id,
            device.name(),
            cv.viewport.width,
            cv.viewport.height
        );
        cv.device = Some(device);
        Ok(())
    }

    pub fn set_on_hold(&mut self, id: ViewportId, on_hold: bool) -> Result<(), DisplayError> {
        self.lookup(id)?.on_hold = on_hold;
        Ok(())
    }

    pub fn set_realtime(&mut self, id: ViewportId, realtime: bool) -> Result<(), DisplayError> {
        self.lookup(id)?.realtime = realtime;
        Ok(())
    }

    /// Repaints the eligible viewport that has waited longest.
    ///
    /// The device is locked, `scene` issues the draws, and the frame is presented. When the
    /// scene fails the frame is unlocked without presenting and the error is reported in
    /// the result.
    pub fn tick<F>(&mut self, mut scene: F) -> TickResult
    where
        F: FnMut(&mut dyn RenderDevice, &Viewport) -> anyhow::Result<()>,
    {
        let Some(cv) = self
            .viewports
            .iter_mut()
            .filter(|v| v.is_eligible())
            .min_by_key(|v| v.painted_at)
        else {
            return TickResult::idle();
        };

        self.tick_seq += 1;
        cv.painted_at = self.tick_seq;
        cv.last_updated = Some(Instant::now());

        let mut result = TickResult { viewport: Some(cv.id), ..Default::default() };
        let Some(device) = cv.device.as_deref_mut() else {
            return result;
        };

        if let Err(e) = device.lock(&cv.lock_params) {
            log::error!("Viewport[{}]: lock failed: {}", cv.id, e);
            result.error = Some(e.to_string());
            return result;
        }

        let drawn = scene(&mut *device, &cv.viewport);
        let present = drawn.is_ok();
        if let Err(e) = drawn {
            log::error!("Viewport[{}]: scene failed: {:#}", cv.id, e);
            result.error = Some(format!("{e:#}"));
        }

        match device.unlock(present) {
            Ok(()) => result.presented = present,
            Err(e) => {
                log::warn!("Viewport[{}]: unlock failed: {}", cv.id, e);
                result.error.get_or_insert_with(|| e.to_string());
            }
        }
        result
    }

    /// Releases the viewport's device and forgets the viewport.
    pub fn close_viewport(&mut self, id: ViewportId) -> bool {
        let Some(pos) = self.viewports.iter().position(|v| v.id == id) else {
            return false;
        };
        let mut cv = self.viewports.remove(pos);
        cv.exit_device();
        true
    }

    pub fn shutdown(&mut self) {
        for mut cv in self.viewports.drain(..) {
            cv.exit_device();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}
