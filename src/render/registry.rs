//! Symbolic lookup of render device classes.
//!
//! Device classes are named the way the persisted settings name them
//! (`"SoftDrv.SoftwareRenderDevice"`), and each name maps to a factory building a fresh,
//! uninitialized device from the current [`DeviceConfig`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{DeviceConfig, GU_RENDER_DEVICE, NULL_RENDER_DEVICE, SOFTWARE_RENDER_DEVICE};
use crate::errors::DisplayError;
use crate::render::backends::gu::GuRenderDevice;
use crate::render::backends::null::NullRenderDevice;
use crate::render::backends::software::SoftwareRenderDevice;
use crate::render::hardware::SimulatedGpu;
use crate::render::RenderDevice;

pub type DeviceFactory =
    Arc<dyn Fn(&DeviceConfig, &DeviceRegistry) -> Result<Box<dyn RenderDevice>, DisplayError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct DeviceRegistry {
    factories: HashMap<String, DeviceFactory>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the hardware, software and null devices. The hardware device runs on a
    /// [`SimulatedGpu`] sized from the config.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(GU_RENDER_DEVICE, |config, registry| {
            let gpu = SimulatedGpu::new(config.vram_bytes, config.vblank_hz);
            Ok(Box::new(GuRenderDevice::with_registry(config.clone(), gpu, registry.clone())))
        });
        registry.register(SOFTWARE_RENDER_DEVICE, |_, _| Ok(Box::new(SoftwareRenderDevice::new())));
        registry.register(NULL_RENDER_DEVICE, |_, _| Ok(Box::new(NullRenderDevice::new())));
        registry
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&DeviceConfig, &DeviceRegistry) -> Result<Box<dyn RenderDevice>, DisplayError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.insert(name.clone(), Arc::new(factory)).is_some() {
            log::debug!("DeviceRegistry: replaced factory for {}", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds a new, uninitialized device of class `name`.
    pub fn create(&self, name: &str, config: &DeviceConfig) -> Result<Box<dyn RenderDevice>, DisplayError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            log::error!("DeviceRegistry: no render device class named {}", name);
            DisplayError::SubsystemUnavailable(format!("unknown render device {name}"))
        })?;
        let device = factory(config, self)?;
        log::debug!("DeviceRegistry: created {}", name);
        Ok(device)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("DeviceRegistry").field("devices", &names).finish()
    }
}
