//! Viewport descriptor shared between the client and a render device.
//!
//! The client fills in the requested geometry (`width`, `height`, `requested_color_bytes`).
//! A device's `init` answers by publishing what it actually set up: the screen handle of
//! its software surface (if any), the row stride of that surface, the colour depth it
//! settled on and the capabilities it offers.
//!
//! # Examples
//!
//! ```
//! use gu_display::render::Viewport;
//!
//! let mut vp = Viewport::new(480, 272);
//! assert_eq!(vp.requested_color_bytes, 4);
//! assert!(vp.screen().is_none());
//!
//! vp.resize(320, 0);
//! assert_eq!((vp.width, vp.height), (320, 272));
//! ```

use crate::render::device::DeviceCaps;
use crate::render::surface::{ScreenHandle, SharedSurface};

/// Represents a drawable area and what the attached device published for it.
#[derive(Clone)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,

    /// Colour bytes per pixel the client asks for.
    pub requested_color_bytes: u32,

    screen: Option<ScreenHandle>,
    stride: usize,
    color_bytes: u32,
    caps: DeviceCaps,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(480, 272)
    }
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Viewport {{ {}x{}, color_bytes: {}, stride: {}, caps: {:?}, screen: {:?} }}",
            self.width, self.height, self.color_bytes, self.stride, self.caps, self.screen
        )
    }
}

impl Viewport {
    /// Creates a viewport asking for 32-bit colour.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            requested_color_bytes: 4,
            screen: None,
            stride: 0,
            color_bytes: 0,
            caps: DeviceCaps::empty(),
        }
    }

    /// Resizes the viewport. A zero dimension keeps the current value.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width != 0 {
            self.width = width;
        }
        if height != 0 {
            self.height = height;
        }
    }

    pub fn has_size(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Live software surface the device published, if any.
    pub fn screen(&self) -> Option<SharedSurface> {
        self.screen.as_ref().and_then(|s| s.upgrade())
    }

    pub fn screen_handle(&self) -> Option<&ScreenHandle> {
        self.screen.as_ref()
    }

    /// Row stride of the published screen in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Colour bytes per pixel the device actually uses.
    pub fn color_bytes(&self) -> u32 {
        self.color_bytes
    }

    pub fn caps(&self) -> DeviceCaps {
        self.caps
    }

    /// Lends `surface` to whoever draws through this viewport.
    pub fn publish_screen(&mut self, surface: &SharedSurface) {
        let s = surface.borrow();
        self.stride = s.stride();
        self.color_bytes = s.bytes_per_pixel() as u32;
        self.screen = Some(ScreenHandle::new(surface));
    }

    /// Records what a device set up during init.
    pub fn publish(&mut self, color_bytes: u32, stride: usize, caps: DeviceCaps) {
        self.color_bytes = color_bytes;
        self.stride = stride;
        self.caps = caps;
    }

    /// Forgets everything a device published.
    pub fn clear_published(&mut self) {
        self.screen = None;
        self.stride = 0;
        self.color_bytes = 0;
        self.caps = DeviceCaps::empty();
    }
}
