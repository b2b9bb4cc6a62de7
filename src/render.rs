/// Render devices.
pub mod backends {
    /// GU hardware device
    pub mod gu;
    pub mod null;
    /// CPU rasterizer
    pub mod software;
}

pub mod compositor;
pub mod hardware;
pub mod registry;

mod device;
mod framebuffer;
mod primitives;
mod stats;
mod surface;
mod viewport;

pub use backends::gu::{GuRenderDevice, Rasterizer};
pub use backends::null::NullRenderDevice;
pub use backends::software::SoftwareRenderDevice;
pub use device::{DeviceCaps, DeviceState, LockFlags, LockParams, RenderDevice};
pub use framebuffer::FrameBufferSet;
pub use primitives::*;
pub use registry::DeviceRegistry;
pub use stats::DeviceStats;
pub use surface::{RgbaImage, ScreenHandle, SharedSurface, SoftwareSurface};
pub use viewport::Viewport;
