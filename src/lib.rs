//! Display pipeline for a handheld with a fixed pool of video memory and a
//! command-list driven GPU.
//!
//! A render device carves its colour and depth buffers out of VRAM through a bump
//! [`VramArena`](vram::VramArena), drives a double-buffered swap chain, and, when no
//! hardware rasterizer is available, has a CPU rasterizer draw into a
//! [`SoftwareSurface`](render::SoftwareSurface) that is blitted into the draw buffer before
//! each flip. The [`Client`](client::Client) picks a device for each viewport and repaints
//! them from the main loop.

pub mod client;
pub mod config;
pub mod errors;
pub mod render;
pub mod tick;
pub mod vram;

pub use client::{Client, ViewportId};
pub use config::DeviceConfig;
pub use errors::DisplayError;
pub use render::{RenderDevice, Viewport};
