//! Video memory bookkeeping.
//!
//! The device has a single fixed pool of video memory and no allocator of its own. A
//! [`VramArena`] hands out [`VramRegion`] handles from that pool for the lifetime of a
//! render device and is rewound in one go when the device exits.

mod arena;
mod region;

pub use arena::{VramArena, VRAM_ALIGNMENT};
pub use region::{PixelFormat, VramRegion};
