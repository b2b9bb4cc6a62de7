use bitflags::bitflags;

use crate::errors::DisplayError;
use crate::render::primitives::{
    LineFlags, Plane, PolyFlags, SceneFrame, SurfaceFacet, SurfaceInfo, TextureInfo, Tile, TransformedVertex,
    Vector3,
};
use crate::render::stats::DeviceStats;
use crate::render::surface::RgbaImage;
use crate::render::Viewport;

/// Lifecycle of a render device.
///
/// `init` moves `Uninitialized` (or `Exited`) to `Initialized`, `lock`/`unlock` cycle between
/// `Initialized` and `Locked`, and `exit` moves any state to `Exited`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    #[default]
    Uninitialized,
    Initialized,
    Locked,
    Exited,
}

bitflags! {
    /// Capabilities a device advertises on its viewport.
    #[derive(Default)]
    pub struct DeviceCaps: u32 {
        /// Frames are built in an off-screen buffer and flipped in.
        const FRAME_BUFFERED      = 0x01;
        /// Spans are rasterized on the CPU.
        const SPAN_BASED          = 0x02;
        /// 32-bit colour.
        const HI_COLOR            = 0x04;
        const NO_VOLUMETRIC_BLEND = 0x08;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct LockFlags: u32 {
        const CLEAR_SCREEN = 0x01;
        const HIT_TESTING  = 0x02;
    }
}

/// Per-frame parameters handed to [`RenderDevice::lock`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LockParams {
    /// Multiplier applied to the final frame. `Plane::ONE` leaves it untouched.
    pub flash_scale: Plane,
    /// Colour added to the final frame.
    pub flash_fog: Plane,
    pub screen_clear: Plane,
    pub flags: LockFlags,
}

impl Default for LockParams {
    fn default() -> Self {
        Self {
            flash_scale: Plane::ONE,
            flash_fog: Plane::ZERO,
            screen_clear: Plane::ZERO,
            flags: LockFlags::CLEAR_SCREEN,
        }
    }
}

impl LockParams {
    /// True when the frame needs tinting at unlock.
    pub fn has_flash(&self) -> bool {
        self.flash_scale != Plane::ONE || !self.flash_fog.is_zero()
    }
}

/// Operations the scene renderer drives a render device through.
///
/// Calls occur on a single thread and strictly in lifecycle order. Draw operations are only
/// accepted between `lock` and `unlock`; outside of that window they fail with
/// [`DisplayError::InvalidStateTransition`] and leave every buffer untouched.
pub trait RenderDevice {
    /// Registry name of the device class.
    fn name(&self) -> &'static str;

    fn state(&self) -> DeviceState;

    fn capabilities(&self) -> DeviceCaps;

    /// Sets the device up for `viewport` and publishes what it created on it.
    ///
    /// On failure everything created so far is released and the state is left unchanged.
    fn init(&mut self, viewport: &mut Viewport) -> Result<(), DisplayError>;

    /// Releases everything. Safe to call from any state, any number of times.
    fn exit(&mut self);

    /// Drops any cached per-frame state.
    fn flush(&mut self) -> Result<(), DisplayError>;

    /// Starts a frame.
    fn lock(&mut self, params: &LockParams) -> Result<(), DisplayError>;

    /// Finishes the frame; `present` puts it on screen.
    fn unlock(&mut self, present: bool) -> Result<(), DisplayError>;

    fn draw_surface(
        &mut self,
        frame: &SceneFrame,
        surface: &SurfaceInfo,
        facet: &SurfaceFacet,
    ) -> Result<(), DisplayError>;

    fn draw_polygon(
        &mut self,
        frame: &SceneFrame,
        texture: &TextureInfo,
        vertices: &[TransformedVertex],
        flags: PolyFlags,
    ) -> Result<(), DisplayError>;

    fn draw_tile(&mut self, frame: &SceneFrame, tile: &Tile) -> Result<(), DisplayError>;

    fn draw_2d_line(
        &mut self,
        frame: &SceneFrame,
        color: Plane,
        flags: LineFlags,
        p1: Vector3,
        p2: Vector3,
    ) -> Result<(), DisplayError>;

    /// Fills the inclusive rectangle `(x1, y1)..=(x2, y2)`.
    #[allow(clippy::too_many_arguments)]
    fn draw_2d_point(
        &mut self,
        frame: &SceneFrame,
        color: Plane,
        flags: LineFlags,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    ) -> Result<(), DisplayError>;

    fn clear_depth(&mut self, frame: &SceneFrame) -> Result<(), DisplayError>;

    /// Pushes hit-test data. Only recorded when the frame was locked with
    /// [`LockFlags::HIT_TESTING`].
    fn push_hit(&mut self, data: &[u8]) -> Result<(), DisplayError>;

    /// Pops `count` bytes of hit-test data, recording the stack as a hit first if anything
    /// was drawn since the last push, or if `force` is set.
    fn pop_hit(&mut self, count: usize, force: bool) -> Result<(), DisplayError>;

    /// Hits recorded so far, oldest first. Clears the list.
    fn take_hits(&mut self) -> Vec<u8>;

    fn read_pixels(&mut self) -> Result<RgbaImage, DisplayError>;

    fn stats(&self) -> Result<DeviceStats, DisplayError>;

    /// Cancels the flash tint of the current frame.
    fn end_flash(&mut self) -> Result<(), DisplayError>;
}

/// Fails with `InvalidStateTransition` unless `actual` is one of `allowed`.
pub(crate) fn expect_state(
    device: &str,
    op: &'static str,
    actual: DeviceState,
    allowed: &[DeviceState],
) -> Result<(), DisplayError> {
    if allowed.contains(&actual) {
        return Ok(());
    }
    log::warn!("{}: {} rejected while {:?}", device, op, actual);
    Err(DisplayError::InvalidStateTransition { op, state: actual })
}
