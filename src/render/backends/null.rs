use crate::config::NULL_RENDER_DEVICE;
use crate::errors::DisplayError;
use crate::render::device::{expect_state, DeviceCaps, DeviceState, LockParams, RenderDevice};
use crate::render::primitives::{
    LineFlags, Plane, PolyFlags, SceneFrame, SurfaceFacet, SurfaceInfo, TextureInfo, Tile, TransformedVertex,
    Vector3,
};
use crate::render::stats::DeviceStats;
use crate::render::surface::RgbaImage;
use crate::render::Viewport;

/// Render device that does not perform any rendering.
///
/// Follows the same lifecycle rules as every other device, so it can stand in when no
/// display is wanted (dedicated servers, tests).
#[derive(Debug, Default)]
pub struct NullRenderDevice {
    state: DeviceState,
    width: u32,
    height: u32,
    /// Presented frame counter.
    frame_id: u64,
}

impl NullRenderDevice {
    /// Creates a new instance of the null device.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    fn locked(&self, op: &'static str) -> Result<(), DisplayError> {
        expect_state(NULL_RENDER_DEVICE, op, self.state, &[DeviceState::Locked])
    }
}

impl RenderDevice for NullRenderDevice {
    fn name(&self) -> &'static str {
        NULL_RENDER_DEVICE
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn capabilities(&self) -> DeviceCaps {
        DeviceCaps::empty()
    }

    fn init(&mut self, viewport: &mut Viewport) -> Result<(), DisplayError> {
        expect_state(
            NULL_RENDER_DEVICE,
            "init",
            self.state,
            &[DeviceState::Uninitialized, DeviceState::Exited],
        )?;
        self.width = viewport.width;
        self.height = viewport.height;
        self.frame_id = 0;
        viewport.publish(viewport.requested_color_bytes, 0, DeviceCaps::empty());
        self.state = DeviceState::Initialized;
        Ok(())
    }

    fn exit(&mut self) {
        self.state = DeviceState::Exited;
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn lock(&mut self, _params: &LockParams) -> Result<(), DisplayError> {
        expect_state(NULL_RENDER_DEVICE, "lock", self.state, &[DeviceState::Initialized])?;
        self.state = DeviceState::Locked;
        Ok(())
    }

    fn unlock(&mut self, present: bool) -> Result<(), DisplayError> {
        self.locked("unlock")?;
        if present {
            self.frame_id = self.frame_id.wrapping_add(1);
        }
        self.state = DeviceState::Initialized;
        Ok(())
    }

    fn draw_surface(&mut self, _: &SceneFrame, _: &SurfaceInfo, _: &SurfaceFacet) -> Result<(), DisplayError> {
        self.locked("draw_surface")
    }

    fn draw_polygon(
        &mut self,
        _: &SceneFrame,
        _: &TextureInfo,
        _: &[TransformedVertex],
        _: PolyFlags,
    ) -> Result<(), DisplayError> {
        self.locked("draw_polygon")
    }

    fn draw_tile(&mut self, _: &SceneFrame, _: &Tile) -> Result<(), DisplayError> {
        self.locked("draw_tile")
    }

    fn draw_2d_line(&mut self, _: &SceneFrame, _: Plane, _: LineFlags, _: Vector3, _: Vector3) -> Result<(), DisplayError> {
        self.locked("draw_2d_line")
    }

    fn draw_2d_point(
        &mut self,
        _: &SceneFrame,
        _: Plane,
        _: LineFlags,
        _: f32,
        _: f32,
        _: f32,
        _: f32,
    ) -> Result<(), DisplayError> {
        self.locked("draw_2d_point")
    }

    fn clear_depth(&mut self, _: &SceneFrame) -> Result<(), DisplayError> {
        self.locked("clear_depth")
    }

    fn push_hit(&mut self, _: &[u8]) -> Result<(), DisplayError> {
        self.locked("push_hit")
    }

    fn pop_hit(&mut self, _: usize, _: bool) -> Result<(), DisplayError> {
        self.locked("pop_hit")
    }

    fn take_hits(&mut self) -> Vec<u8> {
        Vec::new()
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, DisplayError> {
        self.locked("read_pixels")?;
        let pixels = vec![0u8; self.width as usize * self.height as usize * 4];
        RgbaImage::from_raw(pixels, self.width, self.height, self.width * 4)
    }

    fn stats(&self) -> Result<DeviceStats, DisplayError> {
        self.locked("stats")?;
        Ok(DeviceStats { frames: self.frame_id, ..Default::default() })
    }

    fn end_flash(&mut self) -> Result<(), DisplayError> {
        self.locked("end_flash")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames_and_draws_nothing() {
        let mut dev = NullRenderDevice::new();
        let mut vp = Viewport::new(4, 2);
        dev.init(&mut vp).unwrap();

        for _ in 0..3 {
            dev.lock(&LockParams::default()).unwrap();
            dev.draw_tile(&SceneFrame::full(4, 2), &Tile::default()).unwrap();
            dev.unlock(true).unwrap();
        }
        assert_eq!(dev.frame_id(), 3);

        dev.lock(&LockParams::default()).unwrap();
        let img = dev.read_pixels().unwrap();
        assert!(img.pixels.iter().all(|&b| b == 0));
        assert_eq!(img.pixels.len(), 32);
    }

    #[test]
    fn still_enforces_lifecycle() {
        let mut dev = NullRenderDevice::new();
        assert!(dev.draw_tile(&SceneFrame::default(), &Tile::default()).unwrap_err().is_state_error());
        dev.exit();
        assert!(dev.lock(&LockParams::default()).is_err());
    }
}
