//! Render device driving the GU command processor.
//!
//! The device owns the VRAM arena and the double-buffered frame set carved from it. Direct
//! hardware rasterization is not implemented: when a CPU rasterizer is configured, every draw
//! is forwarded to it and its surface is blitted into the draw buffer at unlock. Without
//! one, rasterizing draws are accepted and counted as skipped.

use std::time::Duration;

use crate::config::{DeviceConfig, GU_RENDER_DEVICE};
use crate::errors::DisplayError;
use crate::render::compositor;
use crate::render::device::{expect_state, DeviceCaps, DeviceState, LockFlags, LockParams, RenderDevice};
use crate::render::framebuffer::FrameBufferSet;
use crate::render::hardware::{ClearFlags, CommandList, GuCommand, GuHardware, GuState};
use crate::render::primitives::{
    LineFlags, Plane, PolyFlags, SceneFrame, SurfaceFacet, SurfaceInfo, TextureInfo, Tile, TransformedVertex,
    Vector3,
};
use crate::render::registry::DeviceRegistry;
use crate::render::stats::DeviceStats;
use crate::render::surface::{RgbaImage, SharedSurface, SoftwareSurface};
use crate::render::Viewport;
use crate::vram::VramArena;

use DeviceState::*;

/// Where draw calls end up.
pub enum Rasterizer {
    /// Draws go to the hardware path.
    Hardware,
    /// Draws go to `inner`, which renders into `surface`.
    Delegating {
        inner: Box<dyn RenderDevice>,
        surface: SharedSurface,
        /// Set once the inner device produced pixels this frame.
        pixels_pending: bool,
    },
}

impl std::fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rasterizer::Hardware => write!(f, "Hardware"),
            Rasterizer::Delegating { inner, pixels_pending, .. } => {
                write!(f, "Delegating({}, pending: {})", inner.name(), pixels_pending)
            }
        }
    }
}

pub struct GuRenderDevice<H: GuHardware> {
    config: DeviceConfig,
    registry: DeviceRegistry,
    hw: H,
    hw_live: bool,

    state: DeviceState,
    arena: VramArena,
    framebuffers: Option<FrameBufferSet>,
    rasterizer: Rasterizer,
    list: Option<CommandList>,

    width: u32,
    height: u32,
    caps: DeviceCaps,
    stats: DeviceStats,
}

impl<H: GuHardware> GuRenderDevice<H> {
    /// Creates a device resolving its rasterizer through the built-in registry.
    pub fn new(config: DeviceConfig, hw: H) -> Self {
        Self::with_registry(config, hw, DeviceRegistry::with_builtin())
    }

    pub fn with_registry(config: DeviceConfig, hw: H, registry: DeviceRegistry) -> Self {
        Self {
            config,
            registry,
            hw,
            hw_live: false,
            state: Uninitialized,
            arena: VramArena::new(),
            framebuffers: None,
            rasterizer: Rasterizer::Hardware,
            list: None,
            width: 0,
            height: 0,
            caps: DeviceCaps::empty(),
            stats: DeviceStats::default(),
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn arena(&self) -> &VramArena {
        &self.arena
    }

    pub fn framebuffers(&self) -> Option<&FrameBufferSet> {
        self.framebuffers.as_ref()
    }

    pub fn rasterizer(&self) -> &Rasterizer {
        &self.rasterizer
    }

    pub fn has_software_surface(&self) -> bool {
        matches!(self.rasterizer, Rasterizer::Delegating { .. })
    }

    fn check(&self, op: &'static str, allowed: &[DeviceState]) -> Result<(), DisplayError> {
        expect_state(GU_RENDER_DEVICE, op, self.state, allowed)
    }

    fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.config.sync_timeout_ms)
    }

    fn push(list: &mut CommandList, cmd: GuCommand) -> Result<(), DisplayError> {
        if list.push(cmd) {
            Ok(())
        } else {
            Err(DisplayError::SubsystemUnavailable("display list overflow".to_string()))
        }
    }

    fn try_init(&mut self, viewport: &mut Viewport) -> Result<(), DisplayError> {
        let format = self.config.color_format()?;
        let (width, height) = (viewport.width, viewport.height);
        let pitch = self.config.buffer_pitch_for(width);
        if pitch < width {
            return Err(DisplayError::SurfaceMismatch(format!(
                "buffer pitch {pitch} is narrower than the {width} pixel viewport"
            )));
        }

        self.hw.init()?;
        self.hw_live = true;

        let capacity = self.hw.vram_size().min(self.config.vram_bytes);
        self.arena.init(self.hw.vram_base(), capacity);
        let fbs = FrameBufferSet::allocate(&mut self.arena, pitch, height, format, self.config.depth_format)?;

        let mut list = CommandList::new(self.config.command_list_bytes);
        let setup = [
            GuCommand::DrawBuffer { region: *fbs.current_draw(), pitch },
            GuCommand::DisplayBuffer { region: *fbs.current_display(), width, height, pitch },
            GuCommand::DepthBuffer { region: *fbs.depth(), pitch },
            GuCommand::DepthRange { near: 0, far: 65535 },
            GuCommand::Viewport { width, height },
            GuCommand::Scissor { x: 0, y: 0, width, height },
            GuCommand::Enable(GuState::ScissorTest),
            GuCommand::Enable(GuState::DepthTest),
            GuCommand::Enable(GuState::CullFace),
            GuCommand::Enable(GuState::ClipPlanes),
        ];
        for cmd in setup {
            Self::push(&mut list, cmd)?;
        }
        self.hw.submit(list);
        self.hw.sync(self.sync_timeout())?;
        self.hw.wait_vblank();
        self.hw.set_display_enabled(true);

        let mut stride = fbs.pitch_bytes();
        self.framebuffers = Some(fbs);

        let mut caps = DeviceCaps::FRAME_BUFFERED | DeviceCaps::NO_VOLUMETRIC_BLEND;
        if format.bytes_per_pixel() == 4 {
            caps |= DeviceCaps::HI_COLOR;
        }

        if let Some(name) = self.config.rasterizer_device.clone() {
            let surface = SoftwareSurface::new(width, height, format).into_shared();
            viewport.publish_screen(&surface);
            stride = surface.borrow().stride();

            // The rasterizer never gets a rasterizer of its own.
            let inner_config = DeviceConfig { rasterizer_device: None, ..self.config.clone() };
            let inner = self.registry.create(&name, &inner_config)?;
            self.rasterizer = Rasterizer::Delegating { inner, surface, pixels_pending: false };

            if let Rasterizer::Delegating { inner, .. } = &mut self.rasterizer {
                inner.init(viewport)?;
                caps = inner.capabilities() | DeviceCaps::FRAME_BUFFERED;
            }
        }

        viewport.publish(format.bytes_per_pixel(), stride, caps);
        self.width = width;
        self.height = height;
        self.caps = caps;
        Ok(())
    }

    /// Releases everything in reverse order of creation. Leaves `state` alone.
    fn teardown(&mut self) {
        if let Rasterizer::Delegating { mut inner, surface, .. } =
            std::mem::replace(&mut self.rasterizer, Rasterizer::Hardware)
        {
            inner.exit();
            drop(inner);
            drop(surface);
        }
        self.list = None;
        self.framebuffers = None;
        if self.hw_live {
            self.hw.set_display_enabled(false);
            self.hw.terminate();
            self.hw_live = false;
        }
        self.arena.reset();
        self.caps = DeviceCaps::empty();
    }

    /// Runs a rasterizing draw: forwarded when delegating, counted as skipped otherwise.
    fn rasterize(
        &mut self,
        op: &'static str,
        count: impl FnOnce(&mut DeviceStats),
        draw: impl FnOnce(&mut dyn RenderDevice) -> Result<(), DisplayError>,
    ) -> Result<(), DisplayError> {
        self.check(op, &[Locked])?;
        match &mut self.rasterizer {
            Rasterizer::Hardware => {
                count(&mut self.stats);
                self.stats.skipped_draws += 1;
                log::trace!("GuDevice: {} skipped on the hardware path", op);
                Ok(())
            }
            Rasterizer::Delegating { inner, pixels_pending, .. } => {
                draw(inner.as_mut())?;
                *pixels_pending = true;
                Ok(())
            }
        }
    }

    /// Reads the buffer being scanned out into an RGBA image.
    fn read_display_buffer(&self) -> Result<RgbaImage, DisplayError> {
        let fbs = self
            .framebuffers
            .as_ref()
            .ok_or_else(|| DisplayError::SubsystemUnavailable("no frame buffers".to_string()))?;
        let region = fbs.current_display();
        let format = region.format();
        let bpp = format.bytes_per_pixel() as usize;
        let pitch = fbs.pitch_bytes();

        let vram = self
            .hw
            .vram()
            .get(region.range())
            .ok_or_else(|| DisplayError::SurfaceMismatch(format!("{region:?} lies outside VRAM")))?;

        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                let at = y * pitch + x * bpp;
                pixels.extend_from_slice(&format.decode(&vram[at..at + bpp]));
            }
        }
        RgbaImage::from_raw(pixels, self.width, self.height, self.width * 4)
    }
}

impl<H: GuHardware> RenderDevice for GuRenderDevice<H> {
    fn name(&self) -> &'static str {
        GU_RENDER_DEVICE
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn capabilities(&self) -> DeviceCaps {
        self.caps
    }

    fn init(&mut self, viewport: &mut Viewport) -> Result<(), DisplayError> {
        self.check("init", &[Uninitialized, Exited])?;
        if !viewport.has_size() {
            return Err(DisplayError::SurfaceMismatch(format!("viewport {viewport:?} has no size")));
        }

        match self.try_init(viewport) {
            Ok(()) => {
                self.stats = DeviceStats::default();
                self.state = Initialized;
                log::info!(
                    "GuDevice: init done, viewport {}x{}, {:?}, {} of {} VRAM bytes used",
                    self.width,
                    self.height,
                    self.rasterizer,
                    self.arena.offset(),
                    self.arena.capacity()
                );
                Ok(())
            }
            Err(e) => {
                log::error!("GuDevice: init failed: {}", e);
                self.teardown();
                viewport.clear_published();
                Err(e)
            }
        }
    }

    fn exit(&mut self) {
        match self.state {
            Exited => return,
            Uninitialized => {}
            Initialized | Locked => self.teardown(),
        }
        self.state = Exited;
        log::info!("GuDevice: exit ({})", self.stats);
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        self.check("flush", &[Initialized, Locked])?;
        match &mut self.rasterizer {
            Rasterizer::Hardware => Ok(()),
            Rasterizer::Delegating { inner, .. } => inner.flush(),
        }
    }

    fn lock(&mut self, params: &LockParams) -> Result<(), DisplayError> {
        self.check("lock", &[Initialized])?;

        let mut list = CommandList::new(self.config.command_list_bytes);
        let clear = params.flags.contains(LockFlags::CLEAR_SCREEN);
        if clear {
            Self::push(&mut list, GuCommand::ClearColor(params.screen_clear.to_rgba8()))?;
            Self::push(&mut list, GuCommand::ClearDepth(0))?;
            Self::push(&mut list, GuCommand::Clear(ClearFlags::COLOR | ClearFlags::DEPTH))?;
        }

        // A frame with no clear, no flash and no draws leaves the draw buffer as it was two
        // frames ago.
        if let Rasterizer::Delegating { inner, pixels_pending, .. } = &mut self.rasterizer {
            inner.lock(params)?;
            *pixels_pending = clear || params.has_flash();
        }

        self.list = Some(list);
        self.state = Locked;
        Ok(())
    }

    fn unlock(&mut self, present: bool) -> Result<(), DisplayError> {
        self.check("unlock", &[Locked])?;
        self.state = Initialized;

        let mut blit = false;
        if let Rasterizer::Delegating { inner, pixels_pending, .. } = &mut self.rasterizer {
            inner.unlock(present)?;
            blit = std::mem::take(pixels_pending);
        }

        let list = self
            .list
            .take()
            .unwrap_or_else(|| CommandList::new(self.config.command_list_bytes));
        self.hw.submit(list);
        if let Err(e) = self.hw.sync(self.sync_timeout()) {
            self.stats.sync_timeouts += 1;
            log::warn!("GuDevice: {}, frame dropped", e);
            return Err(e);
        }
        if !present {
            return Ok(());
        }

        self.hw.wait_vblank();

        let Some(fbs) = self.framebuffers.as_mut() else {
            return Err(DisplayError::SubsystemUnavailable("no frame buffers".to_string()));
        };
        if blit {
            if let Rasterizer::Delegating { surface, .. } = &self.rasterizer {
                let report = compositor::composite(&surface.borrow(), &mut self.hw, fbs.current_draw(), fbs.pitch_bytes())?;
                self.stats.blits += 1;
                self.stats.bytes_blitted += report.bytes as u64;
            }
        }

        let shown = self.hw.swap_buffers();
        fbs.swap();
        self.stats.frames += 1;
        log::trace!("GuDevice: presented {:#x}, draw index {}", shown, fbs.draw_index());
        Ok(())
    }

    fn draw_surface(
        &mut self,
        frame: &SceneFrame,
        surface: &SurfaceInfo,
        facet: &SurfaceFacet,
    ) -> Result<(), DisplayError> {
        self.rasterize("draw_surface", |s| s.surfaces += 1, |d| d.draw_surface(frame, surface, facet))
    }

    fn draw_polygon(
        &mut self,
        frame: &SceneFrame,
        texture: &TextureInfo,
        vertices: &[TransformedVertex],
        flags: PolyFlags,
    ) -> Result<(), DisplayError> {
        self.rasterize("draw_polygon", |s| s.polygons += 1, |d| d.draw_polygon(frame, texture, vertices, flags))
    }

    fn draw_tile(&mut self, frame: &SceneFrame, tile: &Tile) -> Result<(), DisplayError> {
        self.rasterize("draw_tile", |s| s.tiles += 1, |d| d.draw_tile(frame, tile))
    }

    fn draw_2d_line(
        &mut self,
        frame: &SceneFrame,
        color: Plane,
        flags: LineFlags,
        p1: Vector3,
        p2: Vector3,
    ) -> Result<(), DisplayError> {
        self.rasterize("draw_2d_line", |s| s.lines += 1, |d| d.draw_2d_line(frame, color, flags, p1, p2))
    }

    fn draw_2d_point(
        &mut self,
        frame: &SceneFrame,
        color: Plane,
        flags: LineFlags,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    ) -> Result<(), DisplayError> {
        self.rasterize("draw_2d_point", |s| s.points += 1, |d| {
            d.draw_2d_point(frame, color, flags, x1, y1, x2, y2)
        })
    }

    fn clear_depth(&mut self, frame: &SceneFrame) -> Result<(), DisplayError> {
        self.check("clear_depth", &[Locked])?;
        match &mut self.rasterizer {
            Rasterizer::Delegating { inner, .. } => inner.clear_depth(frame),
            Rasterizer::Hardware => {
                let list = self
                    .list
                    .as_mut()
                    .ok_or_else(|| DisplayError::SubsystemUnavailable("no open display list".to_string()))?;
                Self::push(list, GuCommand::ClearDepth(0))?;
                Self::push(list, GuCommand::Clear(ClearFlags::DEPTH))
            }
        }
    }

    fn push_hit(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.check("push_hit", &[Locked])?;
        match &mut self.rasterizer {
            Rasterizer::Delegating { inner, .. } => inner.push_hit(data),
            Rasterizer::Hardware => Ok(()),
        }
    }

    fn pop_hit(&mut self, count: usize, force: bool) -> Result<(), DisplayError> {
        self.check("pop_hit", &[Locked])?;
        match &mut self.rasterizer {
            Rasterizer::Delegating { inner, .. } => inner.pop_hit(count, force),
            Rasterizer::Hardware => Ok(()),
        }
    }

    fn take_hits(&mut self) -> Vec<u8> {
        match &mut self.rasterizer {
            Rasterizer::Delegating { inner, .. } => inner.take_hits(),
            Rasterizer::Hardware => Vec::new(),
        }
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, DisplayError> {
        self.check("read_pixels", &[Locked])?;
        match &mut self.rasterizer {
            Rasterizer::Delegating { inner, .. } => inner.read_pixels(),
            Rasterizer::Hardware => self.read_display_buffer(),
        }
    }

    fn stats(&self) -> Result<DeviceStats, DisplayError> {
        self.check("stats", &[Locked])?;
        let mut stats = self.stats.clone();
        if let Rasterizer::Delegating { inner, .. } = &self.rasterizer {
            stats.absorb(&inner.stats()?);
        }
        Ok(stats)
    }

    fn end_flash(&mut self) -> Result<(), DisplayError> {
        self.check("end_flash", &[Locked])?;
        match &mut self.rasterizer {
            Rasterizer::Delegating { inner, .. } => inner.end_flash(),
            Rasterizer::Hardware => Ok(()),
        }
    }
}

impl<H: GuHardware> Drop for GuRenderDevice<H> {
    fn drop(&mut self) {
        self.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::hardware::SimulatedGpu;
    use crate::vram::PixelFormat;

    const FRAME: SceneFrame = SceneFrame { x: 0, y: 0, width: 480, height: 272 };

    fn device(config: DeviceConfig) -> GuRenderDevice<SimulatedGpu> {
        let _ = env_logger::builder().is_test(true).try_init();
        let gpu = SimulatedGpu::new(4 * 1024 * 1024, config.vblank_hz);
        GuRenderDevice::new(config, gpu)
    }

    fn red_tile() -> Tile {
        Tile { x: 0.0, y: 0.0, xl: 4.0, yl: 2.0, color: Plane::new(1.0, 0.0, 0.0, 1.0), ..Default::default() }
    }

    #[test]
    fn init_then_exit_leaves_nothing_behind() {
        let mut dev = device(DeviceConfig::default());
        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();

        assert_eq!(dev.state(), Initialized);
        assert!(dev.has_software_surface());
        assert!(vp.screen().is_some());
        assert_eq!(vp.stride(), 480 * 4);
        assert!(dev.arena().offset() > 0);
        assert!(dev.hardware().display_enabled());

        dev.exit();
        assert_eq!(dev.state(), Exited);
        assert_eq!(dev.arena().offset(), 0);
        assert!(!dev.has_software_surface());
        assert!(vp.screen().is_none());
        assert!(dev.framebuffers().is_none());
        assert_eq!(dev.hardware().terminations(), 1);

        dev.exit();
        assert_eq!(dev.hardware().terminations(), 1);
    }

    #[test]
    fn init_records_buffer_setup() {
        let mut dev = device(DeviceConfig::builder().hardware_only().build().unwrap());
        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();

        let fbs = dev.framebuffers().unwrap().clone();
        let executed = dev.hardware().executed();
        assert_eq!(executed[0], GuCommand::DrawBuffer { region: *fbs.current_draw(), pitch: 512 });
        assert!(executed.contains(&GuCommand::DepthRange { near: 0, far: 65535 }));
        assert!(executed.contains(&GuCommand::Enable(GuState::DepthTest)));
        assert_eq!(dev.hardware().vblanks(), 1);
        assert_eq!(vp.stride(), 512 * 4);
        assert!(vp.screen().is_none());
        assert!(vp.caps().contains(DeviceCaps::FRAME_BUFFERED | DeviceCaps::HI_COLOR));
    }

    #[test]
    fn draws_outside_lock_have_no_side_effects() {
        let mut dev = device(DeviceConfig::default());
        let err = dev.draw_tile(&FRAME, &red_tile()).unwrap_err();
        assert!(matches!(err, DisplayError::InvalidStateTransition { op: "draw_tile", state: Uninitialized }));
        assert!(dev.clear_depth(&FRAME).unwrap_err().is_state_error());
        assert!(dev.unlock(true).unwrap_err().is_state_error());
        assert!(dev.hardware().executed().is_empty());

        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();
        dev.exit();
        let submits = dev.hardware().submits();

        let err = dev.draw_2d_line(&FRAME, Plane::ONE, LineFlags::empty(), Vector3::default(), Vector3::default());
        assert!(matches!(err, Err(DisplayError::InvalidStateTransition { state: Exited, .. })));
        assert!(dev.lock(&LockParams::default()).unwrap_err().is_state_error());
        assert!(dev.read_pixels().unwrap_err().is_state_error());
        assert_eq!(dev.hardware().submits(), submits);
        assert!(dev.hardware().vram().iter().all(|&b| b == 0));
    }

    #[test]
    fn exact_vram_fits_three_buffers() {
        let exact = 3 * 480 * 272 * 2;
        let config = |vram| {
            DeviceConfig::builder()
                .color_depth(16)
                .tight_pitch()
                .vram_bytes(vram)
                .build()
                .unwrap()
        };

        let mut dev = device(config(exact));
        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();
        assert_eq!(dev.arena().remaining(), 0);
        assert_eq!(vp.color_bytes(), 2);

        let mut dev = device(config(exact - 1));
        let mut vp = Viewport::new(480, 272);
        let err = dev.init(&mut vp).unwrap_err();
        assert!(matches!(err, DisplayError::AllocationExhausted { .. }));
        assert_eq!(dev.arena().offset(), 0);
        assert_eq!(dev.state(), Uninitialized);
        assert!(!dev.has_software_surface());
        assert!(vp.screen().is_none());
        assert!(!dev.hardware().is_initialized());
    }

    #[test]
    fn clear_without_draws_clears_and_swaps_once() {
        let mut dev = device(DeviceConfig::builder().hardware_only().build().unwrap());
        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();
        dev.hardware_mut().clear_executed();
        let before = *dev.framebuffers().unwrap().current_draw();

        let params = LockParams { screen_clear: Plane::new(0.0, 0.0, 1.0, 1.0), ..Default::default() };
        dev.lock(&params).unwrap();
        dev.unlock(true).unwrap();

        let gpu = dev.hardware();
        assert!(gpu.executed().contains(&GuCommand::Clear(ClearFlags::COLOR | ClearFlags::DEPTH)));
        assert_eq!(gpu.swaps(), 1);
        assert_eq!(gpu.vblanks(), 2);
        assert_eq!(gpu.display_address(), Some(before.address()));
        assert_eq!(dev.framebuffers().unwrap().draw_index(), 1);
        assert_eq!(dev.framebuffers().unwrap().current_display(), &before);

        // The cleared buffer is now on screen.
        dev.lock(&LockParams { flags: LockFlags::empty(), ..Default::default() }).unwrap();
        let img = dev.read_pixels().unwrap();
        assert_eq!(img.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(img.pixel(479, 271), Some([0, 0, 255, 255]));
        assert_eq!(dev.stats().unwrap().frames, 1);
    }

    #[test]
    fn delegated_draws_are_blitted_into_draw_buffer() {
        let mut dev = device(DeviceConfig::default());
        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();
        let target = *dev.framebuffers().unwrap().current_draw();

        dev.lock(&LockParams::default()).unwrap();
        dev.draw_tile(&FRAME, &red_tile()).unwrap();
        let stats = dev.stats().unwrap();
        assert_eq!((stats.tiles, stats.skipped_draws), (1, 0));
        dev.unlock(true).unwrap();

        let vram = dev.hardware().vram();
        let start = target.address() as usize;
        assert_eq!(&vram[start..start + 4], &[255, 0, 0, 255]);
        // Padding between the 480 pixel row and the 512 pixel pitch stays untouched.
        assert!(vram[start + 480 * 4..start + 512 * 4].iter().all(|&b| b == 0));
        assert_eq!(dev.hardware().writebacks().0, 1);

        dev.lock(&LockParams::default()).unwrap();
        let stats = dev.stats().unwrap();
        assert_eq!((stats.frames, stats.blits), (1, 1));
        assert_eq!(stats.bytes_blitted, 480 * 272 * 4);
    }

    #[test]
    fn hardware_path_counts_skipped_draws() {
        let mut dev = device(DeviceConfig::builder().hardware_only().build().unwrap());
        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();
        dev.lock(&LockParams::default()).unwrap();

        dev.draw_tile(&FRAME, &red_tile()).unwrap();
        dev.draw_polygon(&FRAME, &TextureInfo::default(), &[], PolyFlags::empty()).unwrap();
        dev.push_hit(&[1]).unwrap();
        dev.pop_hit(1, true).unwrap();
        dev.clear_depth(&FRAME).unwrap();

        let stats = dev.stats().unwrap();
        assert_eq!((stats.tiles, stats.polygons, stats.skipped_draws), (1, 1, 2));
        dev.unlock(true).unwrap();
        assert!(dev.take_hits().is_empty());
        assert_eq!(dev.hardware().writebacks().0, 0);
        assert!(dev.hardware().executed().contains(&GuCommand::Clear(ClearFlags::DEPTH)));
    }

    #[test]
    fn sync_timeout_drops_frame_without_swap() {
        let mut dev = device(DeviceConfig::builder().sync_timeout_ms(5).build().unwrap());
        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();

        dev.lock(&LockParams::default()).unwrap();
        dev.hardware_mut().stall_syncs(1);
        let err = dev.unlock(true).unwrap_err();
        assert!(matches!(err, DisplayError::HardwareSyncTimeout { waited_ms: 5 }));
        assert_eq!(dev.state(), Initialized);
        assert_eq!(dev.hardware().swaps(), 0);
        assert_eq!(dev.framebuffers().unwrap().draw_index(), 0);

        dev.lock(&LockParams::default()).unwrap();
        assert_eq!(dev.stats().unwrap().sync_timeouts, 1);
        dev.unlock(true).unwrap();
        assert_eq!(dev.hardware().swaps(), 1);
    }

    #[test]
    fn unlock_without_present_keeps_buffers() {
        let mut dev = device(DeviceConfig::default());
        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();
        dev.lock(&LockParams::default()).unwrap();
        dev.unlock(false).unwrap();
        assert_eq!(dev.hardware().swaps(), 0);
        assert_eq!(dev.hardware().vblanks(), 1);
        assert_eq!(dev.framebuffers().unwrap().draw_index(), 0);
    }

    #[test]
    fn failed_hardware_init_leaves_state() {
        let mut gpu = SimulatedGpu::new(1 << 20, None);
        gpu.fail_next_init();
        let mut dev = GuRenderDevice::new(DeviceConfig::default(), gpu);
        let mut vp = Viewport::new(480, 272);

        assert!(matches!(dev.init(&mut vp), Err(DisplayError::SubsystemUnavailable(_))));
        assert_eq!(dev.state(), Uninitialized);
        assert_eq!(dev.hardware().terminations(), 0);

        dev.init(&mut vp).unwrap();
        assert_eq!(dev.state(), Initialized);
    }

    #[test]
    fn unknown_rasterizer_rolls_back_everything() {
        let config = DeviceConfig::builder().rasterizer_device("NoDrv.Missing").build().unwrap();
        let mut dev = device(config);
        let mut vp = Viewport::new(480, 272);

        assert!(matches!(dev.init(&mut vp), Err(DisplayError::SubsystemUnavailable(_))));
        assert_eq!(dev.arena().offset(), 0);
        assert!(!dev.has_software_surface());
        assert!(vp.screen().is_none());
        assert!(!dev.hardware().is_initialized());
        assert_eq!(dev.hardware().terminations(), 1);
    }

    #[test]
    fn failing_rasterizer_init_rolls_back_everything() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut registry = DeviceRegistry::with_builtin();
        registry.register("BrokenDrv.Rasterizer", |config, registry| {
            let mut gpu = SimulatedGpu::new(config.vram_bytes, None);
            gpu.fail_next_init();
            Ok(Box::new(GuRenderDevice::with_registry(config.clone(), gpu, registry.clone())))
        });
        let config = DeviceConfig::builder().rasterizer_device("BrokenDrv.Rasterizer").build().unwrap();
        let gpu = SimulatedGpu::new(4 * 1024 * 1024, None);
        let mut dev = GuRenderDevice::with_registry(config, gpu, registry);
        let mut vp = Viewport::new(480, 272);

        assert!(matches!(dev.init(&mut vp), Err(DisplayError::SubsystemUnavailable(_))));
        assert_eq!(dev.state(), Uninitialized);
        assert_eq!(dev.arena().offset(), 0);
        assert!(!dev.has_software_surface());
        assert!(vp.screen().is_none());
        assert_eq!(vp.caps(), DeviceCaps::empty());
        assert!(!dev.hardware().is_initialized());
        assert_eq!(dev.hardware().terminations(), 1);
    }

    #[test]
    fn sync_timeout_during_init_rolls_back_everything() {
        let mut dev = device(DeviceConfig::builder().sync_timeout_ms(5).build().unwrap());
        dev.hardware_mut().stall_syncs(1);
        let mut vp = Viewport::new(480, 272);

        let err = dev.init(&mut vp).unwrap_err();
        assert!(matches!(err, DisplayError::HardwareSyncTimeout { waited_ms: 5 }));
        assert_eq!(dev.state(), Uninitialized);
        assert_eq!(dev.arena().offset(), 0);
        assert!(!dev.has_software_surface());
        assert!(dev.framebuffers().is_none());
        assert!(vp.screen().is_none());
        assert!(!dev.hardware().display_enabled());
        assert_eq!(dev.hardware().terminations(), 1);

        dev.init(&mut vp).unwrap();
        assert_eq!(dev.state(), Initialized);
        assert!(vp.screen().is_some());
    }

    #[test]
    fn flash_only_frame_is_blitted() {
        let mut dev = device(DeviceConfig::default());
        let mut vp = Viewport::new(480, 272);
        dev.init(&mut vp).unwrap();
        let target = *dev.framebuffers().unwrap().current_draw();

        let params = LockParams {
            flash_fog: Plane::new(0.0, 0.0, 1.0, 0.0),
            flags: LockFlags::empty(),
            ..Default::default()
        };
        dev.lock(&params).unwrap();
        dev.unlock(true).unwrap();
        assert_eq!(dev.hardware().writebacks().0, 1);
        let start = target.address() as usize;
        assert_eq!(dev.hardware().vram()[start + 2], 255);

        // Nothing cleared, tinted or drawn: no blit.
        dev.lock(&LockParams { flags: LockFlags::empty(), ..Default::default() }).unwrap();
        dev.unlock(true).unwrap();
        assert_eq!(dev.hardware().writebacks().0, 1);
    }

    #[test]
    fn reinit_after_exit() {
        let mut dev = device(DeviceConfig::default());
        let mut vp = Viewport::new(480, 272);
        for _ in 0..3 {
            dev.init(&mut vp).unwrap();
            dev.lock(&LockParams::default()).unwrap();
            dev.unlock(true).unwrap();
            dev.exit();
            assert_eq!(dev.arena().offset(), 0);
        }
        assert_eq!(dev.hardware().terminations(), 3);
        assert_eq!(dev.framebuffers(), None);
        assert_eq!(PixelFormat::from_color_depth(dev.config.color_depth), Some(PixelFormat::Rgba8888));
    }
}
