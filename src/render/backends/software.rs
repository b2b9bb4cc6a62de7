//! CPU rasterizer drawing into a [`SoftwareSurface`].
//!
//! Used standalone, the device allocates and owns its surface. Used as the rasterizer of a
//! hardware device, it draws into the surface the hardware device published on the
//! viewport and only keeps a [`ScreenHandle`] to it.
//!
//! Only screen-space work is rasterized: clears, flat tiles, lines and point rectangles.
//! Surfaces and polygons are accepted and counted.

use crate::config::SOFTWARE_RENDER_DEVICE;
use crate::errors::DisplayError;
use crate::render::device::{expect_state, DeviceCaps, DeviceState, LockFlags, LockParams, RenderDevice};
use crate::render::primitives::{
    LineFlags, Plane, PolyFlags, SceneFrame, SurfaceFacet, SurfaceInfo, TextureInfo, Tile, TransformedVertex,
    Vector3,
};
use crate::render::stats::DeviceStats;
use crate::render::surface::{RgbaImage, ScreenHandle, SharedSurface, SoftwareSurface};
use crate::render::Viewport;
use crate::vram::PixelFormat;

use DeviceState::*;

enum Target {
    Owned(SharedSurface),
    Lent(ScreenHandle),
}

impl Target {
    fn surface(&self) -> Option<SharedSurface> {
        match self {
            Target::Owned(s) => Some(s.clone()),
            Target::Lent(h) => h.upgrade(),
        }
    }
}

pub struct SoftwareRenderDevice {
    state: DeviceState,
    target: Option<Target>,
    caps: DeviceCaps,
    stats: DeviceStats,
    frame: LockParams,

    hit_testing: bool,
    hit_stack: Vec<u8>,
    hit_pending: bool,
    hits: Vec<u8>,
}

impl Default for SoftwareRenderDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareRenderDevice {
    pub fn new() -> Self {
        Self {
            state: Uninitialized,
            target: None,
            caps: DeviceCaps::empty(),
            stats: DeviceStats::default(),
            frame: LockParams::default(),
            hit_testing: false,
            hit_stack: Vec::new(),
            hit_pending: false,
            hits: Vec::new(),
        }
    }

    /// True when the surface is owned by this device rather than lent by a hardware device.
    pub fn owns_surface(&self) -> bool {
        matches!(self.target, Some(Target::Owned(_)))
    }

    fn check(&self, op: &'static str, allowed: &[DeviceState]) -> Result<(), DisplayError> {
        expect_state(self.name(), op, self.state, allowed)
    }

    fn surface(&self) -> Result<SharedSurface, DisplayError> {
        self.target
            .as_ref()
            .and_then(Target::surface)
            .ok_or_else(|| DisplayError::SurfaceMismatch("software screen has been released".to_string()))
    }

    /// Records that something was drawn for the innermost pushed hit.
    fn touched(&mut self) {
        if self.hit_testing && !self.hit_stack.is_empty() {
            self.hit_pending = true;
        }
    }

    fn apply_flash(&mut self) -> Result<(), DisplayError> {
        if !self.frame.has_flash() {
            return Ok(());
        }
        let scale = self.frame.flash_scale;
        let fog = self.frame.flash_fog;
        let tint = |c: u8, s: f32, f: f32| (c as f32 * s + f * 255.0).clamp(0.0, 255.0).round() as u8;

        self.surface()?.borrow_mut().map_pixels(|[r, g, b, a]| {
            [tint(r, scale.r, fog.r), tint(g, scale.g, fog.g), tint(b, scale.b, fog.b), a]
        });
        Ok(())
    }
}

/// Colour of a flat-shaded tile.
fn tile_color(tile: &Tile) -> [u8; 4] {
    let tex = tile.texture.average_color;
    if tex.is_zero() {
        return tile.color.to_rgba8();
    }
    Plane::new(tex.r * tile.color.r, tex.g * tile.color.g, tex.b * tile.color.b, tex.a * tile.color.a).to_rgba8()
}

/// Offsets a scene coordinate by the frame origin, saturating at the `i64` range.
fn screen_coord(origin: i32, v: f32) -> i64 {
    i64::from(origin).saturating_add(v as i64)
}

/// Clips the segment `a`-`b` to the pixel rectangle `[0, width) x [0, height)` (Liang-Barsky).
/// Returns `None` when no part of it is on the surface.
fn clip_line(a: (i64, i64), b: (i64, i64), width: u32, height: u32) -> Option<((i64, i64), (i64, i64))> {
    if width == 0 || height == 0 {
        return None;
    }
    let (x0, y0) = (a.0 as f64, a.1 as f64);
    let (dx, dy) = (b.0 as f64 - x0, b.1 as f64 - y0);
    let (xmax, ymax) = (i64::from(width - 1), i64::from(height - 1));

    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, x0), (dx, xmax as f64 - x0), (-dy, y0), (dy, ymax as f64 - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    let at = |t: f64| {
        let x = ((x0 + t * dx).round() as i64).clamp(0, xmax);
        let y = ((y0 + t * dy).round() as i64).clamp(0, ymax);
        (x, y)
    };
    Some((at(t0), at(t1)))
}

/// Plots the Bresenham line from `(x0, y0)` to `(x1, y1)`, both ends included.
fn bresenham(surface: &mut SoftwareSurface, (mut x0, mut y0): (i64, i64), (x1, y1): (i64, i64), rgba: [u8; 4]) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        surface.put_pixel(x0, y0, rgba);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

impl RenderDevice for SoftwareRenderDevice {
    fn name(&self) -> &'static str {
        SOFTWARE_RENDER_DEVICE
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

        let lent = match (viewport.screen(), viewport.screen_handle()) {
            (Some(screen), Some(handle)) => {
                let format = screen.borrow().format();
                Some((handle.clone(), format))
            }
            _ => None,
        };

        let (target, format) = match lent {
            Some((handle, format)) => (Target::Lent(handle), format),
            None => {
                let format = match viewport.requested_color_bytes {
                    2 => PixelFormat::Rgb565,
                    _ => PixelFormat::Rgba8888,
                };
                let surface = SoftwareSurface::new(viewport.width, viewport.height, format).into_shared();
                viewport.publish_screen(&surface);
                (Target::Owned(surface), format)
            }
        };

        let mut caps = DeviceCaps::SPAN_BASED | DeviceCaps::FRAME_BUFFERED;
        if format.bytes_per_pixel() == 4 {
            caps |= DeviceCaps::HI_COLOR;
        }
        viewport.publish(format.bytes_per_pixel(), viewport.stride(), caps);

        log::info!(
            "SoftDevice: init done, {}x{} {} ({} surface)",
            viewport.width,
            viewport.height,
            format,
            if matches!(target, Target::Owned(_)) { "own" } else { "lent" }
        );

        self.target = Some(target);
        self.caps = caps;
        self.stats = DeviceStats::default();
        self.state = Initialized;
        Ok(())
    }

    fn exit(&mut self) {
        if self.state == Exited {
            return;
        }
        self.target = None;
        self.hit_stack.clear();
        self.hits.clear();
        self.hit_pending = false;
        self.caps = DeviceCaps::empty();
        self.state = Exited;
        log::info!("SoftDevice: exit");
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        self.check("flush", &[Initialized, Locked])
    }

    fn lock(&mut self, params: &LockParams) -> Result<(), DisplayError> {
        self.check("lock", &[Initialized])?;
        let surface = self.surface()?;
        if params.flags.contains(LockFlags::CLEAR_SCREEN) {
            surface.borrow_mut().fill(params.screen_clear.to_rgba8());
        }

        self.frame = *params;
        self.hit_testing = params.flags.contains(LockFlags::HIT_TESTING);
        self.hit_stack.clear();
        self.hit_pending = false;
        self.hits.clear();
        self.state = Locked;
        Ok(())
    }

    fn unlock(&mut self, present: bool) -> Result<(), DisplayError> {
        self.check("unlock", &[Locked])?;
        self.state = Initialized;
        self.apply_flash()?;
        if present {
            self.stats.frames += 1;
        }
        log::trace!("SoftDevice: frame done ({})", self.stats);
        Ok(())
    }

    fn draw_surface(
        &mut self,
        _frame: &SceneFrame,
        surface: &SurfaceInfo,
        facet: &SurfaceFacet,
    ) -> Result<(), DisplayError> {
        self.check("draw_surface", &[Locked])?;
        self.stats.surfaces += 1;
        if !surface.poly_flags.contains(PolyFlags::INVISIBLE) && !facet.polys.is_empty() {
            self.touched();
        }
        Ok(())
    }

    fn draw_polygon(
        &mut self,
        _frame: &SceneFrame,
        _texture: &TextureInfo,
        vertices: &[TransformedVertex],
        flags: PolyFlags,
    ) -> Result<(), DisplayError> {
        self.check("draw_polygon", &[Locked])?;
        self.stats.polygons += 1;
        if vertices.len() >= 3 && !flags.contains(PolyFlags::INVISIBLE) {
            self.touched();
        }
        Ok(())
    }

    fn draw_tile(&mut self, frame: &SceneFrame, tile: &Tile) -> Result<(), DisplayError> {
        self.check("draw_tile", &[Locked])?;
        self.stats.tiles += 1;
        if tile.poly_flags.contains(PolyFlags::INVISIBLE) {
            return Ok(());
        }

        let x0 = screen_coord(frame.x, tile.x.floor());
        let y0 = screen_coord(frame.y, tile.y.floor());
        let x1 = screen_coord(frame.x, (tile.x + tile.xl).ceil());
        let y1 = screen_coord(frame.y, (tile.y + tile.yl).ceil());
        self.surface()?.borrow_mut().fill_rect(x0, y0, x1, y1, tile_color(tile));
        self.touched();
        Ok(())
    }

    fn draw_2d_line(
        &mut self,
        frame: &SceneFrame,
        color: Plane,
        _flags: LineFlags,
        p1: Vector3,
        p2: Vector3,
    ) -> Result<(), DisplayError> {
        self.check("draw_2d_line", &[Locked])?;
        self.stats.lines += 1;

        let start = (screen_coord(frame.x, p1.x.round()), screen_coord(frame.y, p1.y.round()));
        let end = (screen_coord(frame.x, p2.x.round()), screen_coord(frame.y, p2.y.round()));
        let surface = self.surface()?;
        let mut surface = surface.borrow_mut();
        if let Some((start, end)) = clip_line(start, end, surface.width(), surface.height()) {
            bresenham(&mut surface, start, end, color.to_rgba8());
        }
        drop(surface);
        self.touched();
        Ok(())
    }

    fn draw_2d_point(
        &mut self,
        frame: &SceneFrame,
        color: Plane,
        _flags: LineFlags,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    ) -> Result<(), DisplayError> {
        self.check("draw_2d_point", &[Locked])?;
        self.stats.points += 1;

        let (x0, y0) = (screen_coord(frame.x, x1.round()), screen_coord(frame.y, y1.round()));
        let (x1, y1) = (screen_coord(frame.x, x2.round()), screen_coord(frame.y, y2.round()));
        self.surface()?.borrow_mut().fill_rect(
            x0.min(x1),
            y0.min(y1),
            x0.max(x1).saturating_add(1),
            y0.max(y1).saturating_add(1),
            color.to_rgba8(),
        );
        self.touched();
        Ok(())
    }

    fn clear_depth(&mut self, _frame: &SceneFrame) -> Result<(), DisplayError> {
        // No depth buffer on this path.
        self.check("clear_depth", &[Locked])
    }

    fn push_hit(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.check("push_hit", &[Locked])?;
        if self.hit_testing {
            self.hit_stack.extend_from_slice(data);
            self.hit_pending = false;
        }
        Ok(())
    }

    fn pop_hit(&mut self, count: usize, force: bool) -> Result<(), DisplayError> {
        self.check("pop_hit", &[Locked])?;
        if !self.hit_testing {
            return Ok(());
        }
        if self.hit_pending || force {
            self.hits.extend_from_slice(&self.hit_stack);
        }
        if count > self.hit_stack.len() {
            log::warn!("SoftDevice: pop_hit({}) with only {} bytes pushed", count, self.hit_stack.len());
        }
        let keep = self.hit_stack.len().saturating_sub(count);
        self.hit_stack.truncate(keep);
        self.hit_pending = false;
        Ok(())
    }

    fn take_hits(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.hits)
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, DisplayError> {
        self.check("read_pixels", &[Locked])?;
        let image = self.surface()?.borrow().to_rgba();
        Ok(image)
    }

    fn stats(&self) -> Result<DeviceStats, DisplayError> {
        self.check("stats", &[Locked])?;
        Ok(self.stats.clone())
    }

    fn end_flash(&mut self) -> Result<(), DisplayError> {
        self.check("end_flash", &[Locked])?;
        self.frame.flash_scale = Plane::ONE;
        self.frame.flash_fog = Plane::ZERO;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked(width: u32, height: u32) -> (SoftwareRenderDevice, Viewport) {
        let mut vp = Viewport::new(width, height);
        let mut dev = SoftwareRenderDevice::new();
        dev.init(&mut vp).unwrap();
        dev.lock(&LockParams::default()).unwrap();
        (dev, vp)
    }

    const WHITE: Plane = Plane::ONE;

    #[test]
    fn standalone_init_owns_and_publishes_surface() {
        let mut vp = Viewport::new(16, 8);
        let mut dev = SoftwareRenderDevice::new();
        dev.init(&mut vp).unwrap();

        assert!(dev.owns_surface());
        assert_eq!(vp.stride(), 64);
        assert_eq!(vp.color_bytes(), 4);
        assert!(vp.caps().contains(DeviceCaps::SPAN_BASED | DeviceCaps::HI_COLOR));

        dev.exit();
        assert!(vp.screen().is_none());
        assert_eq!(dev.state(), Exited);
    }

    #[test]
    fn lent_surface_is_drawn_in_place() {
        let surface = SoftwareSurface::new(8, 8, PixelFormat::Rgb565).into_shared();
        let mut vp = Viewport::new(8, 8);
        vp.publish_screen(&surface);

        let mut dev = SoftwareRenderDevice::new();
        dev.init(&mut vp).unwrap();
        assert!(!dev.owns_surface());
        assert!(!vp.caps().contains(DeviceCaps::HI_COLOR));

        dev.lock(&LockParams::default()).unwrap();
        dev.draw_2d_point(&SceneFrame::full(8, 8), WHITE, LineFlags::empty(), 2.0, 2.0, 3.0, 3.0).unwrap();
        assert_eq!(surface.borrow().pixel(3, 3), Some([255, 255, 255, 255]));
        assert_eq!(surface.borrow().pixel(4, 4), Some([0, 0, 0, 255]));

        // Dropping the lender invalidates the target.
        drop(surface);
        assert!(dev.draw_2d_point(&SceneFrame::full(8, 8), WHITE, LineFlags::empty(), 0.0, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn draws_outside_lock_are_rejected() {
        let mut dev = SoftwareRenderDevice::new();
        let tile = Tile { xl: 4.0, yl: 4.0, color: WHITE, ..Default::default() };
        let err = dev.draw_tile(&SceneFrame::full(4, 4), &tile).unwrap_err();
        assert!(matches!(err, DisplayError::InvalidStateTransition { op: "draw_tile", state: Uninitialized }));

        let mut vp = Viewport::new(4, 4);
        dev.init(&mut vp).unwrap();
        assert!(dev.draw_tile(&SceneFrame::full(4, 4), &tile).unwrap_err().is_state_error());
        let pixels = vp.screen().unwrap().borrow().bytes().to_vec();
        assert!(pixels.iter().all(|&b| b == 0));
    }

    #[test]
    fn tile_fills_rect_with_frame_offset() {
        let (mut dev, vp) = locked(8, 8);
        let tile = Tile { x: 1.0, y: 1.0, xl: 2.0, yl: 2.0, color: Plane::new(1.0, 0.0, 0.0, 1.0), ..Default::default() };
        dev.draw_tile(&SceneFrame::new(2, 0, 6, 8), &tile).unwrap();

        let screen = vp.screen().unwrap();
        let s = screen.borrow();
        assert_eq!(s.pixel(3, 1), Some([255, 0, 0, 255]));
        assert_eq!(s.pixel(4, 2), Some([255, 0, 0, 255]));
        assert_eq!(s.pixel(5, 2), Some([0, 0, 0, 0]));
        assert_eq!(s.pixel(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn line_hits_both_endpoints() {
        let (mut dev, _vp) = locked(8, 8);
        dev.draw_2d_line(
            &SceneFrame::full(8, 8),
            WHITE,
            LineFlags::empty(),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(7.0, 3.0, 0.0),
        )
        .unwrap();
        let img = dev.read_pixels().unwrap();
        assert_eq!(img.pixel(0, 0), Some([255; 4]));
        assert_eq!(img.pixel(7, 3), Some([255; 4]));
        assert_eq!(img.pixel(0, 3), Some([0; 4]));
        assert_eq!(dev.stats().unwrap().lines, 1);
    }

    #[test]
    fn off_screen_coordinates_are_clipped() {
        let (mut dev, vp) = locked(8, 8);
        let frame = SceneFrame::new(1, 0, 8, 8);

        let far = Tile { x: 3.0e9, y: 0.0, xl: 4.0, yl: 4.0, color: WHITE, ..Default::default() };
        dev.draw_tile(&frame, &far).unwrap();
        let huge = Tile { x: -f32::MAX, y: -f32::MAX, xl: f32::MAX, yl: f32::MAX, color: WHITE, ..Default::default() };
        dev.draw_tile(&SceneFrame::new(i32::MAX, i32::MIN, 8, 8), &huge).unwrap();
        dev.draw_2d_point(&frame, WHITE, LineFlags::empty(), 9.0e9, 0.0, f32::MAX, 1.0).unwrap();
        dev.draw_2d_line(
            &SceneFrame::new(i32::MAX, 0, 8, 8),
            WHITE,
            LineFlags::empty(),
            Vector3::new(f32::MAX, 0.0, 0.0),
            Vector3::new(f32::MAX, 7.0, 0.0),
        )
        .unwrap();
        assert!(vp.screen().unwrap().borrow().bytes().iter().all(|&b| b == 0));

        // A point rect reaching past the edge still covers the visible part.
        dev.draw_2d_point(&frame, WHITE, LineFlags::empty(), 5.0, 5.0, f32::MAX, 5.0).unwrap();
        let screen = vp.screen().unwrap();
        assert_eq!(screen.borrow().pixel(7, 5), Some([255; 4]));
        assert_eq!(screen.borrow().pixel(5, 5), Some([0; 4]));
        assert_eq!(dev.stats().unwrap().tiles, 2);
    }

    #[test]
    fn long_lines_only_step_over_the_surface() {
        let (mut dev, _vp) = locked(8, 8);
        let frame = SceneFrame::full(8, 8);
        dev.draw_2d_line(&frame, WHITE, LineFlags::empty(), Vector3::new(0.0, 0.0, 0.0), Vector3::new(2.0e8, 0.0, 0.0))
            .unwrap();
        dev.draw_2d_line(
            &frame,
            WHITE,
            LineFlags::empty(),
            Vector3::new(-1.0e9, -1.0e9, 0.0),
            Vector3::new(1.0e9, 1.0e9, 0.0),
        )
        .unwrap();
        // Entirely above the surface.
        dev.draw_2d_line(&frame, WHITE, LineFlags::empty(), Vector3::new(-5.0e8, -3.0, 0.0), Vector3::new(5.0e8, -3.0, 0.0))
            .unwrap();

        let img = dev.read_pixels().unwrap();
        assert!((0..8).all(|x| img.pixel(x, 0) == Some([255; 4])));
        assert_eq!(img.pixel(3, 3), Some([255; 4]));
        assert_eq!(img.pixel(7, 7), Some([255; 4]));
        assert_eq!(img.pixel(0, 1), Some([0; 4]));
        assert_eq!(img.pixel(6, 7), Some([0; 4]));
    }

    #[test]
    fn clip_line_keeps_inside_segments_exact() {
        assert_eq!(clip_line((1, 2), (6, 5), 8, 8), Some(((1, 2), (6, 5))));
        assert_eq!(clip_line((-4, 0), (20, 0), 8, 8), Some(((0, 0), (7, 0))));
        assert_eq!(clip_line((-4, -1), (20, -1), 8, 8), None);
        assert_eq!(clip_line((9, 0), (9, 7), 8, 8), None);
        assert_eq!(clip_line((0, 0), (1, 1), 0, 8), None);
    }

    #[test]
    fn flash_tints_at_unlock_unless_ended() {
        let mut vp = Viewport::new(2, 2);
        let mut dev = SoftwareRenderDevice::new();
        dev.init(&mut vp).unwrap();

        let params = LockParams {
            screen_clear: Plane::new(0.5, 0.5, 0.5, 1.0),
            flash_scale: Plane::new(0.5, 1.0, 1.0, 1.0),
            flash_fog: Plane::new(0.0, 0.0, 0.2, 0.0),
            flags: LockFlags::CLEAR_SCREEN,
        };
        dev.lock(&params).unwrap();
        dev.unlock(true).unwrap();
        assert_eq!(vp.screen().unwrap().borrow().pixel(0, 0), Some([64, 128, 179, 255]));

        dev.lock(&params).unwrap();
        dev.end_flash().unwrap();
        dev.unlock(true).unwrap();
        assert_eq!(vp.screen().unwrap().borrow().pixel(0, 0), Some([128, 128, 128, 255]));
    }

    #[test]
    fn hit_stack_records_when_drawn_or_forced() {
        let mut vp = Viewport::new(4, 4);
        let mut dev = SoftwareRenderDevice::new();
        dev.init(&mut vp).unwrap();
        dev.lock(&LockParams { flags: LockFlags::HIT_TESTING, ..Default::default() }).unwrap();
        let frame = SceneFrame::full(4, 4);

        dev.push_hit(&[1, 2]).unwrap();
        dev.draw_2d_point(&frame, WHITE, LineFlags::empty(), 0.0, 0.0, 0.0, 0.0).unwrap();
        dev.pop_hit(2, false).unwrap();

        dev.push_hit(&[3]).unwrap();
        dev.pop_hit(1, false).unwrap();

        dev.push_hit(&[4]).unwrap();
        dev.pop_hit(1, true).unwrap();
        dev.unlock(false).unwrap();

        assert_eq!(dev.take_hits(), vec![1, 2, 4]);
        assert!(dev.take_hits().is_empty());
    }

    #[test]
    fn polygons_are_counted_not_drawn() {
        let (mut dev, vp) = locked(4, 4);
        let verts = [TransformedVertex::default(); 3];
        dev.draw_polygon(&SceneFrame::full(4, 4), &TextureInfo::default(), &verts, PolyFlags::empty()).unwrap();
        dev.draw_surface(&SceneFrame::full(4, 4), &SurfaceInfo::default(), &SurfaceFacet::default()).unwrap();

        let stats = dev.stats().unwrap();
        assert_eq!((stats.polygons, stats.surfaces), (1, 1));
        assert!(vp.screen().unwrap().borrow().bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn exit_is_idempotent_and_allows_reinit() {
        let (mut dev, mut vp) = locked(4, 4);
        dev.exit();
        dev.exit();
        assert_eq!(dev.state(), Exited);
        assert!(dev.lock(&LockParams::default()).is_err());

        vp.clear_published();
        dev.init(&mut vp).unwrap();
        assert_eq!(dev.state(), Initialized);
    }
}
