//! Copies a CPU-rendered frame into a hardware colour buffer.
//!
//! The software surface is tightly packed (or has its own stride) while hardware buffers
//! use the wider hardware pitch, so the copy goes row by row and only touches the visible
//! bytes of each destination row.

use crate::errors::DisplayError;
use crate::render::hardware::GuHardware;
use crate::render::surface::SoftwareSurface;
use crate::vram::VramRegion;

/// What a blit moved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlitReport {
    pub rows: usize,
    pub bytes: usize,
}

/// Copies `rows` rows of `row_bytes` each from `src` to `dst`.
///
/// Source rows start every `src_stride` bytes, destination rows every `dst_pitch` bytes.
/// Bytes past `row_bytes` in a destination row are left alone.
pub fn blit_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_pitch: usize,
    row_bytes: usize,
    rows: usize,
) -> Result<BlitReport, DisplayError> {
    if rows == 0 || row_bytes == 0 {
        return Ok(BlitReport::default());
    }
    if row_bytes > src_stride || row_bytes > dst_pitch {
        return Err(DisplayError::SurfaceMismatch(format!(
            "row of {row_bytes} bytes exceeds stride {src_stride} or pitch {dst_pitch}"
        )));
    }
    let src_needed = (rows - 1) * src_stride + row_bytes;
    let dst_needed = (rows - 1) * dst_pitch + row_bytes;
    if src.len() < src_needed || dst.len() < dst_needed {
        return Err(DisplayError::SurfaceMismatch(format!(
            "{rows} rows need {src_needed} source and {dst_needed} destination bytes, have {} and {}",
            src.len(),
            dst.len()
        )));
    }

    for row in 0..rows {
        let s = row * src_stride;
        let d = row * dst_pitch;
        dst[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
    }

    Ok(BlitReport { rows, bytes: rows * row_bytes })
}

/// Pushes `surface` into the hardware buffer `target`, whose rows are `dst_pitch` bytes apart.
///
/// Writes back the CPU cache over the source pixels first so the GPU sees them.
pub fn composite<H: GuHardware + ?Sized>(
    surface: &SoftwareSurface,
    hw: &mut H,
    target: &VramRegion,
    dst_pitch: usize,
) -> Result<BlitReport, DisplayError> {
    if surface.format() != target.format() {
        return Err(DisplayError::SurfaceMismatch(format!(
            "surface is {} but the frame buffer is {}",
            surface.format(),
            target.format()
        )));
    }

    let rows = surface.height() as usize;
    let row_bytes = surface.row_bytes();
    let src_len = if rows == 0 { 0 } else { (rows - 1) * surface.stride() + row_bytes };
    hw.writeback_dcache(&surface.bytes()[..src_len.min(surface.bytes().len())]);

    let range = target.range();
    let vram = hw.vram_mut();
    let Some(dst) = vram.get_mut(range) else {
        return Err(DisplayError::SurfaceMismatch(format!("{target:?} lies outside VRAM")));
    };

    let report = blit_rows(surface.bytes(), surface.stride(), dst, dst_pitch, row_bytes, rows)?;
    log::trace!("Compositor: {} rows, {} bytes into {:?}", report.rows, report.bytes, target);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::hardware::SimulatedGpu;
    use crate::vram::{PixelFormat, VramArena};

    #[test]
    fn copies_row_bytes_and_leaves_pitch_padding() {
        let src: Vec<u8> = (0..960 * 2).map(|i| (i % 251) as u8 + 1).collect();
        let mut dst = vec![0xAAu8; 1024 * 2];

        let report = blit_rows(&src, 960, &mut dst, 1024, 960, 2).unwrap();
        assert_eq!(report, BlitReport { rows: 2, bytes: 1920 });

        for row in 0..2 {
            assert_eq!(&dst[row * 1024..row * 1024 + 960], &src[row * 960..row * 960 + 960]);
            assert!(dst[row * 1024 + 960..row * 1024 + 1024].iter().all(|&b| b == 0xAA));
        }
    }

    #[test]
    fn rejects_rows_wider_than_pitch() {
        let src = vec![0u8; 64];
        let mut dst = vec![0u8; 64];
        assert!(matches!(
            blit_rows(&src, 32, &mut dst, 16, 32, 2),
            Err(DisplayError::SurfaceMismatch(_))
        ));
        assert!(matches!(
            blit_rows(&src, 32, &mut dst, 32, 32, 3),
            Err(DisplayError::SurfaceMismatch(_))
        ));
    }

    #[test]
    fn composite_writes_back_cache_and_fills_target() {
        let mut gpu = SimulatedGpu::new(8192, None);
        let mut arena: VramArena = VramArena::new();
        arena.init(0, 8192);
        let target = arena.allocate(512 * 2 * 2, PixelFormat::Rgb565).unwrap();

        let mut surface = SoftwareSurface::new(480, 2, PixelFormat::Rgb565);
        surface.fill([255, 255, 255, 255]);

        let report = composite(&surface, &mut gpu, &target, 1024).unwrap();
        assert_eq!(report.bytes, 1920);
        assert_eq!(gpu.writebacks(), (1, 1920));

        let vram = gpu.vram();
        assert!(vram[..960].iter().all(|&b| b == 0xff));
        assert!(vram[960..1024].iter().all(|&b| b == 0));
        assert!(vram[1024..1984].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn composite_refuses_format_mismatch() {
        let mut gpu = SimulatedGpu::new(4096, None);
        let mut arena: VramArena = VramArena::new();
        arena.init(0, 4096);
        let target = arena.allocate(1024, PixelFormat::Rgba8888).unwrap();
        let surface = SoftwareSurface::new(4, 4, PixelFormat::Rgb565);
        assert!(composite(&surface, &mut gpu, &target, 16).is_err());
        assert_eq!(gpu.writebacks(), (0, 0));
    }
}
