use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::errors::DisplayError;
use crate::vram::PixelFormat;

/// CPU-side pixel buffer a software rasterizer draws into.
///
/// Lives in ordinary heap memory and never aliases video memory. Its contents reach the
/// screen only through the compositor.
pub struct SoftwareSurface {
    pixels: Vec<u8>,
    /// Row pitch in bytes.
    stride: usize,
    width: u32,
    height: u32,
    format: PixelFormat,
}

/// Owning handle the render device keeps for its software surface.
pub type SharedSurface = Rc<RefCell<SoftwareSurface>>;

impl SoftwareSurface {
    /// Allocates a zeroed, tightly packed surface.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel() as usize;
        Self {
            pixels: vec![0u8; stride * height as usize],
            stride,
            width,
            height,
            format,
        }
    }

    /// Allocates a surface with a row pitch wider than the visible width.
    pub fn with_stride(width: u32, height: u32, stride: usize, format: PixelFormat) -> Result<Self, DisplayError> {
        let row_bytes = width as usize * format.bytes_per_pixel() as usize;
        if stride < row_bytes {
            return Err(DisplayError::SurfaceMismatch(format!(
                "stride {stride} is smaller than a {width} pixel row ({row_bytes} bytes)"
            )));
        }
        Ok(Self {
            pixels: vec![0u8; stride * height as usize],
            stride,
            width,
            height,
            format,
        })
    }

    pub fn into_shared(self) -> SharedSurface {
        Rc::new(RefCell::new(self))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel() as usize
    }

    /// Bytes of visible pixels in one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        self.fill_rect(0, 0, self.width.into(), self.height.into(), rgba);
    }

    /// Fills the half-open rectangle `[x0, x1) x [y0, y1)`, clipped to the surface.
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, rgba: [u8; 4]) {
        let (w, h) = (i64::from(self.width), i64::from(self.height));
        let (x0, x1) = (x0.clamp(0, w), x1.clamp(0, w));
        let (y0, y1) = (y0.clamp(0, h), y1.clamp(0, h));
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let (encoded, bpp) = self.format.encode(rgba);
        for y in y0 as usize..y1 as usize {
            let row = &mut self.pixels[y * self.stride..];
            for x in x0 as usize..x1 as usize {
                row[x * bpp..x * bpp + bpp].copy_from_slice(&encoded[..bpp]);
            }
        }
    }

    pub fn put_pixel(&mut self, x: i64, y: i64, rgba: [u8; 4]) {
        self.fill_rect(x, y, x.saturating_add(1), y.saturating_add(1), rgba);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.bytes_per_pixel();
        let at = y as usize * self.stride + x as usize * bpp;
        Some(self.format.decode(&self.pixels[at..at + bpp]))
    }

    /// Rewrites every visible pixel through `f`.
    pub fn map_pixels(&mut self, mut f: impl FnMut([u8; 4]) -> [u8; 4]) {
        let bpp = self.bytes_per_pixel();
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                let at = y * self.stride + x * bpp;
                let px = f(self.format.decode(&self.pixels[at..at + bpp]));
                let (encoded, _) = self.format.encode(px);
                self.pixels[at..at + bpp].copy_from_slice(&encoded[..bpp]);
            }
        }
    }

    /// RGBA8 copy of the visible area.
    pub fn to_rgba(&self) -> RgbaImage {
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                // In range by construction.
                pixels.extend_from_slice(&self.pixel(x, y).unwrap_or_default());
            }
        }
        RgbaImage {
            pixels,
            width: self.width,
            height: self.height,
            stride: self.width * 4,
        }
    }
}

impl fmt::Debug for SoftwareSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .finish()
    }
}

/// Non-owning reference to a software surface, published on a viewport as its screen.
///
/// The device that allocated the surface keeps the only strong reference. Once it exits,
/// every screen handle stops resolving.
#[derive(Clone, Default)]
pub struct ScreenHandle(Weak<RefCell<SoftwareSurface>>);

impl ScreenHandle {
    pub fn new(surface: &SharedSurface) -> Self {
        Self(Rc::downgrade(surface))
    }

    pub fn upgrade(&self) -> Option<SharedSurface> {
        self.0.upgrade()
    }

    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for ScreenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScreenHandle {{ live: {} }}", self.is_live())
    }
}

/// RGBA8 snapshot of a frame.
#[derive(Clone, PartialEq)]
pub struct RgbaImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl RgbaImage {
    pub fn from_raw(pixels: Vec<u8>, width: u32, height: u32, stride: u32) -> Result<Self, DisplayError> {
        if pixels.len() < (height as usize) * (stride as usize) || stride < width * 4 {
            return Err(DisplayError::SurfaceMismatch(
                "pixel buffer too small for image dimensions".to_string(),
            ));
        }

        Ok(Self { pixels, width, height, stride })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y * self.stride + x * 4) as usize;
        let px = self.pixels.get(at..at + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl fmt::Debug for RgbaImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbaImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.pixels.len())
            .finish()
    }
}
