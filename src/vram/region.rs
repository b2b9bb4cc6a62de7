use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Pixel layouts the display hardware understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 16-bit colour, 5-6-5.
    Rgb565,
    /// 16-bit colour, 5-5-5 with one alpha bit.
    Rgba5551,
    /// 16-bit colour, 4 bits per channel.
    Rgba4444,
    /// 32-bit colour, 8 bits per channel (byte order R, G, B, A).
    Rgba8888,
    /// 16-bit depth.
    Depth16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb565
            | PixelFormat::Rgba5551
            | PixelFormat::Rgba4444
            | PixelFormat::Depth16 => 2,
        }
    }

    pub fn is_depth(&self) -> bool {
        matches!(self, PixelFormat::Depth16)
    }

    /// Colour format for a configured colour depth in bits. Only 16 and 32 are supported.
    pub fn from_color_depth(bits: u32) -> Option<Self> {
        match bits {
            16 => Some(PixelFormat::Rgb565),
            32 => Some(PixelFormat::Rgba8888),
            _ => None,
        }
    }

    /// Packs an RGBA8 colour into this format. Returns the little-endian bytes and how many
    /// of them are used.
    pub fn encode(&self, rgba: [u8; 4]) -> ([u8; 4], usize) {
        let [r, g, b, a] = rgba;
        match self {
            PixelFormat::Rgba8888 => ([r, g, b, a], 4),
            PixelFormat::Rgb565 => {
                let v = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                let [lo, hi] = v.to_le_bytes();
                ([lo, hi, 0, 0], 2)
            }
            PixelFormat::Rgba5551 => {
                let v = (r as u16 >> 3)
                    | ((g as u16 >> 3) << 5)
                    | ((b as u16 >> 3) << 10)
                    | (((a >= 0x80) as u16) << 15);
                let [lo, hi] = v.to_le_bytes();
                ([lo, hi, 0, 0], 2)
            }
            PixelFormat::Rgba4444 => {
                let v = (r as u16 >> 4)
                    | ((g as u16 >> 4) << 4)
                    | ((b as u16 >> 4) << 8)
                    | ((a as u16 >> 4) << 12);
                let [lo, hi] = v.to_le_bytes();
                ([lo, hi, 0, 0], 2)
            }
            PixelFormat::Depth16 => {
                let [lo, hi] = (r as u16 * 257).to_le_bytes();
                ([lo, hi, 0, 0], 2)
            }
        }
    }

    /// Expands one pixel stored in this format back to RGBA8.
    pub fn decode(&self, bytes: &[u8]) -> [u8; 4] {
        let expand = |v: u16, bits: u32| -> u8 {
            let max = (1u16 << bits) - 1;
            ((v as u32 * 255 + max as u32 / 2) / max as u32) as u8
        };
        match self {
            PixelFormat::Rgba8888 => [bytes[0], bytes[1], bytes[2], bytes[3]],
            PixelFormat::Rgb565 => {
                let v = u16::from_le_bytes([bytes[0], bytes[1]]);
                [expand(v >> 11, 5), expand((v >> 5) & 0x3f, 6), expand(v & 0x1f, 5), 255]
            }
            PixelFormat::Rgba5551 => {
                let v = u16::from_le_bytes([bytes[0], bytes[1]]);
                [
                    expand(v & 0x1f, 5),
                    expand((v >> 5) & 0x1f, 5),
                    expand((v >> 10) & 0x1f, 5),
                    if v & 0x8000 != 0 { 255 } else { 0 },
                ]
            }
            PixelFormat::Rgba4444 => {
                let v = u16::from_le_bytes([bytes[0], bytes[1]]);
                [
                    expand(v & 0xf, 4),
                    expand((v >> 4) & 0xf, 4),
                    expand((v >> 8) & 0xf, 4),
                    expand(v >> 12, 4),
                ]
            }
            PixelFormat::Depth16 => {
                let d = (u16::from_le_bytes([bytes[0], bytes[1]]) >> 8) as u8;
                [d, d, d, 255]
            }
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Rgba5551 => "RGBA5551",
            PixelFormat::Rgba4444 => "RGBA4444",
            PixelFormat::Rgba8888 => "RGBA8888",
            PixelFormat::Depth16 => "DEPTH16",
        };
        f.write_str(name)
    }
}

/// Opaque handle to a slice of video memory handed out by a [`VramArena`](super::VramArena).
///
/// The handle carries an offset from the start of VRAM and a length; it never exposes a raw
/// pointer. Hardware code resolves it against its VRAM backing through [`VramRegion::range`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VramRegion {
    address: u64,
    size: u64,
    format: PixelFormat,
}

impl VramRegion {
    pub(crate) fn new(address: u64, size: u64, format: PixelFormat) -> Self {
        Self { address, size, format }
    }

    /// Offset of the region from the start of VRAM.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Size in bytes, already rounded to the arena alignment.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Byte range of this region inside a VRAM backing slice.
    pub fn range(&self) -> Range<usize> {
        self.address as usize..(self.address + self.size) as usize
    }

    /// True when both regions share at least one byte.
    pub fn overlaps(&self, other: &VramRegion) -> bool {
        self.address < other.address + other.size && other.address < self.address + self.size
    }
}

impl fmt::Debug for VramRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VramRegion {{ address: {:#08x}, size: {}, format: {} }}", self.address, self.size, self.format)
    }
}
