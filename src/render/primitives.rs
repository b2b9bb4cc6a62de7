//! Value types passed from the scene renderer to a render device.
//!
//! These mirror what the scene renderer already computes per draw call. Devices treat them
//! as read-only input.

use bitflags::bitflags;

/// Floating point colour, one float per channel in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Plane {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Plane {
    pub const ZERO: Plane = Plane { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };
    pub const ONE: Plane = Plane { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub fn is_zero(&self) -> bool {
        *self == Plane::ZERO
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Region of the viewport a draw call refers to. Coordinates in draw calls are relative
/// to its origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SceneFrame {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl SceneFrame {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Frame covering a whole `width` x `height` viewport.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// Texture the scene renderer wants applied. The display pipeline has no texture cache;
/// devices only use the identity and the average colour.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct TextureInfo {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub average_color: Plane,
}

/// Screen-space vertex produced by the scene transform.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct TransformedVertex {
    pub point: Vector3,
    pub u: f32,
    pub v: f32,
    pub light: Plane,
}

bitflags! {
    /// Per-polygon render flags.
    #[derive(Default)]
    pub struct PolyFlags: u32 {
        const INVISIBLE   = 0x0000_0001;
        const MASKED      = 0x0000_0002;
        const TRANSLUCENT = 0x0000_0004;
        const MODULATED   = 0x0000_0040;
        const TWO_SIDED   = 0x0000_0100;
        const UNLIT       = 0x0040_0000;
    }
}

bitflags! {
    /// Flags for 2-D lines and points.
    #[derive(Default)]
    pub struct LineFlags: u32 {
        const DEPTH_CUED = 0x01;
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct SurfaceInfo {
    pub texture: Option<TextureInfo>,
    pub poly_flags: PolyFlags,
    pub flat_color: Plane,
}

/// Convex polygons making up one BSP surface.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SurfaceFacet {
    pub polys: Vec<Vec<TransformedVertex>>,
}

/// Screen-aligned textured rectangle (HUD, sprites).
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Tile {
    pub x: f32,
    pub y: f32,
    pub xl: f32,
    pub yl: f32,
    pub u: f32,
    pub v: f32,
    pub ul: f32,
    pub vl: f32,
    pub z: f32,
    pub texture: TextureInfo,
    pub color: Plane,
    pub fog: Plane,
    pub poly_flags: PolyFlags,
}
