use crate::errors::DisplayError;
use crate::vram::{PixelFormat, VramArena, VramRegion};

/// Double-buffered colour targets plus one depth buffer, all carved out of the VRAM arena.
///
/// One colour buffer is drawn into while the other is scanned out. `draw_index` selects the
/// draw buffer and flips once per presented frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBufferSet {
    buffers: [VramRegion; 2],
    depth: VramRegion,
    draw_index: usize,
    pitch: u32,
    height: u32,
}

impl FrameBufferSet {
    /// Reserves two colour buffers and then the depth buffer, each `pitch` pixels wide.
    ///
    /// Either all three regions are reserved or the arena offset is restored and the
    /// error returned.
    pub fn allocate(
        arena: &mut VramArena,
        pitch: u32,
        height: u32,
        format: PixelFormat,
        depth_format: PixelFormat,
    ) -> Result<Self, DisplayError> {
        let rows = pitch as u64 * height as u64;
        let color_bytes = rows * format.bytes_per_pixel() as u64;
        let depth_bytes = rows * depth_format.bytes_per_pixel() as u64;

        let start = arena.offset();
        let reserve = |arena: &mut VramArena| -> Result<Self, DisplayError> {
            let front = arena.allocate(color_bytes, format)?;
            let back = arena.allocate(color_bytes, format)?;
            let depth = arena.allocate(depth_bytes, depth_format)?;
            Ok(Self {
                buffers: [front, back],
                depth,
                draw_index: 0,
                pitch,
                height,
            })
        };

        match reserve(arena) {
            Ok(set) => {
                log::debug!(
                    "FrameBufferSet: {}x{} {} buffers at {:#x}/{:#x}, depth at {:#x}",
                    pitch,
                    height,
                    format,
                    set.buffers[0].address(),
                    set.buffers[1].address(),
                    set.depth.address()
                );
                Ok(set)
            }
            Err(e) => {
                arena.rewind_to(start);
                Err(e)
            }
        }
    }

    /// Buffer the GPU renders the next frame into.
    pub fn current_draw(&self) -> &VramRegion {
        &self.buffers[self.draw_index]
    }

    /// Buffer being scanned out.
    pub fn current_display(&self) -> &VramRegion {
        &self.buffers[self.draw_index ^ 1]
    }

    pub fn depth(&self) -> &VramRegion {
        &self.depth
    }

    /// Flips draw and display. Call only after the hardware swap went through.
    pub fn swap(&mut self) {
        self.draw_index ^= 1;
    }

    pub fn draw_index(&self) -> usize {
        self.draw_index
    }

    /// Row pitch in pixels.
    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    /// Row pitch of the colour buffers in bytes.
    pub fn pitch_bytes(&self) -> usize {
        self.pitch as usize * self.buffers[0].format().bytes_per_pixel() as usize
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.buffers[0].format()
    }
}
