//! Seam between the render device and the graphics hardware.
//!
//! The GPU consumes display lists: the CPU records [`GuCommand`]s into a [`CommandList`],
//! hands the list over with [`GuHardware::submit`], and later blocks in
//! [`GuHardware::sync`] until the command processor has drained it. Buffer flips happen in
//! [`GuHardware::swap_buffers`], normally right after [`GuHardware::wait_vblank`].
//!
//! [`SimulatedGpu`] implements the seam on top of an in-memory VRAM pool so the whole
//! pipeline can run on a host.

use bitflags::bitflags;
use std::time::Duration;

use crate::errors::DisplayError;
use crate::vram::VramRegion;

bitflags! {
    pub struct ClearFlags: u32 {
        const COLOR = 0x1;
        const DEPTH = 0x4;
    }
}

/// Fixed-function state that can be toggled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GuState {
    ScissorTest,
    DepthTest,
    CullFace,
    ClipPlanes,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GuCommand {
    DrawBuffer { region: VramRegion, pitch: u32 },
    DisplayBuffer { region: VramRegion, width: u32, height: u32, pitch: u32 },
    DepthBuffer { region: VramRegion, pitch: u32 },
    DepthRange { near: u16, far: u16 },
    Viewport { width: u32, height: u32 },
    Scissor { x: u32, y: u32, width: u32, height: u32 },
    Enable(GuState),
    Disable(GuState),
    ClearColor([u8; 4]),
    ClearDepth(u16),
    Clear(ClearFlags),
}

impl GuCommand {
    /// Size of the encoded command in 32-bit words.
    pub fn words(&self) -> usize {
        match self {
            // Base + pointer words.
            GuCommand::DrawBuffer { .. } | GuCommand::DepthBuffer { .. } => 2,
            GuCommand::DisplayBuffer { .. } => 3,
            GuCommand::Viewport { .. } | GuCommand::Scissor { .. } | GuCommand::DepthRange { .. } => 2,
            // Clears are drawn as a sprite pair over the viewport.
            GuCommand::Clear(_) => 6,
            GuCommand::Enable(_) | GuCommand::Disable(_) | GuCommand::ClearColor(_) | GuCommand::ClearDepth(_) => 1,
        }
    }
}

/// Display list under construction. Commands that do not fit are rejected.
#[derive(Clone, Debug)]
pub struct CommandList {
    commands: Vec<GuCommand>,
    capacity_words: usize,
    used_words: usize,
}

impl CommandList {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            commands: Vec::new(),
            capacity_words: capacity_bytes / 4,
            used_words: 0,
        }
    }

    /// Appends `cmd`. Returns `false` when the list is full.
    pub fn push(&mut self, cmd: GuCommand) -> bool {
        let words = cmd.words();
        if self.used_words + words > self.capacity_words {
            log::warn!("CommandList: full ({} of {} words), dropping {:?}", self.used_words, self.capacity_words, cmd);
            return false;
        }
        self.used_words += words;
        self.commands.push(cmd);
        true
    }

    pub fn commands(&self) -> &[GuCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_words * 4
    }
}

/// Operations a render device needs from the graphics hardware.
pub trait GuHardware {
    /// Start of the video memory pool.
    fn vram_base(&self) -> u64 {
        0
    }

    /// Size of the video memory pool in bytes.
    fn vram_size(&self) -> u64;

    /// Brings up the graphics context.
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Hands a finished list to the command processor.
    fn submit(&mut self, list: CommandList);

    /// Blocks until every submitted list has executed.
    fn sync(&mut self, timeout: Duration) -> Result<(), DisplayError>;

    /// Blocks until the start of the next vertical blank.
    fn wait_vblank(&mut self);

    /// Flips draw and display buffers. Returns the VRAM address now being scanned out.
    fn swap_buffers(&mut self) -> u64;

    fn set_display_enabled(&mut self, enabled: bool);

    /// Writes back CPU cache lines covering `range` so the GPU observes the bytes.
    fn writeback_dcache(&mut self, range: &[u8]);

    fn vram(&self) -> &[u8];

    fn vram_mut(&mut self) -> &mut [u8];

    /// Tears down the graphics context.
    fn terminate(&mut self);
}

/// Convert a vblank refresh rate (Hz) into a vblank period in nanoseconds.
///
/// Returns `None` when vblank is disabled (`None` or `Some(0)`).
pub fn vblank_period_ns(vblank_hz: Option<u32>) -> Option<u64> {
    vblank_hz.and_then(|hz| {
        if hz == 0 {
            return None;
        }
        // Ceil division keeps 60 Hz at 16_666_667 ns.
        Some(1_000_000_000u64.div_ceil(hz as u64))
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct BufferBinding {
    region: VramRegion,
    pitch: u32,
}

/// In-memory stand-in for the graphics hardware.
///
/// Executes clears against its VRAM, keeps a log of everything it executed, and counts
/// vblanks, flips and cache writebacks. Sync timeouts can be injected.
#[derive(Debug)]
pub struct SimulatedGpu {
    vram: Vec<u8>,
    vblank_period_ns: Option<u64>,
    clock_ns: u64,

    initialized: bool,
    display_enabled: bool,
    pending: Vec<CommandList>,
    executed: Vec<GuCommand>,

    draw: Option<BufferBinding>,
    display: Option<BufferBinding>,
    depth: Option<BufferBinding>,
    viewport: (u32, u32),
    clear_color: [u8; 4],
    clear_depth: u16,

    vblanks: u64,
    swaps: u64,
    submits: u64,
    terminations: u64,
    writebacks: u64,
    writeback_bytes: u64,

    stalled_syncs: u32,
    fail_init: bool,
}

impl SimulatedGpu {
    pub fn new(vram_bytes: u64, vblank_hz: Option<u32>) -> Self {
        Self {
            vram: vec![0u8; vram_bytes as usize],
            vblank_period_ns: vblank_period_ns(vblank_hz),
            clock_ns: 0,
            initialized: false,
            display_enabled: false,
            pending: Vec::new(),
            executed: Vec::new(),
            draw: None,
            display: None,
            depth: None,
            viewport: (0, 0),
            clear_color: [0; 4],
            clear_depth: 0,
            vblanks: 0,
            swaps: 0,
            submits: 0,
            terminations: 0,
            writebacks: 0,
            writeback_bytes: 0,
            stalled_syncs: 0,
            fail_init: false,
        }
    }

    /// Makes the next `n` calls to `sync` time out.
    pub fn stall_syncs(&mut self, n: u32) {
        self.stalled_syncs = n;
    }

    /// Makes the next `init` fail.
    pub fn fail_next_init(&mut self) {
        self.fail_init = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn display_enabled(&self) -> bool {
        self.display_enabled
    }

    /// Every command executed so far, in order.
    pub fn executed(&self) -> &[GuCommand] {
        &self.executed
    }

    pub fn clear_executed(&mut self) {
        self.executed.clear();
    }

    pub fn vblanks(&self) -> u64 {
        self.vblanks
    }

    pub fn swaps(&self) -> u64 {
        self.swaps
    }

    pub fn submits(&self) -> u64 {
        self.submits
    }

    pub fn terminations(&self) -> u64 {
        self.terminations
    }

    pub fn writebacks(&self) -> (u64, u64) {
        (self.writebacks, self.writeback_bytes)
    }

    /// Simulated time advanced by vblank waits.
    pub fn clock(&self) -> Duration {
        Duration::from_nanos(self.clock_ns)
    }

    /// Address of the buffer currently scanned out.
    pub fn display_address(&self) -> Option<u64> {
        self.display.map(|b| b.region.address())
    }

    /// Address of the buffer the GPU currently renders into.
    pub fn draw_address(&self) -> Option<u64> {
        self.draw.map(|b| b.region.address())
    }

    fn execute(&mut self, cmd: GuCommand) {
        match &cmd {
            GuCommand::DrawBuffer { region, pitch } => {
                self.draw = Some(BufferBinding { region: *region, pitch: *pitch })
            }
            GuCommand::DisplayBuffer { region, pitch, .. } => {
                self.display = Some(BufferBinding { region: *region, pitch: *pitch })
            }
            GuCommand::DepthBuffer { region, pitch } => {
                self.depth = Some(BufferBinding { region: *region, pitch: *pitch })
            }
            GuCommand::Viewport { width, height } => self.viewport = (*width, *height),
            GuCommand::ClearColor(c) => self.clear_color = *c,
            GuCommand::ClearDepth(d) => self.clear_depth = *d,
            GuCommand::Clear(flags) => {
                if flags.contains(ClearFlags::COLOR) {
                    if let Some(draw) = self.draw {
                        let color = self.clear_color;
                        self.fill_buffer(draw, color);
                    }
                }
                if flags.contains(ClearFlags::DEPTH) {
                    if let Some(depth) = self.depth {
                        let [lo, hi] = self.clear_depth.to_le_bytes();
                        self.fill_raw(depth, &[lo, hi]);
                    }
                }
            }
            GuCommand::DepthRange { .. }
            | GuCommand::Scissor { .. }
            | GuCommand::Enable(_)
            | GuCommand::Disable(_) => {}
        }
        self.executed.push(cmd);
    }

    fn fill_buffer(&mut self, binding: BufferBinding, rgba: [u8; 4]) {
        let format = binding.region.format();
        let (encoded, bpp) = format.encode(rgba);
        self.fill_raw(binding, &encoded[..bpp]);
    }

    /// Fills the viewport rectangle of a bound buffer with a repeated pixel value.
    fn fill_raw(&mut self, binding: BufferBinding, pixel: &[u8]) {
        let bpp = pixel.len();
        let pitch_bytes = binding.pitch as usize * bpp;
        let (w, h) = self.viewport;
        let range = binding.region.range();
        let Some(buffer) = self.vram.get_mut(range) else {
            log::error!("SimulatedGpu: {:?} lies outside VRAM", binding.region);
            return;
        };
        for y in 0..h as usize {
            for x in 0..w.min(binding.pitch) as usize {
                let at = y * pitch_bytes + x * bpp;
                if let Some(dst) = buffer.get_mut(at..at + bpp) {
                    dst.copy_from_slice(pixel);
                }
            }
        }
    }
}

impl GuHardware for SimulatedGpu {
    fn vram_size(&self) -> u64 {
        self.vram.len() as u64
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        if self.fail_init {
            self.fail_init = false;
            return Err(DisplayError::SubsystemUnavailable("graphics context failed to start".to_string()));
        }
        self.initialized = true;
        self.pending.clear();
        self.draw = None;
        self.display = None;
        self.depth = None;
        Ok(())
    }

    fn submit(&mut self, list: CommandList) {
        self.submits += 1;
        self.pending.push(list);
    }

    fn sync(&mut self, timeout: Duration) -> Result<(), DisplayError> {
        if self.stalled_syncs > 0 {
            self.stalled_syncs -= 1;
            return Err(DisplayError::HardwareSyncTimeout { waited_ms: timeout.as_millis() as u64 });
        }
        let lists = std::mem::take(&mut self.pending);
        for list in lists {
            for cmd in list.commands {
                self.execute(cmd);
            }
        }
        Ok(())
    }

    fn wait_vblank(&mut self) {
        self.vblanks += 1;
        if let Some(period) = self.vblank_period_ns {
            // Advance to the next vblank boundary.
            self.clock_ns = (self.clock_ns / period + 1) * period;
        }
    }

    fn swap_buffers(&mut self) -> u64 {
        self.swaps += 1;
        if let (Some(draw), Some(display)) = (self.draw.as_mut(), self.display.as_mut()) {
            std::mem::swap(&mut draw.region, &mut display.region);
        }
        self.display_address().unwrap_or_default()
    }

    fn set_display_enabled(&mut self, enabled: bool) {
        self.display_enabled = enabled;
    }

    fn writeback_dcache(&mut self, range: &[u8]) {
        self.writebacks += 1;
        self.writeback_bytes += range.len() as u64;
    }

    fn vram(&self) -> &[u8] {
        &self.vram
    }

    fn vram_mut(&mut self) -> &mut [u8] {
        &mut self.vram
    }

    fn terminate(&mut self) {
        self.initialized = false;
        self.display_enabled = false;
        self.pending.clear();
        self.terminations += 1;
    }
}
