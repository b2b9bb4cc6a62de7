use std::fmt;

/// Per-device counters, accumulated from init until exit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub frames: u64,
    pub surfaces: u64,
    pub polygons: u64,
    pub tiles: u64,
    pub lines: u64,
    pub points: u64,
    /// Rasterizing draws the hardware path accepted without drawing.
    pub skipped_draws: u64,
    pub blits: u64,
    pub bytes_blitted: u64,
    pub sync_timeouts: u64,
}

impl DeviceStats {
    pub fn draw_calls(&self) -> u64 {
        self.surfaces + self.polygons + self.tiles + self.lines + self.points
    }

    /// Folds the counters of a delegated device into these.
    pub fn absorb(&mut self, other: &DeviceStats) {
        self.surfaces += other.surfaces;
        self.polygons += other.polygons;
        self.tiles += other.tiles;
        self.lines += other.lines;
        self.points += other.points;
    }
}

impl fmt::Display for DeviceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames={} draws={} (surf={} poly={} tile={} line={} point={}) skipped={} blits={} ({} bytes) sync_timeouts={}",
            self.frames,
            self.draw_calls(),
            self.surfaces,
            self.polygons,
            self.tiles,
            self.lines,
            self.points,
            self.skipped_draws,
            self.blits,
            self.bytes_blitted,
            self.sync_timeouts
        )
    }
}
