use parking_lot::Mutex;

/// A scrollable region whose offset the benchmark drives and samples.
///
/// Implementations bound to a UI thread must queue `scroll_to` onto that
/// thread rather than mutating from the caller's context. Reads are expected
/// to reflect the most recently applied offset.
pub trait ScrollSurface: Send + Sync {
    /// Current scroll offset in pixels.
    fn offset(&self) -> f64;

    /// Largest valid offset. Content that is still loading may grow this.
    fn max_extent(&self) -> f64;

    /// Request a new offset. Surfaces clamp into `[0, max_extent]` as well.
    fn scroll_to(&self, offset: f64);
}

/// Clamp a requested offset into the scrollable range.
pub fn clamp_offset(offset: f64, max_extent: f64) -> f64 {
    let upper = if max_extent.is_finite() {
        max_extent.max(0.0)
    } else {
        0.0
    };
    if offset.is_nan() {
        return 0.0;
    }
    offset.clamp(0.0, upper)
}

#[derive(Debug, Clone, Copy)]
struct SurfaceState {
    offset: f64,
    max_extent: f64,
    writes: u64,
}

/// In-memory surface used for headless benchmark runs.
#[derive(Debug)]
pub struct SimulatedSurface {
    state: Mutex<SurfaceState>,
}

impl SimulatedSurface {
    pub fn new(max_extent: f64) -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                offset: 0.0,
                max_extent,
                writes: 0,
            }),
        }
    }

    /// Grow or shrink the content, re-clamping the current offset.
    pub fn set_max_extent(&self, max_extent: f64) {
        let mut state = self.state.lock();
        state.max_extent = max_extent;
        state.offset = clamp_offset(state.offset, max_extent);
    }

    /// Number of offset writes applied so far.
    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }
}

impl ScrollSurface for SimulatedSurface {
    fn offset(&self) -> f64 {
        self.state.lock().offset
    }

    fn max_extent(&self) -> f64 {
        self.state.lock().max_extent
    }

    fn scroll_to(&self, offset: f64) {
        let mut state = self.state.lock();
        state.offset = clamp_offset(offset, state.max_extent);
        state.writes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_into_extent() {
        assert_eq!(clamp_offset(-5.0, 100.0), 0.0);
        assert_eq!(clamp_offset(150.0, 100.0), 100.0);
        assert_eq!(clamp_offset(42.0, 100.0), 42.0);
        assert_eq!(clamp_offset(f64::NAN, 100.0), 0.0);
        assert_eq!(clamp_offset(10.0, -1.0), 0.0);
    }

    #[test]
    fn simulated_surface_reclamps_when_content_shrinks() {
        let surface = SimulatedSurface::new(1000.0);
        surface.scroll_to(900.0);
        assert_eq!(surface.offset(), 900.0);
        surface.set_max_extent(500.0);
        assert_eq!(surface.offset(), 500.0);
        surface.scroll_to(2000.0);
        assert_eq!(surface.offset(), 500.0);
        assert_eq!(surface.write_count(), 2);
    }
}
