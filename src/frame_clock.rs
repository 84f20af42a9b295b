use std::mem;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::{Instant, sleep_until};
use tracing::warn;

/// Invoked with the monotonic timestamp of the presented frame.
pub type FrameCallback = Box<dyn FnOnce(Duration) + Send + 'static>;

/// Source of single-shot "next frame" notifications.
///
/// Compositor frame APIs fire a callback once for the next presented frame,
/// after which it has to be registered again. Hosts with persistent frame
/// events adapt by holding the callback until their next frame event.
pub trait FrameClock: Send + Sync {
    /// Register `callback` for the next frame only.
    fn request_frame(&self, callback: FrameCallback);
}

/// Refresh rates accepted by [`VsyncClock`]; values outside are clamped.
pub const MIN_REFRESH_HZ: f64 = 1.0;
pub const MAX_REFRESH_HZ: f64 = 1000.0;

/// Timer-driven clock emitting frames on fixed refresh boundaries.
///
/// Requires a tokio runtime; requests made outside one are dropped. A
/// non-finite or non-positive rate falls back to 60Hz.
#[derive(Debug)]
pub struct VsyncClock {
    epoch: Instant,
    period: Duration,
}

impl VsyncClock {
    pub fn new(refresh_hz: f64) -> Self {
        let hz = if refresh_hz.is_finite() && refresh_hz > 0.0 {
            refresh_hz.clamp(MIN_REFRESH_HZ, MAX_REFRESH_HZ)
        } else {
            60.0
        };
        if hz != refresh_hz {
            warn!(requested = refresh_hz, using = hz, "refresh rate out of range");
        }
        Self {
            epoch: Instant::now(),
            period: Duration::from_secs_f64(1.0 / hz),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    fn next_boundary(&self, now: Instant) -> Duration {
        let since = now.saturating_duration_since(self.epoch);
        let period_nanos = self.period.as_nanos().max(1);
        let ticks = since.as_nanos() / period_nanos + 1;
        Duration::from_nanos((ticks * period_nanos) as u64)
    }
}

impl FrameClock for VsyncClock {
    fn request_frame(&self, callback: FrameCallback) {
        let Ok(handle) = Handle::try_current() else {
            warn!("frame requested outside a tokio runtime; dropping callback");
            return;
        };
        let offset = self.next_boundary(Instant::now());
        let deadline = self.epoch + offset;
        handle.spawn(async move {
            sleep_until(deadline).await;
            callback(offset);
        });
    }
}

/// Clock driven by the host calling [`PumpedFrameClock::pump`] once per frame.
#[derive(Default)]
pub struct PumpedFrameClock {
    pending: Mutex<Vec<FrameCallback>>,
}

impl PumpedFrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one frame to every registered callback. Callbacks that
    /// re-register are queued for the following pump. Returns how many fired.
    pub fn pump(&self, elapsed: Duration) -> usize {
        let due = mem::take(&mut *self.pending.lock());
        let fired = due.len();
        for callback in due {
            callback(elapsed);
        }
        fired
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

impl FrameClock for PumpedFrameClock {
    fn request_frame(&self, callback: FrameCallback) {
        self.pending.lock().push(callback);
    }
}
