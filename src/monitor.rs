use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::frame_clock::FrameClock;
use crate::stats::{FrameStatistics, NOISE_FLOOR_MS, ReducerSettings, SampleSet, compute_statistics};
use crate::surface::ScrollSurface;

/// Sampling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSettings {
    /// Nominal update tick; the achieved rate is whatever the runtime delivers.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
}

fn default_update_interval_ms() -> u64 {
    1
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
        }
    }
}

#[derive(Debug, Default)]
struct SampleBuffers {
    update_deltas: Vec<f64>,
    render_frame_deltas: Vec<f64>,
    scroll_deltas: Vec<f64>,
    scroll_time_deltas: Vec<f64>,
    update_count: u64,
    render_frame_count: u64,
    last_update_ms: Option<f64>,
    last_frame_ms: Option<f64>,
    last_offset: f64,
}

struct MonitorShared {
    running: AtomicBool,
    generation: AtomicU64,
    buffers: Mutex<SampleBuffers>,
}

impl MonitorShared {
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }

    fn record_update(&self, generation: u64, now_ms: f64, offset: Option<f64>) {
        if !self.is_current(generation) {
            return;
        }
        let mut buffers = self.buffers.lock();
        match buffers.last_update_ms {
            None => {
                buffers.last_update_ms = Some(now_ms);
                buffers.update_count += 1;
                if let Some(offset) = offset {
                    buffers.last_offset = offset;
                }
            }
            Some(last) => {
                let delta = now_ms - last;
                if delta <= NOISE_FLOOR_MS {
                    return;
                }
                buffers.last_update_ms = Some(now_ms);
                buffers.update_count += 1;
                buffers.update_deltas.push(delta);
                if let Some(offset) = offset {
                    let moved = (offset - buffers.last_offset).abs();
                    buffers.scroll_deltas.push(moved);
                    buffers.scroll_time_deltas.push(delta);
                    buffers.last_offset = offset;
                }
            }
        }
    }

    /// Returns whether the frame loop should keep going.
    fn record_frame(&self, generation: u64, elapsed_ms: f64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        let mut buffers = self.buffers.lock();
        match buffers.last_frame_ms {
            None => {
                buffers.last_frame_ms = Some(elapsed_ms);
                buffers.render_frame_count += 1;
            }
            Some(last) => {
                let delta = elapsed_ms - last;
                if delta > NOISE_FLOOR_MS {
                    buffers.last_frame_ms = Some(elapsed_ms);
                    buffers.render_frame_count += 1;
                    buffers.render_frame_deltas.push(delta);
                }
            }
        }
        true
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

fn schedule_frame(shared: Arc<MonitorShared>, clock: Arc<dyn FrameClock>, generation: u64) {
    let next_clock = Arc::clone(&clock);
    clock.request_frame(Box::new(move |elapsed| {
        if shared.record_frame(generation, millis(elapsed)) {
            schedule_frame(shared, next_clock, generation);
        }
    }));
}

/// Owned copy of a monitor's buffers taken after it stopped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorSamples {
    pub update_deltas: Vec<f64>,
    pub render_frame_deltas: Vec<f64>,
    pub scroll_deltas: Vec<f64>,
    pub scroll_time_deltas: Vec<f64>,
    pub update_count: u64,
    pub render_frame_count: u64,
    pub duration: Duration,
}

impl MonitorSamples {
    pub fn as_sample_set(&self) -> SampleSet<'_> {
        SampleSet {
            update_deltas: &self.update_deltas,
            render_frame_deltas: &self.render_frame_deltas,
            scroll_deltas: &self.scroll_deltas,
            scroll_time_deltas: &self.scroll_time_deltas,
            update_count: self.update_count,
            render_frame_count: self.render_frame_count,
            duration: self.duration,
        }
    }

    pub fn statistics(&self, scenario_name: &str, settings: &ReducerSettings) -> FrameStatistics {
        compute_statistics(scenario_name, &self.as_sample_set(), settings)
    }
}

/// Samples update-tick and frame-callback cadence for one scenario run.
///
/// The update loop is a tokio interval on the current runtime. The frame loop
/// rides on a [`FrameClock`] and re-registers itself from inside its own
/// callback while the monitor is running.
pub struct FrameMonitor {
    shared: Arc<MonitorShared>,
    clock: Arc<dyn FrameClock>,
    offset_source: Option<Arc<dyn ScrollSurface>>,
    settings: MonitorSettings,
    started_at: Option<Instant>,
    stopped_after: Option<Duration>,
    update_task: Option<JoinHandle<()>>,
}

impl FrameMonitor {
    pub fn new(clock: Arc<dyn FrameClock>, settings: MonitorSettings) -> Self {
        Self {
            shared: Arc::new(MonitorShared {
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                buffers: Mutex::new(SampleBuffers::default()),
            }),
            clock,
            offset_source: None,
            settings,
            started_at: None,
            stopped_after: None,
            update_task: None,
        }
    }

    /// Also record scroll distance per update tick from `surface`.
    pub fn track_offset(mut self, surface: Arc<dyn ScrollSurface>) -> Self {
        self.offset_source = Some(surface);
        self
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Reset all buffers and begin sampling. No-op while already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        *self.shared.buffers.lock() = SampleBuffers::default();
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let started_at = Instant::now();
        self.started_at = Some(started_at);
        self.stopped_after = None;
        self.shared.running.store(true, Ordering::Release);

        let interval = Duration::from_millis(self.settings.update_interval_ms.max(1));
        let shared = Arc::clone(&self.shared);
        let offset_source = self.offset_source.clone();
        self.update_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now_ms = millis(started_at.elapsed());
                let offset = offset_source.as_ref().map(|surface| surface.offset());
                shared.record_update(generation, now_ms, offset);
            }
        }));

        schedule_frame(Arc::clone(&self.shared), Arc::clone(&self.clock), generation);
        debug!(generation, interval_ms = self.settings.update_interval_ms, "frame monitor started");
    }

    /// Halt both sampling loops. Buffers are left intact.
    ///
    /// The update timer is aborted directly; a frame callback already in
    /// flight observes the cleared flag and neither records nor re-registers.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.shared.running.store(false, Ordering::Release);
        if let Some(task) = self.update_task.take() {
            task.abort();
        }
        self.stopped_after = self.started_at.map(|started| started.elapsed());

        let buffers = self.shared.buffers.lock();
        debug!(
            updates = buffers.update_count,
            frames = buffers.render_frame_count,
            "frame monitor stopped"
        );
    }

    /// Copy of the recorded buffers.
    pub fn samples(&self) -> MonitorSamples {
        let duration = match (self.stopped_after, self.started_at) {
            (Some(duration), _) => duration,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        };
        let buffers = self.shared.buffers.lock();
        MonitorSamples {
            update_deltas: buffers.update_deltas.clone(),
            render_frame_deltas: buffers.render_frame_deltas.clone(),
            scroll_deltas: buffers.scroll_deltas.clone(),
            scroll_time_deltas: buffers.scroll_time_deltas.clone(),
            update_count: buffers.update_count,
            render_frame_count: buffers.render_frame_count,
            duration,
        }
    }

    /// Reduce the recorded samples. Intended for use after [`Self::stop`].
    pub fn statistics(&self, scenario_name: &str, settings: &ReducerSettings) -> FrameStatistics {
        if self.is_running() {
            warn!(scenario = scenario_name, "statistics requested while monitor is still sampling");
        }
        self.samples().statistics(scenario_name, settings)
    }
}

impl Drop for FrameMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
