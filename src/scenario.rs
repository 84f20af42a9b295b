use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::surface::{ScrollSurface, clamp_offset};

/// Seed for [`JumpSequence`]; fixed so trajectories repeat across runs.
pub const JUMP_SEED: u64 = 42;

const WHEEL_MARGIN: f64 = 10.0;
const TOUCHSCREEN_MARGIN: f64 = 100.0;

const FAST_SCROLL_STEP: f64 = 300.0;
const FAST_SCROLL_PERIOD: Duration = Duration::from_millis(16);
const SLOW_SCROLL_STEP: f64 = 40.0;
const SLOW_SCROLL_PERIOD: Duration = Duration::from_millis(80);
const JUMP_PERIOD: Duration = Duration::from_millis(200);
const TOUCHPAD_PERIOD: Duration = Duration::from_millis(8);
const TOUCHPAD_PHASE_STEP: f64 = 0.05;

const FLICK_VELOCITY: f64 = 800.0;
const FLICK_FRAME: Duration = Duration::from_millis(16);
const FLICK_FRAME_SECS: f64 = 0.016;
const FLICK_DECAY: f64 = 0.95;
const FLICK_REST_VELOCITY: f64 = 2.0;
const FLICK_PAUSE: Duration = Duration::from_millis(300);

const EDGE_FLICK_STEPS: u32 = 30;
const EDGE_FLICK_PAUSE: Duration = Duration::from_millis(500);

/// Named scroll motion patterns.
///
/// Every scenario reads the surface afresh on each step, clamps its target
/// into range before writing, and checks cancellation before each write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrollScenario {
    FastScroll,
    SlowScroll,
    Jump,
    Touchpad,
    Touchscreen,
    Flick,
    Mixed,
}

/// Every scenario in report order; `mixed` last.
pub const ALL_SCENARIOS: &[ScrollScenario] = &[
    ScrollScenario::FastScroll,
    ScrollScenario::SlowScroll,
    ScrollScenario::Jump,
    ScrollScenario::Touchpad,
    ScrollScenario::Touchscreen,
    ScrollScenario::Flick,
    ScrollScenario::Mixed,
];

/// Segment order used by [`ScrollScenario::Mixed`].
pub const MIXED_SEQUENCE: &[ScrollScenario] = &[
    ScrollScenario::FastScroll,
    ScrollScenario::SlowScroll,
    ScrollScenario::Touchpad,
    ScrollScenario::Touchscreen,
    ScrollScenario::Jump,
    ScrollScenario::Flick,
];

/// How a scenario run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum Motion {
    FastWheel,
    SlowWheel,
    Jump,
    Touchpad,
    Touchscreen,
    EdgeFlick,
}

impl ScrollScenario {
    pub fn name(&self) -> &'static str {
        match self {
            ScrollScenario::FastScroll => "fast-scroll",
            ScrollScenario::SlowScroll => "slow-scroll",
            ScrollScenario::Jump => "jump",
            ScrollScenario::Touchpad => "touchpad",
            ScrollScenario::Touchscreen => "touchscreen",
            ScrollScenario::Flick => "flick",
            ScrollScenario::Mixed => "mixed",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScrollScenario::FastScroll => "Rapid mouse-wheel scrolling, 300px every 16ms.",
            ScrollScenario::SlowScroll => "Gentle mouse-wheel scrolling, 40px every 80ms.",
            ScrollScenario::Jump => "Scrollbar drags to seeded random offsets every 200ms.",
            ScrollScenario::Touchpad => "High-rate touchpad deltas with smooth acceleration.",
            ScrollScenario::Touchscreen => "Inertial touch flicks decaying to rest.",
            ScrollScenario::Flick => "Interpolated edge-to-edge flicks over 30 frames.",
            ScrollScenario::Mixed => "Every motion pattern in equal consecutive slices.",
        }
    }

    fn motion(self) -> Option<Motion> {
        match self {
            ScrollScenario::FastScroll => Some(Motion::FastWheel),
            ScrollScenario::SlowScroll => Some(Motion::SlowWheel),
            ScrollScenario::Jump => Some(Motion::Jump),
            ScrollScenario::Touchpad => Some(Motion::Touchpad),
            ScrollScenario::Touchscreen => Some(Motion::Touchscreen),
            ScrollScenario::Flick => Some(Motion::EdgeFlick),
            ScrollScenario::Mixed => None,
        }
    }

    /// Drive `surface` for `duration`, returning early on cancellation.
    pub async fn run(
        &self,
        surface: &dyn ScrollSurface,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> ScenarioOutcome {
        debug!(scenario = self.name(), duration_ms = duration.as_millis() as u64, "scenario starting");
        let outcome = match self.motion() {
            Some(motion) => motion.run(surface, Instant::now() + duration, cancel).await,
            None => run_mixed(surface, duration, cancel).await,
        };
        debug!(scenario = self.name(), ?outcome, "scenario finished");
        outcome
    }
}

impl fmt::Display for ScrollScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Look up a single scenario by name, case-insensitively.
pub fn find_scenario(name: &str) -> Option<ScrollScenario> {
    let needle = name.trim();
    if needle.is_empty() {
        return None;
    }
    ALL_SCENARIOS
        .iter()
        .copied()
        .find(|scenario| scenario.name().eq_ignore_ascii_case(needle))
}

/// Resolve a selection string: `all`, a scenario name, or anything else,
/// which falls back to `mixed`.
pub fn select_scenarios(selection: &str) -> Vec<ScrollScenario> {
    if selection.trim().eq_ignore_ascii_case("all") {
        return ALL_SCENARIOS.to_vec();
    }
    vec![find_scenario(selection).unwrap_or(ScrollScenario::Mixed)]
}

/// Seeded source of jump targets.
#[derive(Debug, Clone)]
pub struct JumpSequence {
    rng: StdRng,
}

impl JumpSequence {
    pub fn new() -> Self {
        Self::with_seed(JUMP_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_target(&mut self, max_extent: f64) -> f64 {
        clamp_offset(self.rng.random::<f64>() * max_extent, max_extent)
    }
}

impl Default for JumpSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until `period` elapses (clipped to `deadline`). False if cancelled.
async fn pace(cancel: &CancellationToken, period: Duration, deadline: Instant) -> bool {
    let wake = (Instant::now() + period).min(deadline);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep_until(wake) => true,
    }
}

fn keep_going(cancel: &CancellationToken, deadline: Instant) -> Option<ScenarioOutcome> {
    if cancel.is_cancelled() {
        Some(ScenarioOutcome::Cancelled)
    } else if Instant::now() >= deadline {
        Some(ScenarioOutcome::Completed)
    } else {
        None
    }
}

/// Flip `direction` when the offset is within `margin` of an extent.
fn bounce(direction: f64, offset: f64, max_extent: f64, margin: f64) -> f64 {
    if offset >= max_extent - margin {
        -1.0
    } else if offset <= margin {
        1.0
    } else {
        direction
    }
}

fn write(surface: &dyn ScrollSurface, target: f64) {
    surface.scroll_to(clamp_offset(target, surface.max_extent()));
}

impl Motion {
    async fn run(
        self,
        surface: &dyn ScrollSurface,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> ScenarioOutcome {
        match self {
            Motion::FastWheel => {
                wheel(surface, deadline, cancel, FAST_SCROLL_PERIOD, || FAST_SCROLL_STEP).await
            }
            Motion::SlowWheel => {
                wheel(surface, deadline, cancel, SLOW_SCROLL_PERIOD, || SLOW_SCROLL_STEP).await
            }
            Motion::Touchpad => {
                let mut phase = 0.0_f64;
                wheel(surface, deadline, cancel, TOUCHPAD_PERIOD, move || {
                    let step = 5.0 + 15.0 * phase.sin().abs();
                    phase += TOUCHPAD_PHASE_STEP;
                    step
                })
                .await
            }
            Motion::Jump => jump(surface, deadline, cancel).await,
            Motion::Touchscreen => touchscreen(surface, deadline, cancel).await,
            Motion::EdgeFlick => edge_flick(surface, deadline, cancel).await,
        }
    }
}

async fn wheel(
    surface: &dyn ScrollSurface,
    deadline: Instant,
    cancel: &CancellationToken,
    period: Duration,
    mut step: impl FnMut() -> f64,
) -> ScenarioOutcome {
    let mut direction = 1.0;
    loop {
        if let Some(outcome) = keep_going(cancel, deadline) {
            return outcome;
        }
        let offset = surface.offset();
        direction = bounce(direction, offset, surface.max_extent(), WHEEL_MARGIN);
        write(surface, offset + direction * step());
        if !pace(cancel, period, deadline).await {
            return ScenarioOutcome::Cancelled;
        }
    }
}

async fn jump(
    surface: &dyn ScrollSurface,
    deadline: Instant,
    cancel: &CancellationToken,
) -> ScenarioOutcome {
    let mut targets = JumpSequence::new();
    loop {
        if let Some(outcome) = keep_going(cancel, deadline) {
            return outcome;
        }
        write(surface, targets.next_target(surface.max_extent()));
        if !pace(cancel, JUMP_PERIOD, deadline).await {
            return ScenarioOutcome::Cancelled;
        }
    }
}

async fn touchscreen(
    surface: &dyn ScrollSurface,
    deadline: Instant,
    cancel: &CancellationToken,
) -> ScenarioOutcome {
    // Finger direction: swiping up (negative) moves content forward.
    let mut finger = -1.0;
    loop {
        if let Some(outcome) = keep_going(cancel, deadline) {
            return outcome;
        }
        let offset = surface.offset();
        let max_extent = surface.max_extent();
        if offset >= max_extent - TOUCHSCREEN_MARGIN {
            finger = 1.0;
        } else if offset <= TOUCHSCREEN_MARGIN {
            finger = -1.0;
        }

        let mut velocity = FLICK_VELOCITY * finger;
        while velocity.abs() >= FLICK_REST_VELOCITY {
            if let Some(outcome) = keep_going(cancel, deadline) {
                return outcome;
            }
            write(surface, surface.offset() - velocity * FLICK_FRAME_SECS);
            velocity *= FLICK_DECAY;
            if !pace(cancel, FLICK_FRAME, deadline).await {
                return ScenarioOutcome::Cancelled;
            }
        }

        if !pace(cancel, FLICK_PAUSE, deadline).await {
            return ScenarioOutcome::Cancelled;
        }
    }
}

async fn edge_flick(
    surface: &dyn ScrollSurface,
    deadline: Instant,
    cancel: &CancellationToken,
) -> ScenarioOutcome {
    let mut toward_end = surface.offset() < surface.max_extent() / 2.0;
    loop {
        if let Some(outcome) = keep_going(cancel, deadline) {
            return outcome;
        }
        let start = surface.offset();
        let target = if toward_end { surface.max_extent() } else { 0.0 };
        let steps = f64::from(EDGE_FLICK_STEPS);
        for step in 1..=EDGE_FLICK_STEPS {
            if let Some(outcome) = keep_going(cancel, deadline) {
                return outcome;
            }
            write(surface, start + (target - start) * f64::from(step) / steps);
            if !pace(cancel, FLICK_FRAME, deadline).await {
                return ScenarioOutcome::Cancelled;
            }
        }
        if !pace(cancel, EDGE_FLICK_PAUSE, deadline).await {
            return ScenarioOutcome::Cancelled;
        }
        toward_end = !toward_end;
    }
}

async fn run_mixed(
    surface: &dyn ScrollSurface,
    duration: Duration,
    cancel: &CancellationToken,
) -> ScenarioOutcome {
    let segment = Duration::from_nanos((duration.as_nanos() / MIXED_SEQUENCE.len() as u128) as u64);
    for scenario in MIXED_SEQUENCE {
        let Some(motion) = scenario.motion() else {
            continue;
        };
        if cancel.is_cancelled() {
            return ScenarioOutcome::Cancelled;
        }
        debug!(segment = scenario.name(), "mixed segment");
        if motion.run(surface, Instant::now() + segment, cancel).await == ScenarioOutcome::Cancelled {
            return ScenarioOutcome::Cancelled;
        }
    }
    ScenarioOutcome::Completed
}
