use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deltas at or below this many milliseconds are treated as clock noise.
pub const NOISE_FLOOR_MS: f64 = 0.5;

/// Render deltas above `median * DROPPED_FRAME_FACTOR` count as dropped.
pub const DROPPED_FRAME_FACTOR: f64 = 1.5;

/// Jank threshold multiplier applied to the median render delta.
pub const JANK_FACTOR: f64 = 2.0;

/// Lowest jank threshold, in milliseconds, regardless of refresh rate.
pub const JANK_FLOOR_MS: f64 = 33.3;

/// Tunables for the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReducerSettings {
    /// Milliseconds discarded at each edge of a run.
    #[serde(default = "default_trim_ms")]
    pub trim_ms: f64,
    /// Window length for min/max rate computation.
    #[serde(default = "default_window_ms")]
    pub window_ms: f64,
}

fn default_trim_ms() -> f64 {
    250.0
}

fn default_window_ms() -> f64 {
    500.0
}

impl Default for ReducerSettings {
    fn default() -> Self {
        Self {
            trim_ms: default_trim_ms(),
            window_ms: default_window_ms(),
        }
    }
}

/// Borrowed view over a monitor's sample buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleSet<'a> {
    pub update_deltas: &'a [f64],
    pub render_frame_deltas: &'a [f64],
    pub scroll_deltas: &'a [f64],
    pub scroll_time_deltas: &'a [f64],
    pub update_count: u64,
    pub render_frame_count: u64,
    pub duration: Duration,
}

/// Summary of one scenario iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStatistics {
    pub scenario_name: String,
    pub duration_ms: f64,

    pub total_updates: u64,
    pub avg_ups: f64,
    pub min_ups: f64,
    pub max_ups: f64,
    pub avg_update_time_ms: f64,
    pub p50_update_time_ms: f64,
    pub p90_update_time_ms: f64,
    pub p95_update_time_ms: f64,
    pub p99_update_time_ms: f64,
    pub update_time_std_dev_ms: f64,

    pub total_render_frames: u64,
    pub avg_render_fps: f64,
    pub min_render_fps: f64,
    pub max_render_fps: f64,
    pub avg_render_frame_time_ms: f64,
    pub p50_render_frame_time_ms: f64,
    pub p90_render_frame_time_ms: f64,
    pub p99_render_frame_time_ms: f64,
    pub dropped_frames: u64,

    pub jank_frames: u64,
    pub jank_percentage: f64,
    pub jank_threshold_ms: f64,

    pub avg_scroll_velocity: f64,
    pub max_scroll_velocity: f64,
}

impl FrameStatistics {
    /// Record for a run that produced no usable samples.
    pub fn empty(scenario_name: &str) -> Self {
        Self {
            scenario_name: scenario_name.to_string(),
            ..Self::default()
        }
    }

    pub fn has_data(&self) -> bool {
        self.total_updates > 0
    }
}

/// Index range that survives trimming `trim_ms` from both edges.
///
/// Leading samples whose running sum stays below `trim_ms` are dropped, and
/// likewise from the tail. Short buffers, and trims that would consume the
/// whole buffer, yield the full range.
pub fn trim_range(deltas: &[f64], trim_ms: f64) -> Range<usize> {
    let full = 0..deltas.len();
    if deltas.len() < 3 {
        return full;
    }

    let mut start = 0;
    let mut acc = 0.0;
    for (index, delta) in deltas.iter().enumerate() {
        acc += delta;
        if acc < trim_ms {
            start = index + 1;
        } else {
            break;
        }
    }

    let mut end = deltas.len();
    acc = 0.0;
    for (index, delta) in deltas.iter().enumerate().rev() {
        acc += delta;
        if acc < trim_ms {
            end = index;
        } else {
            break;
        }
    }

    if end <= start { full } else { start..end }
}

/// Slice of `deltas` with startup and teardown transients removed.
pub fn trim_edges(deltas: &[f64], trim_ms: f64) -> &[f64] {
    &deltas[trim_range(deltas, trim_ms)]
}

/// Nearest-rank percentile over an ascending slice; 0 when empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let last = sorted.len() - 1;
    let rank = (p / 100.0 * sorted.len() as f64).ceil() - 1.0;
    let index = if rank <= 0.0 {
        0
    } else {
        (rank as usize).min(last)
    };
    sorted[index]
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 below two samples.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let sum_sq: f64 = values.iter().map(|value| (value - avg).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Rate extremes over consecutive windows of at least `window_ms`.
///
/// Deltas at or below the noise floor are skipped. A trailing partial window
/// is discarded. Returns `(min, max)` events per second, or `(0, 0)` when no
/// complete window exists.
pub fn windowed_min_max_rate(deltas: &[f64], window_ms: f64) -> (f64, f64) {
    let usable = deltas.iter().filter(|delta| **delta > NOISE_FLOOR_MS).count();
    if usable < 2 {
        return (0.0, 0.0);
    }

    let mut min = f64::INFINITY;
    let mut max = 0.0_f64;
    let mut sum = 0.0;
    let mut count = 0_u32;
    let mut windows = 0_u32;

    for &delta in deltas {
        if delta <= NOISE_FLOOR_MS {
            continue;
        }
        sum += delta;
        count += 1;
        if sum >= window_ms {
            let rate = f64::from(count) / (sum / 1000.0);
            min = min.min(rate);
            max = max.max(rate);
            windows += 1;
            sum = 0.0;
            count = 0;
        }
    }

    if windows == 0 { (0.0, 0.0) } else { (min, max) }
}

fn sorted_above_floor(deltas: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = deltas
        .iter()
        .copied()
        .filter(|delta| *delta > NOISE_FLOOR_MS)
        .collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

fn count_above(sorted: &[f64], threshold: f64) -> u64 {
    sorted.iter().filter(|delta| **delta > threshold).count() as u64
}

/// `(average, p99 of non-zero)` pixels per second over paired samples.
pub fn scroll_velocity(scroll_deltas: &[f64], time_deltas: &[f64]) -> (f64, f64) {
    let velocities: Vec<f64> = scroll_deltas
        .iter()
        .zip(time_deltas)
        .filter(|(_, time_ms)| **time_ms > NOISE_FLOOR_MS)
        .map(|(pixels, time_ms)| pixels / (time_ms / 1000.0))
        .collect();
    if velocities.is_empty() {
        return (0.0, 0.0);
    }

    let mut moving: Vec<f64> = velocities.iter().copied().filter(|v| *v > 0.0).collect();
    moving.sort_by(f64::total_cmp);
    (mean(&velocities), percentile(&moving, 99.0))
}

/// Reduce one run's samples to a statistics record. Pure function of its input.
pub fn compute_statistics(
    scenario_name: &str,
    samples: &SampleSet<'_>,
    settings: &ReducerSettings,
) -> FrameStatistics {
    let updates = trim_edges(samples.update_deltas, settings.trim_ms);
    let sorted_updates = sorted_above_floor(updates);
    if sorted_updates.is_empty() {
        return FrameStatistics::empty(scenario_name);
    }

    let renders = trim_edges(samples.render_frame_deltas, settings.trim_ms);
    let sorted_renders = sorted_above_floor(renders);

    let paired = samples
        .scroll_deltas
        .len()
        .min(samples.scroll_time_deltas.len());
    let scroll_range = trim_range(&samples.scroll_time_deltas[..paired], settings.trim_ms);
    let (avg_scroll_velocity, max_scroll_velocity) = scroll_velocity(
        &samples.scroll_deltas[scroll_range.clone()],
        &samples.scroll_time_deltas[scroll_range],
    );

    let avg_update_time_ms = mean(updates);
    let (min_ups, max_ups) = windowed_min_max_rate(updates, settings.window_ms);

    let avg_render_frame_time_ms = mean(&sorted_renders);
    let avg_render_fps = if avg_render_frame_time_ms > 0.0 {
        1000.0 / avg_render_frame_time_ms
    } else {
        0.0
    };
    let (min_render_fps, max_render_fps) = windowed_min_max_rate(renders, settings.window_ms);

    let (dropped_frames, jank_frames, jank_percentage, jank_threshold_ms) =
        if sorted_renders.is_empty() {
            (0, 0, 0.0, 0.0)
        } else {
            let median = percentile(&sorted_renders, 50.0);
            let threshold = (JANK_FACTOR * median).max(JANK_FLOOR_MS);
            let jank = count_above(&sorted_renders, threshold);
            (
                count_above(&sorted_renders, DROPPED_FRAME_FACTOR * median),
                jank,
                jank as f64 / sorted_renders.len() as f64 * 100.0,
                threshold,
            )
        };

    FrameStatistics {
        scenario_name: scenario_name.to_string(),
        duration_ms: samples.duration.as_secs_f64() * 1000.0,
        total_updates: samples.update_count,
        avg_ups: 1000.0 / avg_update_time_ms,
        min_ups,
        max_ups,
        avg_update_time_ms,
        p50_update_time_ms: percentile(&sorted_updates, 50.0),
        p90_update_time_ms: percentile(&sorted_updates, 90.0),
        p95_update_time_ms: percentile(&sorted_updates, 95.0),
        p99_update_time_ms: percentile(&sorted_updates, 99.0),
        update_time_std_dev_ms: std_dev(&sorted_updates),
        total_render_frames: samples.render_frame_count,
        avg_render_fps,
        min_render_fps,
        max_render_fps,
        avg_render_frame_time_ms,
        p50_render_frame_time_ms: percentile(&sorted_renders, 50.0),
        p90_render_frame_time_ms: percentile(&sorted_renders, 90.0),
        p99_render_frame_time_ms: percentile(&sorted_renders, 99.0),
        dropped_frames,
        jank_frames,
        jank_percentage,
        jank_threshold_ms,
        avg_scroll_velocity,
        max_scroll_velocity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentile_uses_nearest_rank() {
        let values = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&values, 50.0), 30.0);
        assert_eq!(percentile(&values, 90.0), 50.0);
        assert_eq!(percentile(&values, 0.0), 10.0);
        assert_eq!(percentile(&values, 100.0), 50.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn trim_leaves_short_buffers_alone() {
        assert_eq!(trim_edges(&[100.0, 200.0], 250.0), &[100.0, 200.0]);
        assert_eq!(trim_edges(&[], 250.0), &[] as &[f64]);
    }

    #[test]
    fn trim_drops_edges_below_threshold() {
        let deltas = [100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0];
        // Two leading samples sum to 200 (< 250), the third reaches 300.
        assert_eq!(trim_range(&deltas, 250.0), 2..6);
    }

    #[test]
    fn trim_never_consumes_everything() {
        let deltas = [10.0, 10.0, 10.0, 10.0];
        assert_eq!(trim_edges(&deltas, 250.0), &deltas);
    }

    #[test]
    fn windowed_rate_of_constant_input() {
        let deltas = vec![16.0; 200];
        let (min, max) = windowed_min_max_rate(&deltas, 500.0);
        assert!(close(min, 1000.0 / 16.0));
        assert!(close(max, 1000.0 / 16.0));
    }

    #[test]
    fn windowed_rate_ignores_trailing_partial_window() {
        // One full 500ms window at 10ms, then a short slow tail.
        let mut deltas = vec![10.0; 50];
        deltas.extend([100.0, 100.0]);
        let (min, max) = windowed_min_max_rate(&deltas, 500.0);
        assert!(close(min, 100.0));
        assert!(close(max, 100.0));
    }

    #[test]
    fn windowed_rate_absorbs_single_outlier() {
        let mut deltas = vec![10.0; 100];
        deltas[25] = 60.0;
        let (min, max) = windowed_min_max_rate(&deltas, 500.0);
        assert!(min > 80.0, "outlier should be averaged into its window, got {min}");
        assert!(close(max, 100.0));
    }

    #[test]
    fn windowed_rate_needs_two_samples() {
        assert_eq!(windowed_min_max_rate(&[600.0], 500.0), (0.0, 0.0));
        assert_eq!(windowed_min_max_rate(&[0.2, 0.3, 600.0], 500.0), (0.0, 0.0));
    }

    #[test]
    fn std_dev_uses_sample_denominator() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close(std_dev(&values), (32.0_f64 / 7.0).sqrt()));
        assert_eq!(std_dev(&[3.0]), 0.0);
    }

    #[test]
    fn velocity_average_includes_idle_ticks() {
        let scroll = [0.0, 10.0, 0.0, 20.0];
        let time = [10.0, 10.0, 10.0, 0.2];
        let (avg, peak) = scroll_velocity(&scroll, &time);
        // 0.2ms tick is ignored; remaining velocities are 0, 1000, 0.
        assert!(close(avg, 1000.0 / 3.0));
        assert!(close(peak, 1000.0));
    }

    fn uniform_samples(render: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (vec![1.0; 5000], render.to_vec())
    }

    #[test]
    fn dropped_and_jank_grow_by_one_for_single_spike() {
        let mut render = vec![16.0; 300];
        let (updates, base) = uniform_samples(&render);
        let settings = ReducerSettings {
            trim_ms: 0.0,
            window_ms: 500.0,
        };
        let before = compute_statistics(
            "spike",
            &SampleSet {
                update_deltas: &updates,
                render_frame_deltas: &base,
                update_count: updates.len() as u64 + 1,
                render_frame_count: base.len() as u64 + 1,
                ..SampleSet::default()
            },
            &settings,
        );
        render.push(160.0);
        let after = compute_statistics(
            "spike",
            &SampleSet {
                update_deltas: &updates,
                render_frame_deltas: &render,
                update_count: updates.len() as u64 + 1,
                render_frame_count: render.len() as u64 + 1,
                ..SampleSet::default()
            },
            &settings,
        );
        assert_eq!(after.dropped_frames, before.dropped_frames + 1);
        assert_eq!(after.jank_frames, before.jank_frames + 1);
        assert!(close(after.jank_threshold_ms, 33.3));
    }

    #[test]
    fn update_mean_keeps_sub_floor_deltas() {
        let updates = [2.0, 0.2, 2.0, 0.2, 2.0, 0.2];
        let stats = compute_statistics(
            "noisy",
            &SampleSet {
                update_deltas: &updates,
                update_count: 7,
                ..SampleSet::default()
            },
            &ReducerSettings {
                trim_ms: 0.0,
                ..ReducerSettings::default()
            },
        );
        assert!(close(stats.avg_update_time_ms, 1.1));
        assert!(close(stats.avg_ups, 1000.0 / 1.1));
        // Percentiles still only see deltas above the noise floor.
        assert!(close(stats.p50_update_time_ms, 2.0));
    }

    #[test]
    fn empty_input_degrades_to_named_zero_record() {
        let stats = compute_statistics("idle", &SampleSet::default(), &ReducerSettings::default());
        assert_eq!(stats, FrameStatistics::empty("idle"));
        assert_eq!(stats.total_updates, 0);
        assert!(!stats.has_data());
    }

    #[test]
    fn full_reduction_of_steady_run() {
        let updates = vec![2.0; 1000];
        let renders = vec![16.0; 125];
        let scroll = vec![5.0; 1000];
        let stats = compute_statistics(
            "steady",
            &SampleSet {
                update_deltas: &updates,
                render_frame_deltas: &renders,
                scroll_deltas: &scroll,
                scroll_time_deltas: &updates,
                update_count: 1001,
                render_frame_count: 126,
                duration: Duration::from_secs(2),
            },
            &ReducerSettings::default(),
        );
        assert_eq!(stats.total_updates, 1001);
        assert!(close(stats.avg_ups, 500.0));
        assert!(close(stats.min_ups, 500.0));
        assert!(close(stats.max_ups, 500.0));
        assert!(close(stats.p99_update_time_ms, 2.0));
        assert_eq!(stats.update_time_std_dev_ms, 0.0);
        assert!(close(stats.avg_render_fps, 62.5));
        assert_eq!(stats.dropped_frames, 0);
        assert_eq!(stats.jank_frames, 0);
        assert!(close(stats.jank_threshold_ms, 33.3));
        assert!(close(stats.avg_scroll_velocity, 2500.0));
        assert!(close(stats.max_scroll_velocity, 2500.0));
        assert!(close(stats.duration_ms, 2000.0));
    }

    proptest! {
        #[test]
        fn trim_keeps_threshold_from_each_edge(
            deltas in proptest::collection::vec(1.0f64..50.0, 3..200),
        ) {
            let trim = 250.0;
            let total: f64 = deltas.iter().sum();
            let range = trim_range(&deltas, trim);
            prop_assert!(range.end <= deltas.len());
            if total > 2.0 * trim && range != (0..deltas.len()) {
                let before: f64 = deltas[..range.start].iter().sum();
                let after: f64 = deltas[range.end..].iter().sum();
                prop_assert!(before < trim);
                prop_assert!(after < trim);
                let through_first: f64 = deltas[..=range.start].iter().sum();
                let from_last: f64 = deltas[range.end - 1..].iter().sum();
                prop_assert!(through_first >= trim);
                prop_assert!(from_last >= trim);
            }
        }

        #[test]
        fn single_element_percentile_is_identity(value in -1e6f64..1e6, p in 0.0f64..=100.0) {
            prop_assert_eq!(percentile(&[value], p), value);
        }

        #[test]
        fn windowed_extremes_bound_every_window(
            deltas in proptest::collection::vec(1.0f64..40.0, 2..400),
        ) {
            let window = 100.0;
            let (min, max) = windowed_min_max_rate(&deltas, window);
            let mut sum = 0.0;
            let mut count = 0u32;
            for delta in &deltas {
                sum += delta;
                count += 1;
                if sum >= window {
                    let rate = f64::from(count) / (sum / 1000.0);
                    prop_assert!(min <= rate + 1e-9 && rate <= max + 1e-9);
                    sum = 0.0;
                    count = 0;
                }
            }
        }
    }
}
