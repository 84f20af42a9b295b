use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stats::{FrameStatistics, mean};

/// Ordered results of one benchmark invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub platform: String,
    pub processor_count: usize,
    pub duration_ms: u64,
    pub iterations: u32,
    pub scenarios: Vec<FrameStatistics>,
}

/// Per-scenario aggregate across iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub scenario_name: String,
    pub iterations: usize,
    pub iterations_with_data: usize,
    pub mean_avg_render_fps: f64,
    pub mean_avg_ups: f64,
    pub worst_p99_render_frame_time_ms: f64,
    pub worst_jank_percentage: f64,
    pub total_dropped_frames: u64,
    pub mean_scroll_velocity: f64,
}

/// Difference between two runs of the same scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDelta {
    pub scenario_name: String,
    pub baseline_fps: f64,
    pub current_fps: f64,
    pub fps_change_pct: f64,
    pub baseline_p99_ms: f64,
    pub current_p99_ms: f64,
    pub p99_change_pct: f64,
    pub regressed: bool,
}

/// Outcome of comparing a report against a baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportComparison {
    pub deltas: Vec<ScenarioDelta>,
    pub missing_in_current: Vec<String>,
    pub missing_in_baseline: Vec<String>,
}

impl ReportComparison {
    pub fn has_regressions(&self) -> bool {
        self.deltas.iter().any(|delta| delta.regressed)
    }
}

/// Host description recorded alongside results.
pub fn platform_description() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

fn processor_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

fn change_pct(baseline: f64, current: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (current - baseline) / baseline * 100.0
    }
}

impl BenchmarkReport {
    pub fn new(duration_ms: u64, iterations: u32, scenarios: Vec<FrameStatistics>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            platform: platform_description(),
            processor_count: processor_count(),
            duration_ms,
            iterations,
            scenarios,
        }
    }

    /// Aggregate records by scenario name in first-seen order.
    pub fn summaries(&self) -> Vec<ScenarioSummary> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&FrameStatistics>> = HashMap::new();
        for record in &self.scenarios {
            let name = record.scenario_name.as_str();
            let entry = groups.entry(name).or_default();
            if entry.is_empty() {
                order.push(name);
            }
            entry.push(record);
        }

        order
            .into_iter()
            .map(|name| {
                let records = &groups[name];
                let field_values = |field: fn(&FrameStatistics) -> f64| -> Vec<f64> {
                    records.iter().map(|record| field(record)).collect()
                };
                ScenarioSummary {
                    scenario_name: name.to_string(),
                    iterations: records.len(),
                    iterations_with_data: records.iter().filter(|r| r.has_data()).count(),
                    mean_avg_render_fps: mean(&field_values(|r| r.avg_render_fps)),
                    mean_avg_ups: mean(&field_values(|r| r.avg_ups)),
                    worst_p99_render_frame_time_ms: field_values(|r| r.p99_render_frame_time_ms)
                        .into_iter()
                        .fold(0.0, f64::max),
                    worst_jank_percentage: field_values(|r| r.jank_percentage)
                        .into_iter()
                        .fold(0.0, f64::max),
                    total_dropped_frames: records.iter().map(|r| r.dropped_frames).sum(),
                    mean_scroll_velocity: mean(&field_values(|r| r.avg_scroll_velocity)),
                }
            })
            .collect()
    }

    /// Fixed-width table of every record.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Scroll benchmark {} | {} | {} cpus | {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.platform,
            self.processor_count,
            self.run_id
        );
        let _ = writeln!(
            out,
            "{:<13} {:>8} {:>8} {:>8} {:>9} {:>9} {:>9} {:>8} {:>7} {:>10}",
            "scenario", "ups", "fps", "min fps", "p50 ms", "p99 ms", "dropped", "jank %", "jank", "px/s"
        );
        for record in &self.scenarios {
            if !record.has_data() {
                let _ = writeln!(out, "{:<13} (no samples)", record.scenario_name);
                continue;
            }
            let _ = writeln!(
                out,
                "{:<13} {:>8.1} {:>8.1} {:>8.1} {:>9.2} {:>9.2} {:>9} {:>8.2} {:>7} {:>10.0}",
                record.scenario_name,
                record.avg_ups,
                record.avg_render_fps,
                record.min_render_fps,
                record.p50_render_frame_time_ms,
                record.p99_render_frame_time_ms,
                record.dropped_frames,
                record.jank_percentage,
                record.jank_frames,
                record.avg_scroll_velocity,
            );
        }
        out
    }

    /// Persist as pretty JSON under `dir`, returning the file written.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

        let stamp = self.timestamp.format("%Y%m%dT%H%M%SZ");
        let mut candidate = dir.join(format!("scroll-{stamp}.json"));
        let mut counter = 0;
        while candidate.exists() {
            counter += 1;
            candidate = dir.join(format!("scroll-{stamp}-{counter}.json"));
        }

        let serialised = serde_json::to_string_pretty(self)?;
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&candidate)
            .with_context(|| format!("Failed to open report file {}", candidate.display()))?;
        file.write_all(serialised.as_bytes())
            .with_context(|| format!("Failed to write report {}", candidate.display()))?;
        Ok(candidate)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Unable to read report at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Malformed report at {}", path.display()))
    }

    /// Compare summaries against `baseline`. A scenario regresses when its
    /// mean fps drops, or its worst p99 frame time grows, by more than
    /// `tolerance_pct` percent.
    pub fn compare(&self, baseline: &BenchmarkReport, tolerance_pct: f64) -> ReportComparison {
        let current = self.summaries();
        let previous = baseline.summaries();
        let mut comparison = ReportComparison::default();

        for summary in &current {
            let Some(base) = previous
                .iter()
                .find(|candidate| candidate.scenario_name == summary.scenario_name)
            else {
                comparison
                    .missing_in_baseline
                    .push(summary.scenario_name.clone());
                continue;
            };
            let fps_change_pct = change_pct(base.mean_avg_render_fps, summary.mean_avg_render_fps);
            let p99_change_pct = change_pct(
                base.worst_p99_render_frame_time_ms,
                summary.worst_p99_render_frame_time_ms,
            );
            comparison.deltas.push(ScenarioDelta {
                scenario_name: summary.scenario_name.clone(),
                baseline_fps: base.mean_avg_render_fps,
                current_fps: summary.mean_avg_render_fps,
                fps_change_pct,
                baseline_p99_ms: base.worst_p99_render_frame_time_ms,
                current_p99_ms: summary.worst_p99_render_frame_time_ms,
                p99_change_pct,
                regressed: fps_change_pct < -tolerance_pct || p99_change_pct > tolerance_pct,
            });
        }

        comparison.missing_in_current = previous
            .iter()
            .filter(|base| {
                !current
                    .iter()
                    .any(|summary| summary.scenario_name == base.scenario_name)
            })
            .map(|base| base.scenario_name.clone())
            .collect();
        comparison
    }
}
