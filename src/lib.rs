pub mod config;
pub mod frame_clock;
pub mod monitor;
pub mod report;
pub mod scenario;
pub mod stats;
pub mod surface;
pub mod telemetry;

use std::sync::Arc;

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::config::BenchSettings;
use crate::frame_clock::FrameClock;
use crate::monitor::FrameMonitor;
use crate::report::BenchmarkReport;
use crate::scenario::{ScenarioOutcome, ScrollScenario};
use crate::stats::FrameStatistics;
use crate::surface::ScrollSurface;

/// Sequences scenario and monitor pairs and collects their statistics.
pub struct BenchmarkRunner {
    settings: BenchSettings,
}

impl BenchmarkRunner {
    pub fn new(settings: BenchSettings) -> Self {
        Self { settings }
    }

    /// Run every scenario `iterations` times against `surface`.
    ///
    /// Fails only when the surface has no scrollable region. Cancelling
    /// `cancel` stops sequencing; records gathered so far are still reported.
    pub async fn run(
        &self,
        surface: Arc<dyn ScrollSurface>,
        clock: Arc<dyn FrameClock>,
        scenarios: &[ScrollScenario],
        cancel: &CancellationToken,
    ) -> Result<BenchmarkReport> {
        let extent = surface.max_extent();
        if !extent.is_finite() || extent <= 0.0 {
            bail!("scrollable region not found: surface reports max extent {extent}");
        }

        info!(
            scenarios = scenarios.len(),
            iterations = self.settings.iterations,
            duration_ms = self.settings.duration_ms,
            max_extent = extent,
            "Starting scroll benchmark"
        );

        let mut records = Vec::new();
        'scenarios: for scenario in scenarios {
            for iteration in 1..=self.settings.iterations {
                if cancel.is_cancelled() {
                    warn!(completed = records.len(), "Benchmark cancelled; reporting partial results");
                    break 'scenarios;
                }
                let span = info_span!("bench.iteration", scenario = scenario.name(), iteration);
                let stats = self
                    .run_iteration(*scenario, &surface, &clock, cancel)
                    .instrument(span)
                    .await;
                records.push(stats);
            }
        }

        Ok(BenchmarkReport::new(
            self.settings.duration_ms,
            self.settings.iterations,
            records,
        ))
    }

    async fn run_iteration(
        &self,
        scenario: ScrollScenario,
        surface: &Arc<dyn ScrollSurface>,
        clock: &Arc<dyn FrameClock>,
        cancel: &CancellationToken,
    ) -> FrameStatistics {
        surface.scroll_to(0.0);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.settings.settle()) => {}
        }

        let mut monitor = FrameMonitor::new(Arc::clone(clock), self.settings.monitor)
            .track_offset(Arc::clone(surface));
        monitor.start();

        let scenario_cancel = cancel.child_token();
        let limit = self.settings.scenario_time_limit();
        let run = scenario.run(surface.as_ref(), self.settings.duration(), &scenario_cancel);
        match tokio::time::timeout(limit, run).await {
            Ok(ScenarioOutcome::Completed) => {}
            Ok(ScenarioOutcome::Cancelled) => {
                info!("Scenario cancelled before completion");
            }
            Err(_) => {
                scenario_cancel.cancel();
                warn!(limit_ms = limit.as_millis() as u64, "Scenario exceeded time limit; cancelled");
            }
        }

        monitor.stop();
        let stats = monitor.statistics(scenario.name(), &self.settings.reducer);
        if stats.has_data() {
            info!(
                fps = stats.avg_render_fps,
                ups = stats.avg_ups,
                p99_frame_ms = stats.p99_render_frame_time_ms,
                jank_pct = stats.jank_percentage,
                "Iteration complete"
            );
        } else {
            warn!("Iteration produced no usable samples");
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_clock::{PumpedFrameClock, VsyncClock};
    use crate::surface::SimulatedSurface;
    use crate::stats::ReducerSettings;

    fn quick_settings() -> BenchSettings {
        BenchSettings {
            duration_ms: 2_000,
            iterations: 2,
            settle_ms: 100,
            reducer: ReducerSettings {
                trim_ms: 250.0,
                window_ms: 500.0,
            },
            ..BenchSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn collects_one_record_per_iteration_in_order() {
        let runner = BenchmarkRunner::new(quick_settings());
        let surface = Arc::new(SimulatedSurface::new(20_000.0));
        let clock = Arc::new(VsyncClock::new(50.0));
        let scenarios = [ScrollScenario::SlowScroll, ScrollScenario::Jump];
        let report = runner
            .run(surface, clock, &scenarios, &CancellationToken::new())
            .await
            .expect("benchmark");

        let names: Vec<&str> = report
            .scenarios
            .iter()
            .map(|record| record.scenario_name.as_str())
            .collect();
        assert_eq!(names, ["slow-scroll", "slow-scroll", "jump", "jump"]);
        for record in &report.scenarios {
            assert!(record.has_data());
            assert!((record.avg_render_fps - 50.0).abs() < 0.5, "fps {}", record.avg_render_fps);
            assert_eq!(record.dropped_frames, 0);
            assert!(record.avg_ups > 900.0);
        }
        assert!(report.scenarios[0].avg_scroll_velocity > 0.0);
        assert_eq!(report.iterations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_scroll_region_aborts_run() {
        let runner = BenchmarkRunner::new(quick_settings());
        let surface = Arc::new(SimulatedSurface::new(0.0));
        let clock = Arc::new(PumpedFrameClock::new());
        let err = runner
            .run(surface, clock, &[ScrollScenario::Mixed], &CancellationToken::new())
            .await
            .expect_err("no scroll region");
        assert!(err.to_string().contains("scrollable region not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn frameless_host_still_reports_every_scenario() {
        let runner = BenchmarkRunner::new(BenchSettings {
            iterations: 1,
            ..quick_settings()
        });
        let surface = Arc::new(SimulatedSurface::new(5_000.0));
        let clock = Arc::new(PumpedFrameClock::new());
        let report = runner
            .run(
                surface,
                clock,
                &[ScrollScenario::Touchpad, ScrollScenario::Flick],
                &CancellationToken::new(),
            )
            .await
            .expect("benchmark");
        assert_eq!(report.scenarios.len(), 2);
        assert!(report.scenarios.iter().all(|record| record.total_render_frames == 0));
        assert!(report.scenarios.iter().all(|record| record.has_data()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_reports_completed_iterations() {
        let runner = BenchmarkRunner::new(quick_settings());
        let surface = Arc::new(SimulatedSurface::new(20_000.0));
        let clock = Arc::new(VsyncClock::new(60.0));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            // Lands inside the second iteration of the first scenario.
            tokio::time::sleep(std::time::Duration::from_millis(3_000)).await;
            trigger.cancel();
        });
        let report = runner
            .run(surface, clock, crate::scenario::ALL_SCENARIOS, &cancel)
            .await
            .expect("benchmark");
        assert_eq!(report.scenarios.len(), 2);
        assert_eq!(report.scenarios[0].scenario_name, "fast-scroll");
        assert!(report.scenarios[0].duration_ms >= 2_000.0);
        assert!(report.scenarios[1].duration_ms < 2_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_iteration_count_allocates_nothing_up_front() {
        let runner = BenchmarkRunner::new(BenchSettings {
            iterations: u32::MAX,
            ..quick_settings()
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = runner
            .run(
                Arc::new(SimulatedSurface::new(1_000.0)),
                Arc::new(PumpedFrameClock::new()),
                crate::scenario::ALL_SCENARIOS,
                &cancel,
            )
            .await
            .expect("benchmark");
        assert!(report.scenarios.is_empty());
        assert_eq!(report.iterations, u32::MAX);
    }
}
