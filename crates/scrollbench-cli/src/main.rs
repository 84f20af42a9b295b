use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand, value_parser};
use scrollbench::BenchmarkRunner;
use scrollbench::config::{BenchSettings, default_config_path};
use scrollbench::frame_clock::VsyncClock;
use scrollbench::report::{BenchmarkReport, ReportComparison};
use scrollbench::scenario::{ALL_SCENARIOS, select_scenarios};
use scrollbench::surface::SimulatedSurface;
use scrollbench::telemetry::{current_trace_file, init_tracing};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "scrollbench", author, version, about = "Scroll and frame-pacing benchmark harness", long_about = None)]
struct BenchCli {
    /// Increase logging verbosity.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Override the default configuration path.
    #[arg(long, global = true, value_parser = value_parser!(PathBuf))]
    config: Option<PathBuf>,

    /// Location to write benchmark reports.
    #[arg(long, global = true, value_parser = value_parser!(PathBuf))]
    output: Option<PathBuf>,

    /// Command to execute.
    #[command(subcommand)]
    command: BenchCommand,
}

#[derive(Subcommand, Debug)]
enum BenchCommand {
    /// Drive scroll scenarios while sampling update and frame cadence.
    Run(RunCommand),
    /// List available scroll scenarios.
    List,
    /// Compare a report against a baseline report.
    Compare(CompareCommand),
}

#[derive(Args, Debug)]
struct RunCommand {
    /// Scenario to run: all, fast-scroll, slow-scroll, jump, touchpad,
    /// touchscreen, flick or mixed. Unknown names run mixed.
    #[arg(long, default_value = "all")]
    scenario: String,

    /// Iterations per scenario.
    #[arg(long)]
    iterations: Option<u32>,

    /// Duration of each iteration in milliseconds.
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Refresh rate of the simulated display (Hz).
    #[arg(long)]
    refresh_hz: Option<f64>,

    /// Scrollable extent of the simulated surface in pixels.
    #[arg(long)]
    max_extent: Option<f64>,

    /// Skip writing the report to disk.
    #[arg(long, action = ArgAction::SetTrue)]
    no_save: bool,

    /// Print the report as JSON instead of a table.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct CompareCommand {
    /// Baseline report.
    baseline: PathBuf,

    /// Report to check against the baseline.
    current: PathBuf,

    /// Allowed change in percent before a scenario counts as regressed.
    #[arg(long, default_value_t = 5.0)]
    tolerance_pct: f64,
}

impl RunCommand {
    fn apply(&self, settings: &mut BenchSettings) {
        if let Some(iterations) = self.iterations {
            settings.iterations = iterations.max(1);
        }
        if let Some(duration_ms) = self.duration_ms {
            settings.duration_ms = duration_ms;
        }
        if let Some(refresh_hz) = self.refresh_hz {
            settings.surface.refresh_hz = refresh_hz;
        }
        if let Some(max_extent) = self.max_extent {
            settings.surface.max_extent = max_extent;
        }
    }
}

fn load_settings(cli: &BenchCli) -> Result<BenchSettings> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut settings = BenchSettings::load_or_default(&path)?;
    if let Some(output) = &cli.output {
        settings.output_dir = Some(output.clone());
    }
    Ok(settings)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = BenchCli::parse();
    let mut settings = load_settings(&cli)?;
    init_tracing("scrollbench", cli.verbose, &settings.traces)?;
    if let Some(path) = current_trace_file() {
        info!(path = %path.display(), "Writing JSON trace");
    }

    match &cli.command {
        BenchCommand::Run(cmd) => {
            cmd.apply(&mut settings);
            handle_run(cmd, settings).await
        }
        BenchCommand::List => {
            handle_list();
            Ok(ExitCode::SUCCESS)
        }
        BenchCommand::Compare(cmd) => handle_compare(cmd),
    }
}

async fn handle_run(cmd: &RunCommand, settings: BenchSettings) -> Result<ExitCode> {
    let scenarios = select_scenarios(&cmd.scenario);
    let surface = Arc::new(SimulatedSurface::new(settings.surface.max_extent));
    let clock = Arc::new(VsyncClock::new(settings.surface.refresh_hz));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing current iteration");
            on_signal.cancel();
        }
    });

    let save_dir = if cmd.no_save {
        None
    } else {
        Some(settings.resolve_output_dir()?)
    };
    let runner = BenchmarkRunner::new(settings);
    let report = runner.run(surface, clock, &scenarios, &cancel).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_table());
    }

    if let Some(dir) = save_dir {
        match report.write_to(&dir) {
            Ok(path) => info!(path = %path.display(), "Benchmark report written"),
            Err(err) => warn!(error = %err, path = %dir.display(), "Unable to write benchmark report"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_list() {
    for scenario in ALL_SCENARIOS {
        println!("{:<13} {}", scenario.name(), scenario.description());
    }
}

fn handle_compare(cmd: &CompareCommand) -> Result<ExitCode> {
    let baseline = BenchmarkReport::load(&cmd.baseline)?;
    let current = BenchmarkReport::load(&cmd.current)?;
    let comparison = current.compare(&baseline, cmd.tolerance_pct);
    print!("{}", format_comparison(&comparison));
    if comparison.has_regressions() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn format_comparison(comparison: &ReportComparison) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<13} {:>9} {:>9} {:>8} {:>9} {:>9} {:>8}\n",
        "scenario", "base fps", "fps", "Δ%", "base p99", "p99", "Δ%"
    ));
    for delta in &comparison.deltas {
        out.push_str(&format!(
            "{:<13} {:>9.1} {:>9.1} {:>+8.1} {:>9.2} {:>9.2} {:>+8.1}{}\n",
            delta.scenario_name,
            delta.baseline_fps,
            delta.current_fps,
            delta.fps_change_pct,
            delta.baseline_p99_ms,
            delta.current_p99_ms,
            delta.p99_change_pct,
            if delta.regressed { "  REGRESSED" } else { "" }
        ));
    }
    for name in &comparison.missing_in_current {
        out.push_str(&format!("{name:<13} missing from current report\n"));
    }
    for name in &comparison.missing_in_baseline {
        out.push_str(&format!("{name:<13} missing from baseline report\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrollbench::report::ScenarioDelta;

    #[test]
    fn parses_run_defaults() {
        let cli = BenchCli::parse_from(["scrollbench", "run"]);
        match cli.command {
            BenchCommand::Run(cmd) => {
                assert_eq!(cmd.scenario, "all");
                assert!(cmd.iterations.is_none());
                assert!(!cmd.no_save);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn run_flags_override_settings() {
        let cli = BenchCli::parse_from([
            "scrollbench",
            "run",
            "--scenario",
            "jump",
            "--iterations",
            "0",
            "--duration-ms",
            "1500",
            "--refresh-hz",
            "144",
            "--max-extent",
            "8000",
            "--verbose",
        ]);
        assert!(cli.verbose);
        let BenchCommand::Run(cmd) = cli.command else {
            panic!("expected run command");
        };
        let mut settings = BenchSettings::default();
        cmd.apply(&mut settings);
        assert_eq!(settings.iterations, 1);
        assert_eq!(settings.duration_ms, 1500);
        assert_eq!(settings.surface.refresh_hz, 144.0);
        assert_eq!(settings.surface.max_extent, 8000.0);
    }

    #[test]
    fn parses_compare_arguments() {
        let cli = BenchCli::parse_from([
            "scrollbench",
            "compare",
            "old.json",
            "new.json",
            "--tolerance-pct",
            "2.5",
        ]);
        match cli.command {
            BenchCommand::Compare(cmd) => {
                assert_eq!(cmd.baseline, PathBuf::from("old.json"));
                assert_eq!(cmd.current, PathBuf::from("new.json"));
                assert_eq!(cmd.tolerance_pct, 2.5);
            }
            _ => panic!("expected compare command"),
        }
    }

    #[test]
    fn comparison_lists_regressions_and_gaps() {
        let comparison = ReportComparison {
            deltas: vec![ScenarioDelta {
                scenario_name: "jump".into(),
                baseline_fps: 60.0,
                current_fps: 45.0,
                fps_change_pct: -25.0,
                baseline_p99_ms: 17.0,
                current_p99_ms: 30.0,
                p99_change_pct: 76.5,
                regressed: true,
            }],
            missing_in_current: vec!["flick".into()],
            missing_in_baseline: Vec::new(),
        };
        let text = format_comparison(&comparison);
        assert!(text.contains("REGRESSED"));
        assert!(text.contains("-25.0"));
        assert!(text.contains("flick         missing from current report"));
    }
}
