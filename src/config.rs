use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::monitor::MonitorSettings;
use crate::stats::ReducerSettings;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "scrollbench", "scrollbench")
        .context("Unable to resolve platform directories")
}

/// Default location of the benchmark configuration file.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

/// User configuration for benchmark runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchSettings {
    /// Length of each scenario iteration.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Idle time after resetting the surface, before sampling begins.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Extra time a scenario gets beyond its duration before it is cancelled.
    #[serde(default = "default_timeout_grace_ms")]
    pub timeout_grace_ms: u64,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub reducer: ReducerSettings,
    #[serde(default)]
    pub surface: SurfaceSettings,
    /// Optional override for where reports are written.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub traces: TraceSettings,
}

fn default_duration_ms() -> u64 {
    10_000
}

fn default_iterations() -> u32 {
    3
}

fn default_settle_ms() -> u64 {
    500
}

fn default_timeout_grace_ms() -> u64 {
    2_000
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
            iterations: default_iterations(),
            settle_ms: default_settle_ms(),
            timeout_grace_ms: default_timeout_grace_ms(),
            monitor: MonitorSettings::default(),
            reducer: ReducerSettings::default(),
            surface: SurfaceSettings::default(),
            output_dir: None,
            traces: TraceSettings::default(),
        }
    }
}

/// Simulated surface used by headless runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceSettings {
    #[serde(default = "default_max_extent")]
    pub max_extent: f64,
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: f64,
}

fn default_max_extent() -> f64 {
    20_000.0
}

fn default_refresh_hz() -> f64 {
    60.0
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            max_extent: default_max_extent(),
            refresh_hz: default_refresh_hz(),
        }
    }
}

/// JSON trace capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Optional override for the trace directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Trace files kept on disk, including the active one.
    #[serde(default = "default_max_trace_files")]
    pub max_files: usize,
}

fn default_max_trace_files() -> usize {
    10
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            max_files: default_max_trace_files(),
        }
    }
}

impl TraceSettings {
    /// Resolve the directory trace files are written to.
    pub fn resolve_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.directory {
            return Ok(dir.clone());
        }
        Ok(project_dirs()?.cache_dir().join("traces"))
    }
}

impl BenchSettings {
    /// Load settings from disk, writing defaults if missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read config at {}", path.display()))?;
            let parsed: Self = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed config at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
            let serialised = serde_json::to_string_pretty(&settings)?;
            fs::write(path, serialised)
                .with_context(|| format!("Failed to write default config to {}", path.display()))?;
            Ok(settings)
        }
    }

    /// Resolve the directory reports are written to.
    pub fn resolve_output_dir(&self) -> Result<PathBuf> {
        if let Some(path) = &self.output_dir {
            return Ok(path.clone());
        }
        Ok(project_dirs()?.data_dir().join("benchmarks"))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Hard limit for one scenario iteration.
    pub fn scenario_time_limit(&self) -> Duration {
        Duration::from_millis(self.duration_ms.saturating_add(self.timeout_grace_ms))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
