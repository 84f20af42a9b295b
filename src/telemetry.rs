use std::cmp::Reverse;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing::subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

use crate::config::TraceSettings;

const TRACE_SUFFIX: &str = ".trace.jsonl";

static TRACE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static ACTIVE_TRACE_FILE: OnceCell<PathBuf> = OnceCell::new();
static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

fn install_subscriber<S>(subscriber: S) -> Result<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    subscriber::set_global_default(subscriber)?;
    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}

/// Install the console subscriber, plus a JSON trace file when enabled.
pub fn init_tracing(service: &str, verbose: bool, traces: &TraceSettings) -> Result<()> {
    let default_level = if verbose {
        "scrollbench=debug,scrollbench_cli=debug"
    } else {
        "scrollbench=info,scrollbench_cli=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match build_trace_writer(service, traces)? {
        Some((writer, guard, path)) => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false))
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_writer(writer)
                        .with_filter(LevelFilter::TRACE),
                );
            let _ = TRACE_GUARD.set(guard);
            let _ = ACTIVE_TRACE_FILE.set(path);
            install_subscriber(subscriber)
        }
        None => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false));
            install_subscriber(subscriber)
        }
    }
}

/// Trace file receiving JSON events for this process, if any.
pub fn current_trace_file() -> Option<&'static PathBuf> {
    ACTIVE_TRACE_FILE.get()
}

fn build_trace_writer(
    service: &str,
    settings: &TraceSettings,
) -> Result<Option<(NonBlocking, WorkerGuard, PathBuf)>> {
    if !settings.enabled {
        return Ok(None);
    }

    let directory = settings.resolve_directory()?;
    fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create trace directory {}", directory.display()))?;

    let (file, path) = create_trace_file(service, &directory)?;
    prune_traces(&directory, settings.max_files, &path)?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    Ok(Some((writer, guard, path)))
}

fn create_trace_file(service: &str, directory: &Path) -> Result<(File, PathBuf)> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut candidate = directory.join(format!("{service}-{stamp}{TRACE_SUFFIX}"));
    let mut counter = 0;
    while candidate.exists() {
        counter += 1;
        candidate = directory.join(format!("{service}-{stamp}-{counter}{TRACE_SUFFIX}"));
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&candidate)
        .with_context(|| format!("Failed to open trace file {}", candidate.display()))?;
    Ok((file, candidate))
}

/// Delete the oldest trace files so that `max_files` remain including `keep`.
fn prune_traces(directory: &Path, max_files: usize, keep: &Path) -> Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let mut entries: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(directory)
        .with_context(|| format!("Failed to read trace directory {}", directory.display()))?
    {
        let path = entry?.path();
        if path == keep || !path.is_file() {
            continue;
        }
        let is_trace = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(TRACE_SUFFIX));
        if !is_trace {
            continue;
        }
        let Ok(modified) = fs::metadata(&path).and_then(|meta| meta.modified()) else {
            continue;
        };
        entries.push((modified, path));
    }

    entries.sort_by_key(|(modified, _)| Reverse(*modified));
    for (_, path) in entries.into_iter().skip(max_files.saturating_sub(1)) {
        let _ = fs::remove_file(&path);
    }
    Ok(())
}
