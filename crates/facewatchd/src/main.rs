use anyhow::{Context, Result};
use clap::Parser;
use facewatch_core::{Config, SeetaDetector};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

mod annotate;
mod engine;
mod source;
mod throttle;

use engine::{Pipeline, RunSummary, StopReason};

#[derive(Parser)]
#[command(name = "facewatchd", about = "Detect faces on a camera feed and store each new one once")]
struct Args {
    /// Configuration file (TOML). Falls back to $FACEWATCH_CONFIG.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Log every similarity decision.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    config.debug |= args.debug;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.storage.backend,
        source = ?config.source.kind,
        threshold = config.similarity_threshold,
        compare = config.use_stored_images,
        "facewatchd starting"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    // Blocking HTTP and V4L2 calls stay off the async runtime.
    let mut worker = tokio::task::spawn_blocking(move || run(&config, &worker_stop));
    let quit = quit_key();

    let finished = tokio::select! {
        result = &mut worker => Some(result),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received; finishing current frame");
            None
        }
        Ok(()) = quit => {
            tracing::info!("quit requested; finishing current frame");
            None
        }
    };

    let outcome = match finished {
        Some(result) => result,
        None => {
            stop.store(true, Ordering::Relaxed);
            worker.await
        }
    };
    let (reason, summary) = outcome.context("capture thread panicked")??;

    shutdown(reason, &summary)
}

/// Log how the run ended. Every stop reason is a clean exit.
fn shutdown(reason: StopReason, summary: &RunSummary) -> Result<()> {
    if reason == StopReason::CaptureFailed {
        tracing::warn!("frame source failed; shutting down");
    }
    tracing::info!(
        reason = ?reason,
        frames = summary.frames,
        faces = summary.faces,
        accepted = summary.accepted,
        duplicates = summary.duplicates,
        throttled = summary.throttled,
        degenerate = summary.degenerate,
        store_failures = summary.store_failures,
        "facewatchd stopped"
    );
    Ok(())
}

/// Build every component and run the capture loop to completion.
fn run(config: &Config, stop: &AtomicBool) -> Result<(StopReason, RunSummary)> {
    let store = facewatch_store::open(&config.storage).context("failed to open image store")?;

    let detector = SeetaDetector::load(&config.detector.model_path)
        .context("failed to load face detector")?;
    tracing::info!(path = %config.detector.model_path.display(), "face detector loaded");

    let frames = source::open(&config.source).context("failed to open frame source")?;

    let mut pipeline = Pipeline::start(config, frames, Box::new(detector), store)?;
    let reason = pipeline.run(stop);
    tracing::info!(known = pipeline.registry().len(), "capture loop finished");
    Ok((reason, pipeline.summary()))
}

/// Resolves with `Ok` when a line reading `q` arrives on stdin, and with
/// `Err` once stdin closes.
///
/// Reads on a detached thread so an idle stdin never holds up shutdown.
fn quit_key() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name("facewatch-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                        let _ = tx.send(());
                        return;
                    }
                    Ok(_) => {}
                    Err(_) => return,
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to watch stdin; use Ctrl-C to stop");
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_failure_is_clean_exit() {
        let summary = RunSummary {
            frames: 12,
            accepted: 1,
            ..RunSummary::default()
        };
        assert!(shutdown(StopReason::CaptureFailed, &summary).is_ok());
        assert!(shutdown(StopReason::EndOfStream, &summary).is_ok());
        assert!(shutdown(StopReason::Requested, &RunSummary::default()).is_ok());
    }
}
