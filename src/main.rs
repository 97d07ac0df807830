use als_recovery::cli::Args;
use als_recovery::pool::CancelToken;
use als_recovery::types::{EventSink, RecoveryEvent};
use als_recovery::RecoveryPipeline;
use anyhow::{Context, Result};
use clap::Parser;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Log a copy progress line every this many files
const COPY_PROGRESS_EVERY: usize = 100;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    init_logging(args.verbose);
    als_recovery::pool::install_panic_hook();

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("Scan interrupted by user, finishing in-flight files...");
            cancel.cancel();
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let progress = spawn_progress_logger(rx);

    let pipeline = RecoveryPipeline::new(args.into_config())
        .with_events(EventSink::new(tx))
        .with_cancel(cancel);
    let result = pipeline.run();
    // Last sender goes away here, which ends the progress thread
    drop(pipeline);
    let _ = progress.join();

    let run = result.context("recovery run failed")?;
    let summary = run.summary;

    println!();
    println!("Recovery summary");
    println!("{}", "=".repeat(40));
    println!("  ALS found:       {}", summary.als_found);
    println!("  ALP found:       {}", summary.alp_found);
    println!("  Keyword found:   {}", summary.keyword_found);
    println!("  Total found:     {}", summary.total_found());
    println!("  Copied:          {}", summary.copy_succeeded);
    println!("  Failed:          {}", summary.copy_failed);
    if !run.scan.result.project_folders.is_empty() {
        println!("  Project folders: {}", run.scan.result.project_folders.len());
    }

    if summary.interrupted {
        println!("  (interrupted, results are partial)");
        return Ok(130);
    }
    Ok(0)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Drain pipeline events on a plain thread and turn them into progress lines
fn spawn_progress_logger(mut rx: UnboundedReceiver<RecoveryEvent>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut units_done = 0usize;
        let mut found = 0usize;
        let mut copied = 0usize;

        while let Some(event) = rx.blocking_recv() {
            match event {
                RecoveryEvent::CandidateFound(_) => found += 1,
                RecoveryEvent::UnitCompleted { root, found: in_unit } => {
                    units_done += 1;
                    info!(
                        units_done,
                        found_so_far = found,
                        "scanned {} ({} matches)",
                        root.display(),
                        in_unit
                    );
                }
                RecoveryEvent::FileCopied(_) | RecoveryEvent::CopyFailed { .. } => {
                    copied += 1;
                    if copied % COPY_PROGRESS_EVERY == 0 {
                        info!(processed = copied, "copy progress");
                    }
                }
                _ => {}
            }
        }
    })
}
