//! keyspace-analyzer - Redis keyspace memory analyzer
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use keyspace_analyzer::config::{AnalysisConfig, CliArgs, Command};
use keyspace_analyzer::pipeline::{request_shutdown, Analyzer, PROGRESS_INTERVAL};
use keyspace_analyzer::progress::{print_forest, print_header, print_summary, ProgressReporter};
use keyspace_analyzer::store::RedisConnector;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    if let Some(command) = &args.command {
        return run_command(&runtime, command);
    }

    let config = AnalysisConfig::from_args(&args).context("Invalid configuration")?;
    runtime.block_on(analyze(config, &args))
}

#[cfg(feature = "server")]
fn run_command(runtime: &tokio::runtime::Runtime, command: &Command) -> Result<()> {
    match command {
        Command::Serve { port, bind } => runtime
            .block_on(keyspace_analyzer::server::serve(bind, *port))
            .context("Server failed"),
    }
}

#[cfg(not(feature = "server"))]
fn run_command(_runtime: &tokio::runtime::Runtime, command: &Command) -> Result<()> {
    match *command {}
}

async fn analyze(config: AnalysisConfig, args: &CliArgs) -> Result<()> {
    let show_progress = !args.quiet;
    if show_progress {
        print_header(&config);
    }

    let connector =
        RedisConnector::new(&config.target).context("Failed to create Redis client")?;
    let analyzer = Analyzer::new(config, connector);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = analyzer.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing current batch...");
        request_shutdown(&shutdown_flag);
    })
    .context("Failed to set signal handler")?;

    let progress = show_progress.then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Connecting to Redis...");
    }

    let (forest, handle) = analyzer.start().await.context("Failed to start analysis")?;

    while !handle.is_finished() {
        if let Some(ref p) = progress {
            p.update(&handle.progress());
        }
        tokio::time::sleep(PROGRESS_INTERVAL).await;
    }

    let result = handle.wait().await;
    if let Some(ref p) = progress {
        match &result {
            Ok(summary) if summary.completed => p.finish("Analysis completed"),
            Ok(_) => p.finish("Analysis interrupted"),
            Err(_) => p.finish_and_clear(),
        }
    }
    let summary = result.context("Analysis failed")?;

    let forest = match Arc::try_unwrap(forest) {
        Ok(lock) => lock.into_inner(),
        Err(shared) => shared.read().clone(),
    };

    print_summary(&summary, &forest);
    print_forest(&forest, args.depth, args.top);

    if !summary.completed {
        info!("Analysis was interrupted before completion");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("keyspace_analyzer=debug,warn")
    } else {
        EnvFilter::new("keyspace_analyzer=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
