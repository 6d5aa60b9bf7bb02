//! # snoop - Main Entry Point
//!
//! Resolves the TLS library, runs pre-flight checks, starts the tracer and
//! prints every captured message until SIGINT or SIGTERM.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use snoop::capture::{raise_memlock_rlimit, Tracer};
use snoop::cli::Args;
use snoop::library::resolve_library_path;
use snoop::preflight::run_preflight_checks;
use snoop::render::{OutputFormat, Renderer};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if msg.contains("unsupported architecture") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let library = resolve_library_path(args.library.as_deref())?;

    // Run pre-flight checks before anything else
    run_preflight_checks(&library, &args.program, quiet)?;
    raise_memlock_rlimit();

    let config = args.tracer_config(&library);
    if !quiet {
        eprintln!("snoop v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("library: {}", library.display());
        eprintln!("tracing: {}", config.pid_filter);
    }

    let mut tracer = Tracer::new(config);
    let mut session = tracer.start().context("Failed to start TLS tracer")?;
    if !quiet {
        eprintln!("Waiting for TLS traffic... press Ctrl+C to stop");
    }

    let renderer = Renderer::new(args.output_format(), std::io::stdout().is_terminal());
    while let Some(event) = session.recv().await {
        match renderer.render(&event) {
            Ok(text) if renderer.format() == OutputFormat::Json => println!("{text}"),
            Ok(text) => print!("{text}"),
            Err(e) => eprintln!("{e}"),
        }
    }

    let stats = session.join().await;
    info!("Pipeline closed after {stats}");
    if !quiet {
        eprintln!("\nstats: {stats}");
    }
    Ok(())
}
