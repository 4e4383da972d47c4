use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};

use addrsift::{Indexer, IndexerSettings, ProgressMonitor};

/// Throughput report interval
const PROGRESS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "addrsift")]
#[command(about = "High-throughput network address log indexer", long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
    /// Input files to index; use '-' to read from stdin
    inputs: Vec<String>,

    /// Display version information
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Diagnostic verbosity (0-9)
    #[arg(short = 'd', long = "debug", default_value_t = 0)]
    debug: i32,

    /// Write an index file per input named <input>.lpi
    #[arg(short = 'w', long = "write")]
    write: bool,

    /// Force serial processing
    #[arg(short = 's', long = "serial")]
    serial: bool,

    /// Ignore quotes when splitting fields
    #[arg(short = 'g', long = "greedy")]
    greedy: bool,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    if args.version {
        println!("addrsift v{}", addrsift::VERSION);
        return ExitCode::SUCCESS;
    }
    if args.inputs.is_empty() {
        eprintln!("ERR - No input files; use '-' to read from stdin");
        return ExitCode::FAILURE;
    }
    if !(0..=9).contains(&args.debug) {
        eprintln!("ERR - Debug level must be between 0-9");
        return ExitCode::FAILURE;
    }
    if args.write && args.inputs.iter().any(|input| input == "-") {
        eprintln!("ERR - Cannot write an index file when reading from stdin");
        return ExitCode::FAILURE;
    }

    init_tracing(args.debug);

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns true when at least one input was indexed successfully
fn run(args: Args) -> anyhow::Result<bool> {
    let settings = IndexerSettings::new()
        .with_greedy(args.greedy)
        .with_serial(args.serial);
    let indexer = Indexer::new(settings);

    let quit = indexer.quit_flag();
    signal_hook::flag::register(signal_hook::consts::SIGINT, quit.clone())
        .context("registering SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, quit.clone())
        .context("registering SIGTERM handler")?;

    let monitor = ProgressMonitor::start(PROGRESS_INTERVAL, indexer.line_counter());

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for input in &args.inputs {
        let result = if input == "-" {
            indexer.index_stdin()
        } else {
            indexer.index_file(Path::new(input), args.write)
        };
        match result {
            Ok(summary) => {
                succeeded += 1;
                info!(
                    input = %input,
                    records = summary.records,
                    lines = summary.stats.lines,
                    mode = ?summary.mode,
                    "indexed"
                );
            }
            Err(err) => {
                failed += 1;
                error!(input = %input, "{err}");
            }
        }
        if quit.load(std::sync::atomic::Ordering::Relaxed) {
            info!("interrupted, stopping after current file");
            break;
        }
    }
    monitor.stop();

    Ok(succeeded > 0 || failed == 0)
}

/// Map `-d N` onto a tracing filter; all diagnostics go to stderr so
/// stdout stays clean for index records
fn init_tracing(debug: i32) {
    let level = match debug {
        0 => "info",
        1..=3 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("addrsift={level}"))),
        )
        .with_writer(std::io::stderr)
        .init();
}
