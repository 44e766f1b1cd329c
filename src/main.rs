
// USAGE cargo run --release -- -j 16 /path/to/cosmic2/postproc/y2021

use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    process::ExitCode,
    time::Instant,
};

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use glob::glob;
use tracing::{info, warn};

use cosmic_to_netcdf::{
    batch::{convert_many, BatchConfig, BatchSummary},
    logging::{init_logging, LogConfig, LogFormat},
};

#[derive(Parser)]
#[command(
    name = "cosmic_to_netcdf",
    version,
    about = "Create NetCDF-4 copies of COSMIC ASCII data files next to the originals",
    long_about = "Create NetCDF-4 copies of COSMIC ASCII data files (gzip or plain).\n\n\
                  Directories are crawled recursively for *.txt and *.txt.gz files.\n\
                  Output goes to name.nc, with a `txt` directory mapped to `nc`."
)]
struct Cli {
    /// Data files or directories containing them (glob patterns allowed).
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<String>,

    /// Worker count (default: available parallelism).
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<usize>,

    /// Do not write files whose body has no data rows.
    #[arg(long = "skip-empty")]
    skip_empty: bool,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Errors only.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value = "pretty")]
    log_format: LogFormatArg,

    /// ANSI colors in log output.
    #[arg(long = "color", value_enum, default_value = "auto")]
    color: ColorArg,

    /// Hide the progress bar.
    #[arg(long = "no-progress")]
    no_progress: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Glob expansion for shells that leave patterns alone
// ─────────────────────────────────────────────────────────────────────
fn expand_patterns(args: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for arg in args {
        if !arg.contains(['*', '?', '[']) {
            out.push(PathBuf::from(arg));
            continue;
        }
        let mut matched: Vec<_> = glob(arg)?.filter_map(|r| r.ok()).collect();
        if matched.is_empty() {
            warn!(pattern = %arg, "pattern matched nothing");
            out.push(PathBuf::from(arg));
        } else {
            matched.sort();
            out.extend(matched);
        }
    }
    Ok(out)
}

fn log_config(cli: &Cli, stderr_is_terminal: bool) -> LogConfig {
    let with_ansi = match cli.color {
        ColorArg::Always => true,
        ColorArg::Never => false,
        ColorArg::Auto => stderr_is_terminal,
    };
    LogConfig::from_verbosity(cli.verbose, cli.quiet)
        .with_format(cli.log_format.into())
        .with_ansi(with_ansi)
}

/// The bar shares stderr with the logs; only interactive human-readable runs get it.
fn show_progress(cli: &Cli, stderr_is_terminal: bool) -> bool {
    stderr_is_terminal && !cli.no_progress && !cli.quiet && !matches!(cli.log_format, LogFormatArg::Json)
}

fn run(cli: &Cli) -> Result<BatchSummary> {
    let paths = expand_patterns(&cli.paths)?;
    let mut config = BatchConfig::default()
        .with_skip_empty(cli.skip_empty)
        .with_progress(show_progress(cli, io::stderr().is_terminal()));
    if let Some(jobs) = cli.jobs {
        config = config.with_process_count(jobs);
    }

    let t0 = Instant::now();
    let codes = convert_many(&paths, &config);
    let summary = BatchSummary::from_codes(&codes);
    info!(elapsed = ?t0.elapsed(), "batch finished");

    if summary.total == 0 {
        bail!("no input files found");
    }
    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&log_config(&cli, io::stderr().is_terminal()));

    match run(&cli) {
        Ok(summary) => {
            println!("{summary}");
            if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
