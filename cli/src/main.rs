//! accel-gzip CLI - benchmark and compress a file on the accelerator

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use accel_gzip_core::prelude::*;

#[derive(Parser)]
#[command(name = "accel-gzip")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File to compress
    input: PathBuf,

    /// Artifact base name; engine N > 0 writes `<name>{N+1}` (default `<input>.gz`)
    #[arg(short, long = "output-file")]
    output_file: Option<PathBuf>,

    /// Number of engines compressing in parallel
    #[arg(long)]
    engines: Option<usize>,

    /// Measured iterations per engine
    #[arg(long)]
    iterations: Option<usize>,

    /// Skip the warm-up run
    #[arg(long)]
    no_warmup: bool,

    /// Use ordinary host memory even if the device can pin
    #[arg(long)]
    pageable: bool,

    /// Verify every engine's artifact, not only the first
    #[arg(long)]
    verify_all: bool,

    /// JSON run configuration; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(engines) = self.engines {
            cfg.engines = engines;
        }
        if let Some(iterations) = self.iterations {
            cfg.iterations = iterations;
        }
        if self.pageable {
            cfg.memory = MemoryPreference::Pageable;
        }
        if self.verify_all {
            cfg.verify = VerifyPolicy::AllEngines;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let config = cli.run_config()?;
    let threads = config
        .executor_threads
        .unwrap_or_else(|| default_executor_threads(config.engines));
    debug!("effective config: {:?}", config);
    let device = Device::emulator(threads).context("cannot start device")?;

    println!("Running on device: {}", device.name());
    println!("Number of engines: {}", config.engines);

    let base = cli
        .output_file
        .clone()
        .unwrap_or_else(|| default_output_base(&cli.input));
    let outputs = output_file_names(&base, config.engines);

    let runner = Runner::from_config(&device, &config);
    let summary = runner.run_benchmark(&cli.input, &outputs, &config, !cli.no_warmup)?;
    Ok(summary)
}

const PASSED: &str = "PASSED";
const FAILED: &str = "FAILED";

/// Final status line of a run. Only a run whose artifacts were verified
/// passes; errors and unreported runs fail.
fn verdict(result: &Result<RunSummary>) -> &'static str {
    match result {
        Ok(summary) if summary.passed => PASSED,
        _ => FAILED,
    }
}

fn exit_code(verdict: &str) -> ExitCode {
    if verdict == PASSED {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(&cli);
    match &result {
        Ok(summary) if cli.json => match serde_json::to_string_pretty(summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("cannot serialize summary: {e}");
                return ExitCode::FAILURE;
            }
        },
        Ok(summary) => {
            if let Some(report) = &summary.report {
                print!("{report}");
            }
        }
        Err(e) => eprintln!("{e:#}"),
    }

    let status = verdict(&result);
    println!("{status}");
    exit_code(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(passed: bool) -> RunSummary {
        RunSummary {
            input_len: 4096,
            iterations: 1,
            engines: Vec::new(),
            report: None,
            artifacts: Vec::new(),
            passed,
        }
    }

    #[test]
    fn only_verified_runs_pass() {
        assert_eq!(verdict(&Ok(summary(true))), PASSED);
        assert_eq!(verdict(&Ok(summary(false))), FAILED);

        let err: Result<RunSummary> = Err(AccelError::InputTooSmall { len: 16, min: 17 }.into());
        assert_eq!(verdict(&err), FAILED);
    }
}
