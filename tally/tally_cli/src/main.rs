use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, warn};
use tally_pool::harness::{HarnessReport, SampleReport};
use tally_pool::trace::{JsonSink, LogSink, NullSink, TraceSink};
use tally_pool::{Harness, HarnessConfig, Mode};
use tracing_subscriber::EnvFilter;

/// Tally: bounded counting-resource pools under concurrent load
///
/// Runs a single-threaded sample on the non-blocking pools, then drives
/// worker threads against the selected blocking pools and reports how many
/// units each one ends with.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Blocking pools to exercise: waiting, monitor or both
    #[clap(default_value = "both")]
    mode: String,

    /// TOML file with harness settings
    #[clap(long)]
    config: Option<PathBuf>,

    /// Number of concurrent workers
    #[clap(long)]
    workers: Option<usize>,

    /// Acquire/release rounds per worker
    #[clap(long)]
    iterations: Option<usize>,

    /// Units in each pool
    #[clap(long)]
    capacity: Option<usize>,

    /// Smallest amount a worker asks for
    #[clap(long)]
    min_request: Option<usize>,

    /// Largest amount a worker asks for; defaults to at most the capacity
    #[clap(long)]
    max_request: Option<usize>,

    /// Shortest hold or pause in microseconds
    #[clap(long)]
    min_delay_us: Option<u64>,

    /// Longest hold or pause in microseconds
    #[clap(long)]
    max_delay_us: Option<u64>,

    /// Seed for reproducible load
    #[clap(long)]
    seed: Option<u64>,

    /// Where pool trace events go
    #[clap(long, value_enum, default_value = "log")]
    trace: TraceOutput,

    /// Log filter, e.g. "info" or "tally_pool=debug"
    #[clap(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum TraceOutput {
    /// Through the logger at info level
    Log,
    /// One JSON object per line on stdout
    Json,
    /// Discard
    Off,
}

impl Cli {
    fn mode(&self) -> Mode {
        self.mode.parse().unwrap_or_else(|e| {
            warn!("{}; running both", e);
            Mode::Both
        })
    }

    fn harness_config(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => HarnessConfig::default(),
        };

        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
            // A smaller pool shrinks the default request range with it
            if self.max_request.is_none() {
                config.max_request = config.max_request.min(capacity);
            }
            if self.min_request.is_none() {
                config.min_request = config.min_request.min(config.max_request);
            }
        }
        if let Some(min_request) = self.min_request {
            config.min_request = min_request;
        }
        if let Some(max_request) = self.max_request {
            config.max_request = max_request;
        }
        if let Some(min_delay_us) = self.min_delay_us {
            config.min_delay_us = min_delay_us;
        }
        if let Some(max_delay_us) = self.max_delay_us {
            config.max_delay_us = max_delay_us;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        Ok(config)
    }

    fn trace_sink(&self) -> Arc<dyn TraceSink> {
        match self.trace {
            TraceOutput::Log => Arc::new(LogSink),
            TraceOutput::Json => Arc::new(JsonSink::stdout()),
            TraceOutput::Off => Arc::new(NullSink),
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level))?;

    // Logs go to stderr so stdout carries only the report and JSON traces
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    Ok(())
}

fn print_sample(sample: &SampleReport) {
    println!("naive ends free={}", sample.unsync_free);
    for step in sample.failures() {
        println!("{} not enough for {}", step.pool, step.amount);
    }
    println!("lock ends free={}", sample.guarded_free);
    println!("lock cleared free={}", sample.guarded_cleared);
}

fn print_report(report: &HarnessReport) {
    println!("{}", report);
    if report.timed_out {
        println!(
            "{}: cancelled {} workers still running at the deadline",
            report.variant, report.cancelled_workers
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mode = cli.mode();
    let config = cli.harness_config()?;
    debug!("Running mode {} with {:?}", mode, config);

    let harness = Harness::new(config)?.with_sink(cli.trace_sink());
    let run = harness.run(mode)?;

    print_sample(&run.sample);
    for report in &run.variants {
        print_report(report);
    }
    println!("Done.");

    Ok(())
}
