use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use cache_sweep::{
    AddressWidth, Policy, ProcessSimulator, RegexHitRate, SweepConfig, SweepReport,
    metrics::DEFAULT_HIT_RATE_PATTERN,
};
use clap::{ArgAction, Parser, ValueEnum};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Format {
    #[default]
    Text,
    Json,
}

/// Sweep block size, associativity and replacement policy of a cache simulator.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Options {
    /// Simulator executable
    #[arg(long, default_value = "./cachesim")]
    simulator: PathBuf,

    /// Extra argument placed before the simulator options (repeatable)
    #[arg(long = "simulator-arg", allow_hyphen_values = true)]
    simulator_args: Vec<String>,

    /// Cache size passed as `-s`
    #[arg(short = 's', long, default_value_t = 64)]
    cache_size: usize,

    /// Binary address trace passed as `-t`
    #[arg(short = 't', long)]
    trace: PathBuf,

    /// Record width of the trace, for the preflight check
    #[arg(long, value_enum, default_value_t = AddressWidth::Bits32)]
    address_width: AddressWidth,

    #[arg(short = 'b', long, value_delimiter = ',', default_values_t = [4, 8, 16, 32, 64])]
    block_sizes: Vec<usize>,

    #[arg(short = 'a', long, value_delimiter = ',', default_values_t = [1, 2, 4, 8])]
    associativities: Vec<usize>,

    #[arg(
        short = 'p',
        long,
        value_enum,
        value_delimiter = ',',
        ignore_case = true,
        default_values_t = Policy::ALL
    )]
    policies: Vec<Policy>,

    /// Per-trial timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Maximum number of simulators running at once [default: number of CPUs]
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Extra attempts for trials that time out or fail to launch
    #[arg(long, default_value_t = 0)]
    retries: usize,

    /// Stop dispatching new trials after this many failures
    #[arg(long)]
    max_failures: Option<usize>,

    /// Regex whose first capture group is the hit-rate percentage
    #[arg(long, default_value = DEFAULT_HIT_RATE_PATTERN)]
    hit_rate_pattern: String,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Increase log verbosity
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

impl Options {
    fn sweep_config(&self) -> SweepConfig {
        let defaults = SweepConfig::default();
        SweepConfig {
            simulator: self.simulator.clone(),
            simulator_args: self.simulator_args.clone(),
            cache_size_kb: self.cache_size,
            trace_file: self.trace.clone(),
            address_width: self.address_width,
            block_sizes: self.block_sizes.clone(),
            associativities: self.associativities.clone(),
            policies: self.policies.clone(),
            timeout: Duration::from_secs(self.timeout),
            concurrency_limit: self.jobs.unwrap_or(defaults.concurrency_limit),
            retries: self.retries,
            max_failures: self.max_failures,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let options = Options::parse();
    init_logging(options.verbose);

    let config = options.sweep_config();
    let parser = RegexHitRate::new(&options.hit_rate_pattern)
        .with_context(|| format!("invalid hit rate pattern {:?}", options.hit_rate_pattern))?;
    let simulator = ProcessSimulator::from_config(&config);

    let report = cache_sweep::run_sweep(&config, &simulator, &parser)
        .context("sweep misconfigured, no trial was run")?;
    print_report(&report, options.format)
}

fn print_report(report: &SweepReport, format: Format) -> Result<()> {
    match format {
        Format::Text => print!("{report}"),
        Format::Json => {
            let json =
                serde_json::to_string_pretty(report).context("failed to serialize report")?;
            println!("{json}");
        }
    }
    Ok(())
}
