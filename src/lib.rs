pub mod config;
pub mod error;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod space;
pub mod sweep;
pub mod trace;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Configuration, Policy, SweepConfig};
pub use error::{ConfigError, ErrorKind};
pub use metrics::{HitRateParser, Metrics, RegexHitRate, amat};
pub use report::{FailureSummary, SweepReport, aggregate};
pub use runner::{ProcessSimulator, Simulator};
pub use space::ConfigSpace;
pub use sweep::{Sweep, TrialResult};
pub use trace::{AddressWidth, TraceSummary};

/// Validates `config`, runs every trial and ranks the outcome.
///
/// Only misconfiguration is an error; failed trials end up in the report.
pub fn run_sweep(
    config: &SweepConfig,
    simulator: &dyn Simulator,
    parser: &dyn HitRateParser,
) -> Result<SweepReport, ConfigError> {
    config.validate()?;
    let space = ConfigSpace::from_config(config)?;
    let configurations = space.configurations();
    let results = Sweep::new(simulator, parser)
        .with_config(config)
        .run(&configurations);
    let report = aggregate(&results);
    log::info!(
        "{} of {} trials produced a hit rate",
        report.total_tested,
        configurations.len()
    );
    Ok(report)
}
