use std::{fmt, path::PathBuf, time::Duration};

use serde::Serialize;

use crate::{
    error::ConfigError,
    trace::{AddressWidth, TraceSummary},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Policy {
    Plru,
    Fifo,
    Random,
}

impl Policy {
    pub const ALL: [Policy; 3] = [Policy::Plru, Policy::Fifo, Policy::Random];

    /// The exact `-p` argument the simulator accepts.
    #[must_use]
    pub fn as_arg(self) -> &'static str {
        match self {
            Policy::Plru => "PLRU",
            Policy::Fifo => "FIFO",
            Policy::Random => "RANDOM",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_arg())
    }
}

/// One point of the design space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Configuration {
    pub block_size: usize,    // in Bytes
    pub associativity: usize, // 1 for Direct-Mapped
    pub policy: Policy,
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {}B {}-way {}",
            self.block_size, self.associativity, self.policy
        )
    }
}

/// Everything a sweep needs, passed explicitly to the space and the runner.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub simulator: PathBuf,
    pub simulator_args: Vec<String>,
    pub cache_size_kb: usize,
    pub trace_file: PathBuf,
    pub address_width: AddressWidth,
    pub block_sizes: Vec<usize>,
    pub associativities: Vec<usize>,
    pub policies: Vec<Policy>,
    pub timeout: Duration,
    pub concurrency_limit: usize,
    pub retries: usize,
    /// Stop dispatching once this many trials have failed. `None` runs everything.
    pub max_failures: Option<usize>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            simulator: PathBuf::from("./cachesim"),
            simulator_args: Vec::new(),
            cache_size_kb: 64,
            trace_file: PathBuf::from("TRACE.bin"),
            address_width: AddressWidth::default(),
            block_sizes: vec![4, 8, 16, 32, 64],
            associativities: vec![1, 2, 4, 8],
            policies: Policy::ALL.to_vec(),
            timeout: Duration::from_secs(300),
            concurrency_limit: num_cpus::get().max(1),
            retries: 0,
            max_failures: None,
        }
    }
}

impl SweepConfig {
    /// Rejects inputs that would make the sweep meaningless, including a
    /// missing trace file.
    ///
    /// Axis checks are shared with [`crate::space::ConfigSpace::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size_kb == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }
        if self.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        crate::space::check_axes(&self.block_sizes, &self.associativities, &self.policies)?;
        let trace = TraceSummary::inspect(&self.trace_file, self.address_width)?;
        log::info!(
            "trace {} holds {} {} addresses",
            trace.path.display(),
            trace.records,
            trace.width
        );
        self.warn_unsupported();
        Ok(())
    }

    /// The simulator only accepts powers of two and at most one set's worth of ways.
    /// Such points are still dispatched and surface as failed trials.
    fn warn_unsupported(&self) {
        for &block in &self.block_sizes {
            if !block.is_power_of_two() {
                log::warn!("block size {block} is not a power of two");
            }
        }
        for &assoc in &self.associativities {
            if !assoc.is_power_of_two() {
                log::warn!("associativity {assoc} is not a power of two");
            }
        }
        let cache_bytes = self.cache_size_kb.saturating_mul(1024);
        for &block in &self.block_sizes {
            let blocks = cache_bytes / block.max(1);
            for &assoc in &self.associativities {
                if assoc > blocks {
                    log::warn!(
                        "{assoc}-way exceeds the {blocks} blocks of a {}KB cache with {block}B blocks",
                        self.cache_size_kb
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Policy, SweepConfig};
    use crate::error::ConfigError;
    use crate::testing;
    use clap::ValueEnum;
    use pretty_assertions_sorted as diff;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn policy_matches_simulator_arguments() {
        let args: Vec<_> = Policy::ALL.iter().map(ToString::to_string).collect();
        diff::assert_eq!(args, vec!["PLRU", "FIFO", "RANDOM"]);
        diff::assert_eq!(Policy::from_str("fifo", true), Ok(Policy::Fifo));
        diff::assert_eq!(Policy::from_str("RANDOM", true), Ok(Policy::Random));
        assert!(Policy::from_str("LRU", true).is_err());
    }

    #[test]
    fn default_matches_reference_sweep() {
        let config = SweepConfig::default();
        diff::assert_eq!(config.trace_file, PathBuf::from("TRACE.bin"));
        diff::assert_eq!(config.cache_size_kb, 64);
        diff::assert_eq!(config.block_sizes, vec![4, 8, 16, 32, 64]);
        diff::assert_eq!(config.associativities, vec![1, 2, 4, 8]);
        diff::assert_eq!(config.timeout, Duration::from_secs(300));
        diff::assert_eq!(config.retries, 0);
        diff::assert_eq!(config.max_failures, None);
    }

    #[test]
    fn missing_trace_is_fatal() -> anyhow::Result<()> {
        let config = SweepConfig {
            trace_file: PathBuf::from("/nonexistent/TRACE.bin"),
            ..SweepConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingTrace(_))));

        let config = SweepConfig {
            trace_file: testing::trace_file("validate.bin", 16)?,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_ok());
        Ok(())
    }

    #[test]
    fn validate_rejects_misconfiguration() {
        let config = SweepConfig {
            block_sizes: vec![],
            ..SweepConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyAxis("block sizes"))
        ));

        let config = SweepConfig {
            associativities: vec![2, 0],
            ..SweepConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                axis: "associativity",
                value: 0
            })
        ));

        let config = SweepConfig {
            concurrency_limit: 0,
            ..SweepConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroConcurrency)));

        let config = SweepConfig {
            timeout: Duration::ZERO,
            ..SweepConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));

        let config = SweepConfig {
            cache_size_kb: 0,
            ..SweepConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCacheSize)));
    }

    #[test]
    fn unsupported_values_only_warn() -> anyhow::Result<()> {
        testing::init_logging();
        let config = SweepConfig {
            trace_file: testing::trace_file("unsupported.bin", 16)?,
            block_sizes: vec![12],
            associativities: vec![3, 1 << 20],
            ..SweepConfig::default()
        };
        assert!(config.validate().is_ok());
        Ok(())
    }

    #[test]
    fn huge_cache_size_does_not_overflow() -> anyhow::Result<()> {
        let config = SweepConfig {
            trace_file: testing::trace_file("huge.bin", 16)?,
            cache_size_kb: usize::MAX,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_ok());
        Ok(())
    }
}
