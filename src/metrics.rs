use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::{config::Configuration, error::ErrorKind};

/// Cycles for a hit, also paid as request overhead on a miss.
pub const HIT_COST: f64 = 2.0;
/// Cycles to fetch one 4-byte word from memory.
pub const WORD_FETCH_COST: f64 = 28.0;
pub const WORD_BYTES: f64 = 4.0;

/// Matches the simulator's summary line, e.g. `命中率:     97.1234%`.
pub const DEFAULT_HIT_RATE_PATTERN: &str = r"命中率\s*[:：]\s*(-?[\d.]+)\s*%";

static HIT_RATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_HIT_RATE_PATTERN).expect("failed to compile regex"));

/// Recovers a hit-rate percentage from raw simulator output.
pub trait HitRateParser: Send + Sync {
    fn parse(&self, output: &str) -> Option<f64>;
}

impl<F> HitRateParser for F
where
    F: Fn(&str) -> Option<f64> + Send + Sync,
{
    fn parse(&self, output: &str) -> Option<f64> {
        self(output)
    }
}

/// Regex based parser. The first capture group must hold the number.
#[derive(Debug, Clone)]
pub struct RegexHitRate {
    pattern: Regex,
}

impl Default for RegexHitRate {
    fn default() -> Self {
        Self {
            pattern: HIT_RATE_PATTERN.clone(),
        }
    }
}

impl RegexHitRate {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl HitRateParser for RegexHitRate {
    fn parse(&self, output: &str) -> Option<f64> {
        let captures = self.pattern.captures(output)?;
        captures.get(1)?.as_str().parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub hit_rate_percent: f64,
    pub amat_cycles: f64,
}

impl Metrics {
    #[must_use]
    pub fn from_hit_rate(configuration: &Configuration, hit_rate_percent: f64) -> Self {
        Self {
            hit_rate_percent,
            amat_cycles: amat(configuration.block_size, hit_rate_percent),
        }
    }
}

/// Average memory access time in cycles.
///
/// ```text
/// hitCost  = 2.0
/// missCost = 2.0 + (blockSize / 4) * 28.0
/// missRate = (100.0 - hitRatePercent) / 100.0
/// amat     = (hitRatePercent / 100.0) * hitCost + missRate * missCost
/// ```
#[must_use]
pub fn amat(block_size: usize, hit_rate_percent: f64) -> f64 {
    let miss_cost = HIT_COST + (block_size as f64 / WORD_BYTES) * WORD_FETCH_COST;
    let miss_rate = (100.0 - hit_rate_percent) / 100.0;
    (hit_rate_percent / 100.0) * HIT_COST + miss_rate * miss_cost
}

/// Parses the hit rate out of `output` and derives AMAT for `configuration`.
pub fn extract(
    parser: &dyn HitRateParser,
    configuration: &Configuration,
    output: &str,
) -> Result<Metrics, ErrorKind> {
    let hit_rate = parser.parse(output).ok_or(ErrorKind::ExtractionFailure)?;
    if !(0.0..=100.0).contains(&hit_rate) {
        return Err(ErrorKind::OutOfRange(hit_rate));
    }
    Ok(Metrics::from_hit_rate(configuration, hit_rate))
}
