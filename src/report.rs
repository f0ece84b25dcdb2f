use std::fmt;

use serde::Serialize;

use crate::{error::ErrorKind, sweep::TrialResult};

/// Failed trials by kind, so crashes and output mismatches stay distinguishable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub timeout: usize,
    pub launch_failure: usize,
    pub extraction_failure: usize,
    pub out_of_range: usize,
    pub aborted: usize,
}

impl FailureSummary {
    fn record(&mut self, error: &ErrorKind) {
        match error {
            ErrorKind::Timeout(_) => self.timeout += 1,
            ErrorKind::LaunchFailure(_) => self.launch_failure += 1,
            ErrorKind::ExtractionFailure => self.extraction_failure += 1,
            ErrorKind::OutOfRange(_) => self.out_of_range += 1,
            ErrorKind::Aborted(_) => self.aborted += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.timeout
            + self.launch_failure
            + self.extraction_failure
            + self.out_of_range
            + self.aborted
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Number of trials that produced metrics.
    pub total_tested: usize,
    pub best_by_hit_rate: Option<TrialResult>,
    pub best_by_amat: Option<TrialResult>,
    /// Successful trials, ascending by AMAT, input order on ties.
    pub ranked: Vec<TrialResult>,
    pub failures: FailureSummary,
}

impl SweepReport {
    #[must_use]
    pub fn has_results(&self) -> bool {
        self.total_tested > 0
    }
}

/// Reduces the sweep's trial results into a ranked report.
#[must_use]
pub fn aggregate(results: &[TrialResult]) -> SweepReport {
    let mut failures = FailureSummary::default();
    let mut valid: Vec<(f64, f64, &TrialResult)> = Vec::with_capacity(results.len());
    for result in results {
        match (result.error(), result.metrics()) {
            (Some(error), _) => failures.record(error),
            (None, Some(metrics)) => {
                valid.push((metrics.hit_rate_percent, metrics.amat_cycles, result));
            }
            (None, None) => {}
        }
    }

    // Strict comparisons keep the first occurrence on ties.
    let mut best_by_hit_rate: Option<(f64, &TrialResult)> = None;
    let mut best_by_amat: Option<(f64, &TrialResult)> = None;
    for &(hit_rate, amat, result) in &valid {
        if best_by_hit_rate.is_none_or(|(best, _)| hit_rate > best) {
            best_by_hit_rate = Some((hit_rate, result));
        }
        if best_by_amat.is_none_or(|(best, _)| amat < best) {
            best_by_amat = Some((amat, result));
        }
    }

    // `sort_by` is stable.
    valid.sort_by(|a, b| a.1.total_cmp(&b.1));

    SweepReport {
        total_tested: valid.len(),
        best_by_hit_rate: best_by_hit_rate.map(|(_, result)| result.clone()),
        best_by_amat: best_by_amat.map(|(_, result)| result.clone()),
        ranked: valid.into_iter().map(|(_, _, result)| result.clone()).collect(),
        failures,
    }
}

struct Line<'a>(&'a TrialResult);

impl fmt::Display for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0.configuration();
        write!(
            f,
            "Block Size: {:>3}, Assoc: {:>2}, Policy: {:<6}",
            config.block_size, config.associativity, config.policy
        )?;
        if let Some(metrics) = self.0.metrics() {
            write!(
                f,
                ", Hit Rate: {:>8.4}%, AMAT: {:>8.4} cycles",
                metrics.hit_rate_percent, metrics.amat_cycles
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_results() {
            writeln!(f, "No valid results obtained.")?;
        } else {
            writeln!(f, "Total configurations tested: {}", self.total_tested)?;
            if let Some(best) = &self.best_by_hit_rate {
                writeln!(f, "\n== Best by hit rate ==")?;
                writeln!(f, "  {}", Line(best))?;
            }
            if let Some(best) = &self.best_by_amat {
                writeln!(f, "\n== Best by AMAT ==")?;
                writeln!(f, "  {}", Line(best))?;
            }
            writeln!(f, "\n== All results (sorted by AMAT) ==")?;
            for result in &self.ranked {
                writeln!(f, "  {}", Line(result))?;
            }
        }
        let failures = &self.failures;
        if failures.total() > 0 {
            writeln!(
                f,
                "\nFailed trials: {} (timeout {}, launch {}, extraction {}, out of range {}, aborted {})",
                failures.total(),
                failures.timeout,
                failures.launch_failure,
                failures.extraction_failure,
                failures.out_of_range,
                failures.aborted
            )?;
        }
        Ok(())
    }
}
