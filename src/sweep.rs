use std::{
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use serde::Serialize;

use crate::{
    config::{Configuration, SweepConfig},
    error::ErrorKind,
    metrics::{self, HitRateParser, Metrics},
    runner::Simulator,
};

/// Outcome of one trial. Either both metrics or an error are present, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    configuration: Configuration,
    hit_rate_percent: Option<f64>,
    amat_cycles: Option<f64>,
    error: Option<ErrorKind>,
}

impl TrialResult {
    #[must_use]
    pub fn success(configuration: Configuration, metrics: Metrics) -> Self {
        Self {
            configuration,
            hit_rate_percent: Some(metrics.hit_rate_percent),
            amat_cycles: Some(metrics.amat_cycles),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(configuration: Configuration, error: ErrorKind) -> Self {
        Self {
            configuration,
            hit_rate_percent: None,
            amat_cycles: None,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    #[must_use]
    pub fn hit_rate_percent(&self) -> Option<f64> {
        self.hit_rate_percent
    }

    #[must_use]
    pub fn amat_cycles(&self) -> Option<f64> {
        self.amat_cycles
    }

    #[must_use]
    pub fn error(&self) -> Option<&ErrorKind> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn metrics(&self) -> Option<Metrics> {
        Some(Metrics {
            hit_rate_percent: self.hit_rate_percent?,
            amat_cycles: self.amat_cycles?,
        })
    }
}

/// Fans trials out over a bounded worker pool and collects every outcome.
pub struct Sweep<'a> {
    simulator: &'a dyn Simulator,
    parser: &'a dyn HitRateParser,
    concurrency_limit: usize,
    retries: usize,
    max_failures: Option<usize>,
}

impl<'a> Sweep<'a> {
    pub fn new(simulator: &'a dyn Simulator, parser: &'a dyn HitRateParser) -> Self {
        Self {
            simulator,
            parser,
            concurrency_limit: num_cpus::get().max(1),
            retries: 0,
            max_failures: None,
        }
    }

    #[must_use]
    pub fn with_config(self, config: &SweepConfig) -> Self {
        self.concurrency_limit(config.concurrency_limit)
            .retries(config.retries)
            .max_failures(config.max_failures)
    }

    #[must_use]
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn max_failures(mut self, max_failures: Option<usize>) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Runs the simulator and extracts metrics, retrying transient failures.
    pub fn run_trial(&self, configuration: &Configuration) -> TrialResult {
        let mut attempt = 0;
        loop {
            let outcome = self
                .simulator
                .run(configuration)
                .and_then(|output| metrics::extract(self.parser, configuration, &output));
            match outcome {
                Ok(metrics) => return TrialResult::success(*configuration, metrics),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    log::warn!("{configuration}: {err}, retrying ({attempt}/{})", self.retries);
                }
                Err(err) => {
                    log::warn!("{configuration}: {err}");
                    return TrialResult::failure(*configuration, err);
                }
            }
        }
    }

    /// A panicking simulator or parser fails only its own trial.
    fn run_isolated(&self, configuration: &Configuration) -> TrialResult {
        panic::catch_unwind(AssertUnwindSafe(|| self.run_trial(configuration))).unwrap_or_else(
            |payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|msg| (*msg).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!("{configuration}: trial panicked: {message}");
                TrialResult::failure(
                    *configuration,
                    ErrorKind::LaunchFailure(format!("trial panicked: {message}")),
                )
            },
        )
    }

    /// Runs every configuration exactly once and blocks until all are done.
    ///
    /// Results come back in the order of `configurations`.
    pub fn run(&self, configurations: &[Configuration]) -> Vec<TrialResult> {
        let total = configurations.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.concurrency_limit.min(total);
        log::info!("dispatching {total} trials on {workers} workers");

        // Each index is claimed by exactly one worker.
        let next = AtomicUsize::new(0);
        let failures = AtomicUsize::new(0);
        let (tx, rx) = crossbeam::channel::unbounded::<(usize, TrialResult)>();
        let mut completed = Vec::with_capacity(total);

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let (next, failures) = (&next, &failures);
                scope.spawn(move || {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(configuration) = configurations.get(index) else {
                            break;
                        };
                        let result = match self.max_failures {
                            Some(limit) if failures.load(Ordering::Acquire) >= limit => {
                                TrialResult::failure(*configuration, ErrorKind::Aborted(limit))
                            }
                            _ => {
                                let result = self.run_isolated(configuration);
                                if result.error().is_some() {
                                    failures.fetch_add(1, Ordering::AcqRel);
                                }
                                result
                            }
                        };
                        if tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (index, result) in rx.iter() {
                completed.push((index, result));
                log::debug!(
                    "[{}/{total}] {} done",
                    completed.len(),
                    configurations[index]
                );
            }
        });

        debug_assert_eq!(completed.len(), total);
        completed.sort_by_key(|(index, _)| *index);
        completed.into_iter().map(|(_, result)| result).collect()
    }
}
