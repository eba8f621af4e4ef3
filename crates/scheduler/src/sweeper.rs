//! Periodic sweeper with tolerance windows and non-overlapping ticks.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::handler::{DueEntry, JobError, JobHandler, Recurrence};
use crate::queue::QueueError;
use crate::schedule::JobQueue;

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Name for logging
    pub name: String,
    /// Pause between the end of one sweep and the start of the next
    pub interval: Duration,
    /// Half-width of the due window around "now"
    pub tolerance: Duration,
    /// Upper bound on a single handler invocation
    pub handler_timeout: Option<Duration>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            name: "sweeper".to_string(),
            interval: Duration::from_secs(60 * 60),
            tolerance: Duration::from_secs(60 * 60),
            handler_timeout: None,
        }
    }
}

impl SweeperConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }
}

/// Inclusive score range `[now - tolerance, now + tolerance]`.
///
/// A sweep picks up everything scored at or below `max`. Keys older than `min`
/// are overdue (missed ticks, downtime, repeated failures) and are caught up
/// rather than stranded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepWindow {
    pub min: i64,
    pub max: i64,
}

impl SweepWindow {
    pub fn around(now: i64, tolerance: Duration) -> Self {
        let tolerance = i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX);
        Self {
            min: now.saturating_sub(tolerance),
            max: now.saturating_add(tolerance),
        }
    }

    pub fn contains(&self, score: i64) -> bool {
        self.min <= score && score <= self.max
    }
}

/// Outcome of one completed sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub window: SweepWindow,
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `(key, error message)` for every key whose handler failed.
    pub failures: Vec<(String, String)>,
}

/// A sweep that stopped early on an infrastructure failure.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("queue failure during sweep: {0}")]
    Queue(#[from] QueueError),
    #[error("handler for {key} hit an infrastructure failure: {source}")]
    Handler {
        key: String,
        #[source]
        source: JobError,
    },
}

/// Running totals across sweeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweeperStats {
    pub sweeps: u64,
    pub aborted: u64,
    /// Keys handed to the handler, including the one that aborted a sweep.
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// `now` of the most recent sweep, completed or aborted.
    pub last_sweep_at: Option<i64>,
    /// Wall time of the most recent sweep.
    pub last_sweep_duration: Option<Duration>,
}

/// Drives one [`JobHandler`] over one [`JobQueue`].
pub struct Sweeper {
    jobs: JobQueue,
    handler: Arc<dyn JobHandler>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
    stats: Arc<Mutex<SweeperStats>>,
}

impl Sweeper {
    pub fn new(
        jobs: JobQueue,
        handler: Arc<dyn JobHandler>,
        clock: Arc<dyn Clock>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            jobs,
            handler,
            clock,
            config,
            stats: Arc::new(Mutex::new(SweeperStats::default())),
        }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    pub fn stats(&self) -> SweeperStats {
        self.stats.lock().expect("sweeper stats lock poisoned").clone()
    }

    /// Sweep at the clock's current time.
    pub async fn run_once(&self) -> Result<SweepReport, SweepError> {
        self.sweep_at(self.clock.now()).await
    }

    /// Process every key due by `now + tolerance`, oldest first.
    ///
    /// Overdue keys (scored before `now - tolerance`) are included, so an
    /// entry that missed its window is picked up late instead of being lost.
    ///
    /// Handler failures are recorded per key and the sweep moves on. A queue
    /// failure, whether from the sweep itself or raised by a handler, ends the
    /// sweep immediately; keys already handled keep their results.
    pub async fn sweep_at(&self, now: i64) -> Result<SweepReport, SweepError> {
        let started = Instant::now();
        let mut processed = 0usize;
        let result = self.sweep_inner(now, &mut processed).await;
        let elapsed = started.elapsed();

        let mut stats = self.stats.lock().expect("sweeper stats lock poisoned");
        stats.sweeps += 1;
        stats.processed += processed as u64;
        stats.last_sweep_at = Some(now);
        stats.last_sweep_duration = Some(elapsed);
        match &result {
            Ok(report) => {
                stats.succeeded += report.succeeded as u64;
                stats.failed += report.failed as u64;
            }
            Err(_) => stats.aborted += 1,
        }
        result
    }

    async fn sweep_inner(
        &self,
        now: i64,
        processed: &mut usize,
    ) -> Result<SweepReport, SweepError> {
        let window = SweepWindow::around(now, self.config.tolerance);
        let keys = self.jobs.queue().range_by_score(i64::MIN, window.max).await?;

        let mut report = SweepReport {
            window,
            due: keys.len(),
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
        };

        for key in keys {
            *processed += 1;
            match self.process_key(&key, now).await? {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    warn!(
                        sweeper = %self.config.name,
                        handler = self.handler.name(),
                        key = %key,
                        error = %e,
                        "job failed; will retry next sweep"
                    );
                    report.failed += 1;
                    report.failures.push((key, e.to_string()));
                }
            }
        }

        info!(
            sweeper = %self.config.name,
            now,
            window_min = window.min,
            window_max = window.max,
            due = report.due,
            succeeded = report.succeeded,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    /// Outer `Err` aborts the sweep; inner `Err` is a per-key failure.
    async fn process_key(
        &self,
        key: &str,
        now: i64,
    ) -> Result<Result<(), JobError>, SweepError> {
        let fields = self.jobs.fields(key).await?;
        let entry = DueEntry {
            key: key.to_string(),
            fields,
            now,
        };
        debug!(sweeper = %self.config.name, key = %key, "processing due key");

        let outcome = match self.config.handler_timeout {
            Some(limit) => tokio::time::timeout(limit, self.handler.process(&entry))
                .await
                .unwrap_or(Err(JobError::Timeout(limit))),
            None => self.handler.process(&entry).await,
        };

        match outcome {
            Ok(()) => {
                if self.handler.recurrence() == Recurrence::OneShot {
                    self.jobs.complete(key).await?;
                }
                Ok(Ok(()))
            }
            Err(e) if e.is_infrastructure() => Err(SweepError::Handler {
                key: key.to_string(),
                source: e,
            }),
            Err(e) => Ok(Err(e)),
        }
    }

    /// Run sweeps on a background task until the handle is shut down.
    ///
    /// The next sweep starts `interval` after the previous one finished, so
    /// sweeps never overlap.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();

        let join = tokio::spawn(async move {
            info!(
                sweeper = %self.config.name,
                handler = self.handler.name(),
                interval_secs = self.config.interval.as_secs(),
                tolerance_secs = self.config.tolerance.as_secs(),
                "sweeper started"
            );

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                if let Err(e) = self.run_once().await {
                    error!(sweeper = %self.config.name, error = %e, "sweep aborted");
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.config.interval) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(sweeper = %self.config.name, "sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

/// Handle to control a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SweeperStats>>,
}

impl SweeperHandle {
    /// Stop the timer and wait for any in-flight sweep to finish.
    ///
    /// Returns the totals as of the last sweep.
    pub async fn shutdown(mut self) -> SweeperStats {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "sweeper task panicked");
            }
        }
        self.stats()
    }

    pub fn stats(&self) -> SweeperStats {
        self.stats.lock().expect("sweeper stats lock poisoned").clone()
    }
}
