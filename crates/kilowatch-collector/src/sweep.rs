//! The poll loop: fan out, record, sleep, repeat

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use kilowatch_client::DevicePoller;
use kilowatch_core::{PollOutcome, Sample, SubResource, Target};
use kilowatch_metrics::ExporterMetrics;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerBoard, BreakerSettings};

type PollResult = (Arc<Target>, SubResource, PollOutcome, Duration);

/// Drives poll cycles across all configured targets
#[derive(Debug)]
pub struct Collector {
    targets: Vec<Arc<Target>>,
    poller: Arc<dyn DevicePoller>,
    metrics: Arc<ExporterMetrics>,
    breakers: BreakerBoard,
    poll_interval: Duration,
}

impl Collector {
    /// Create a collector over `targets`
    pub fn new(
        targets: Vec<Target>,
        poller: Arc<dyn DevicePoller>,
        metrics: Arc<ExporterMetrics>,
        settings: BreakerSettings,
        poll_interval: Duration,
    ) -> Self {
        Self {
            targets: targets.into_iter().map(Arc::new).collect(),
            poller,
            metrics,
            breakers: BreakerBoard::new(settings),
            poll_interval,
        }
    }

    /// Run poll cycles until `shutdown` fires.
    ///
    /// Readiness is marked after the first completed sweep. A cycle that
    /// overruns the interval is followed immediately by the next one; the
    /// inter-cycle sleep is interrupted promptly by shutdown, and no new
    /// cycle starts afterwards.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            targets = self.targets.len(),
            interval = ?self.poll_interval,
            "collector loop starting"
        );

        loop {
            let started = Instant::now();
            self.sweep_once().await;
            self.metrics.mark_ready();

            let sleep_for = self.poll_interval.saturating_sub(started.elapsed());
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("collector loop stopping");
                    return;
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// Run one sweep: one poll task per (target, sub-resource) pair, with
    /// cooling-down devices skipped as a whole. Completions are consumed as
    /// they arrive, so buffered results never grow with the target count.
    pub async fn sweep_once(&self) {
        let started = Instant::now();
        let mut tasks: JoinSet<PollResult> = JoinSet::new();
        let mut skipped = 0usize;

        for target in &self.targets {
            if !self.breakers.admit(&target.addr) {
                // Counts as a failed cycle for the device, without traffic.
                self.metrics.record_scrape_failure(target);
                skipped += 1;
                continue;
            }

            for sub in target.sub_resources() {
                let poller = Arc::clone(&self.poller);
                let target = Arc::clone(target);
                tasks.spawn(async move {
                    let poll_started = Instant::now();
                    let outcome = poller.poll(&target, &sub).await;
                    (target, sub, outcome, poll_started.elapsed())
                });
            }
        }

        let polls = tasks.len();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((target, sub, outcome, took)) => self.record(&target, &sub, outcome, took),
                // A panicked or cancelled task must not take the cycle down.
                Err(err) => warn!(error = %err, "poll task aborted"),
            }
        }

        debug!(
            polls,
            skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sweep complete"
        );
    }

    /// Fold one poll outcome into metrics and breaker state
    fn record(&self, target: &Target, sub: &SubResource, outcome: PollOutcome, took: Duration) {
        self.metrics.observe_scrape_duration(took);

        match outcome {
            PollOutcome::Sample(sample) => {
                match sample {
                    Sample::Outlet { outlet, reading } => {
                        if reading.is_empty() {
                            debug!(
                                target = %target.name,
                                outlet,
                                "payload carried no recognizable reading"
                            );
                        }
                        self.metrics.record_outlet(target, outlet, &reading);
                    }
                    Sample::Sensor { sensor, reading } => {
                        if reading.is_healthy() == Some(false) {
                            warn!(
                                target = %target.name,
                                sensor = %sensor,
                                health = reading.health.as_deref().unwrap_or(""),
                                location = reading.location.as_deref().unwrap_or(""),
                                "sensor reports degraded health"
                            );
                        }
                        self.metrics.record_sensor(target, &sensor, &reading);
                    }
                }
                self.metrics.record_scrape_success(target, SystemTime::now());
                self.breakers.record_success(&target.addr);
            }
            // Confirmed absence is not a failure: no gauge, no streak.
            PollOutcome::Absent => {
                debug!(target = %target.name, sub = %sub, "sub-resource absent");
            }
            PollOutcome::Failed(err) => {
                warn!(
                    target = %target.name,
                    sub = %sub,
                    kind = err.kind(),
                    error = %err,
                    "poll failed"
                );
                self.metrics.record_scrape_failure(target);
                self.breakers.record_failure(&target.addr);
            }
        }
    }
}
