//! Fixed-interval background driver for periodic jobs (the channel sweep).
//!
//! - One task per scheduler; `start` is idempotent.
//! - The first run happens immediately, then every `interval`.
//! - `stop` cancels and waits for the task to exit, so no run overlaps shutdown.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self);
}

#[derive(Clone)]
pub struct MonitorScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    job: Arc<dyn PeriodicJob>,
    interval: Duration,
    state: tokio::sync::Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    task: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
    last_run: Option<DateTime<Utc>>,
    runs: u64,
}

impl MonitorScheduler {
    pub fn new(job: Arc<dyn PeriodicJob>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                job,
                interval: interval.max(Duration::from_secs(1)),
                state: tokio::sync::Mutex::new(SchedulerState::default()),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Spawn the loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut st = self.inner.state.lock().await;
        if st.task.as_ref().is_some_and(|t| !t.is_finished()) {
            tracing::debug!(job = self.inner.job.name(), "scheduler already running");
            return false;
        }

        let tok = CancellationToken::new();
        st.cancel = Some(tok.clone());
        let scheduler = self.clone();
        st.task = Some(tokio::spawn(async move {
            scheduler.run_loop(tok).await;
        }));

        tracing::info!(
            job = self.inner.job.name(),
            interval_secs = self.inner.interval.as_secs(),
            "scheduler started"
        );
        true
    }

    /// Cancel the loop and wait for it to exit. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let (cancel, task) = {
            let mut st = self.inner.state.lock().await;
            (st.cancel.take(), st.task.take())
        };

        let Some(task) = task else {
            return false;
        };
        if let Some(tok) = cancel {
            tok.cancel();
        }
        if let Err(e) = task.await {
            tracing::error!(job = self.inner.job.name(), "scheduler task ended abnormally: {e}");
        }

        tracing::info!(job = self.inner.job.name(), "scheduler stopped");
        true
    }

    pub async fn is_running(&self) -> bool {
        let st = self.inner.state.lock().await;
        st.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn last_run(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().await.last_run
    }

    pub async fn runs(&self) -> u64 {
        self.inner.state.lock().await.runs
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.inner.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = tick.tick() => {}
            }

            let job = self.inner.job.clone();
            tracing::debug!(job = job.name(), "running periodic job");
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = job.run() => {}
            }

            let mut st = self.inner.state.lock().await;
            st.last_run = Some(Utc::now());
            st.runs += 1;
        }
    }
}
