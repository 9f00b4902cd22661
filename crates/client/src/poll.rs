use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};
use trolley_core::ListAggregate;

use crate::error::ClientError;
use crate::session::ListSession;

/// Decides which refreshes run. Timer ticks are dropped while a refresh is
/// outstanding; manual refreshes always run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollScheduler {
    in_flight: u32,
    skipped: u64,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A timer tick arrived. Returns whether a refresh should start.
    pub fn on_tick(&mut self) -> bool {
        if self.in_flight > 0 {
            self.skipped += 1;
            return false;
        }
        self.in_flight += 1;
        true
    }

    /// A manual refresh was requested. Always starts one.
    pub fn on_manual(&mut self) {
        self.in_flight += 1;
    }

    /// A refresh finished, successfully or not.
    pub fn finish(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight > 0
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[derive(Debug)]
enum PollCommand {
    Refresh,
    Stop,
}

/// Background driver that refreshes a session on a fixed interval.
pub struct Poller;

impl Poller {
    /// Start polling `session` every `session.config().poll_interval`. The
    /// first timer refresh happens one interval from now.
    pub fn spawn(session: ListSession) -> PollHandle {
        let (commands, command_rx) = mpsc::channel(8);
        let (aggregate_tx, aggregate_rx) = watch::channel(session.aggregate());
        let task = tokio::spawn(run(session, command_rx, Arc::new(aggregate_tx)));
        PollHandle {
            commands,
            aggregate: aggregate_rx,
            task: Some(task),
        }
    }
}

/// Owner side of a running poller. Dropping it cancels the loop along with
/// any refresh it still has in flight.
pub struct PollHandle {
    commands: mpsc::Sender<PollCommand>,
    aggregate: watch::Receiver<ListAggregate>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Refresh now, clear editing markers, and restart the interval.
    pub async fn refresh_now(&self) -> Result<(), ClientError> {
        self.commands
            .send(PollCommand::Refresh)
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Aggregate of the cache after the most recent merge that changed it.
    pub fn aggregate(&self) -> watch::Receiver<ListAggregate> {
        self.aggregate.clone()
    }

    /// Stop polling and wait for the loop and its refreshes to wind down.
    pub async fn stop(mut self) {
        let _ = self.commands.send(PollCommand::Stop).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    session: ListSession,
    mut commands: mpsc::Receiver<PollCommand>,
    aggregate: Arc<watch::Sender<ListAggregate>>,
) {
    let period = session.config().poll_interval.max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut scheduler = PollScheduler::new();
    // dropping the set aborts whatever is still running in it
    let mut refreshes = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if scheduler.on_tick() {
                    trace!("poll tick");
                    refreshes.spawn(refresh(session.clone(), false, Arc::clone(&aggregate)));
                } else {
                    trace!(skipped = scheduler.skipped(), "poll tick skipped, refresh in flight");
                }
            }
            command = commands.recv() => match command {
                Some(PollCommand::Refresh) => {
                    scheduler.on_manual();
                    ticker.reset();
                    debug!("manual refresh");
                    refreshes.spawn(refresh(session.clone(), true, Arc::clone(&aggregate)));
                }
                Some(PollCommand::Stop) | None => break,
            },
            Some(_) = refreshes.join_next() => scheduler.finish(),
        }
    }
    let cancelled = refreshes.len();
    refreshes.abort_all();
    while refreshes.join_next().await.is_some() {}
    debug!(cancelled, "poller stopped");
}

async fn refresh(session: ListSession, manual: bool, aggregate: Arc<watch::Sender<ListAggregate>>) {
    let outcome = if manual {
        session.manual_refresh().await
    } else {
        session.refresh().await
    };
    match outcome {
        Ok(report) if report.changed() => {
            aggregate.send_replace(session.aggregate());
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "refresh failed"),
    }
}
