//! Single-task driver for the tracker.
//!
//! Ticks and commands are handled on one task, so a polling cycle never
//! interleaves with a rollback scan or commit, or with another cycle.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, trace};

use statwatch_common::EntityId;

use crate::rollback::{CommitReport, RollbackScope, ScanOutcome, StagedCorrection};
use crate::tracker::{CycleOutcome, Tracker, TrackerError};
use crate::types::TrackerStatus;

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, TrackerError>>;

pub enum TrackerCommand {
    Track(EntityId, Reply<bool>),
    Untrack(EntityId, Reply<bool>),
    BeginRollback(RollbackScope, Reply<ScanOutcome>),
    StagedRollback(oneshot::Sender<Vec<StagedCorrection>>),
    CommitRollback(Reply<CommitReport>),
    DiscardRollback(Reply<usize>),
    Enable(oneshot::Sender<()>),
    Status(oneshot::Sender<TrackerStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front door to a running tracker task.
#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<TrackerCommand>,
}

impl TrackerHandle {
    pub fn new(tx: mpsc::Sender<TrackerCommand>) -> Self {
        Self { tx }
    }

    pub async fn track(&self, id: EntityId) -> Result<bool, TrackerError> {
        self.request(|reply| TrackerCommand::Track(id, reply)).await?
    }

    pub async fn untrack(&self, id: EntityId) -> Result<bool, TrackerError> {
        self.request(|reply| TrackerCommand::Untrack(id, reply)).await?
    }

    pub async fn begin_rollback(&self, scope: RollbackScope) -> Result<ScanOutcome, TrackerError> {
        self.request(|reply| TrackerCommand::BeginRollback(scope, reply))
            .await?
    }

    pub async fn staged_rollback(&self) -> Result<Vec<StagedCorrection>, TrackerError> {
        self.request(TrackerCommand::StagedRollback).await
    }

    pub async fn commit_rollback(&self) -> Result<CommitReport, TrackerError> {
        self.request(TrackerCommand::CommitRollback).await?
    }

    pub async fn discard_rollback(&self) -> Result<usize, TrackerError> {
        self.request(TrackerCommand::DiscardRollback).await?
    }

    pub async fn enable(&self) -> Result<(), TrackerError> {
        self.request(TrackerCommand::Enable).await
    }

    pub async fn status(&self) -> Result<TrackerStatus, TrackerError> {
        self.request(TrackerCommand::Status).await
    }

    pub async fn shutdown(&self) -> Result<(), TrackerError> {
        self.request(TrackerCommand::Shutdown).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TrackerCommand,
    ) -> Result<T, TrackerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| TrackerError::Stopped)?;
        rx.await.map_err(|_| TrackerError::Stopped)
    }
}

/// Spawn the tracker task. Returns its handle and join handle.
pub fn spawn(tracker: Tracker, tick_interval: Duration) -> (TrackerHandle, JoinHandle<Tracker>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run(tracker, tick_interval, rx));
    (TrackerHandle::new(tx), task)
}

/// Run until shutdown or until every handle is dropped. Returns the tracker.
pub async fn run(
    mut tracker: Tracker,
    tick_interval: Duration,
    mut commands: mpsc::Receiver<TrackerCommand>,
) -> Tracker {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = tick_interval.as_millis() as u64, "Tracker loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => run_tick(&mut tracker).await,
            command = commands.recv() => match command {
                Some(TrackerCommand::Shutdown(reply)) => {
                    let _ = reply.send(());
                    break;
                }
                Some(command) => handle_command(&mut tracker, command).await,
                None => break,
            },
        }
    }

    info!(status = %tracker.status(), "Tracker loop stopped");
    tracker
}

async fn run_tick(tracker: &mut Tracker) {
    match tracker.tick(Utc::now()).await {
        Ok(CycleOutcome::Polled { entity, outcome }) => {
            trace!(entity = %entity, outcome = ?outcome, "Cycle complete");
        }
        Ok(CycleOutcome::Skipped) | Ok(CycleOutcome::Disabled) => {}
        Err(e) => error!(error = %e, "Polling cycle failed"),
    }
}

async fn handle_command(tracker: &mut Tracker, command: TrackerCommand) {
    // A dropped receiver means the caller gave up; nothing to do.
    match command {
        TrackerCommand::Track(id, reply) => {
            let _ = reply.send(tracker.track(id).await);
        }
        TrackerCommand::Untrack(id, reply) => {
            let _ = reply.send(tracker.untrack(&id).await);
        }
        TrackerCommand::BeginRollback(scope, reply) => {
            let _ = reply.send(tracker.begin_rollback(scope).await);
        }
        TrackerCommand::StagedRollback(reply) => {
            let _ = reply.send(tracker.staged_rollback());
        }
        TrackerCommand::CommitRollback(reply) => {
            let _ = reply.send(tracker.commit_rollback(Utc::now()).await);
        }
        TrackerCommand::DiscardRollback(reply) => {
            let _ = reply.send(tracker.discard_rollback());
        }
        TrackerCommand::Enable(reply) => {
            tracker.enable();
            let _ = reply.send(());
        }
        TrackerCommand::Status(reply) => {
            let _ = reply.send(tracker.status());
        }
        TrackerCommand::Shutdown(reply) => {
            let _ = reply.send(());
        }
    }
}
