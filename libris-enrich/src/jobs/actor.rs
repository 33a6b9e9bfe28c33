//! Per-job actor
//!
//! Exactly one actor task per job id consumes a command mailbox, so no
//! two handlers for the same job ever run concurrently. The actor owns
//! the JobState and the progress stream; workers and API handlers only
//! talk to it through commands.

use crate::config::BatchSettings;
use crate::db;
use crate::jobs::state::{JobState, TokenEnvelope};
use crate::jobs::stream::ProgressStream;
use crate::metrics::{MetricEvent, MetricsSink};
use chrono::Utc;
use libris_common::events::{
    ItemOutcome, JobSnapshot, JobStatus, ProgressPayload, StreamMessage, TerminalPayload,
};
use libris_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Actor tick driving coalescing, pings and persist retries
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Commands accepted by a job actor
pub enum JobCommand {
    /// Validate the token and attach (or re-attach) the progress stream
    AttachStream {
        token: String,
        resume_after: Option<u64>,
        reply: oneshot::Sender<Result<mpsc::Receiver<StreamMessage>>>,
    },
    /// Client asked to resume from a sequence number mid-connection
    Resume {
        last_seq: u64,
        reply: oneshot::Sender<mpsc::Receiver<StreamMessage>>,
    },
    /// Client answered a ping
    Pong,
    /// The transport observed the client going away
    ClientDetached,
    /// A worker finished one item
    ItemCompleted {
        index: usize,
        outcome: ItemOutcome,
        book_id: Option<String>,
        error_kind: Option<String>,
    },
    /// Cancel the job (idempotent for an already-cancelled job)
    Cancel {
        token: String,
        reply: oneshot::Sender<Result<JobStatus>>,
    },
    /// Mint a successor token inside the refresh window
    RefreshToken {
        token: String,
        reply: oneshot::Sender<Result<TokenEnvelope>>,
    },
    /// Internal: the spawned token persist finished
    TokenPersisted {
        candidate: TokenEnvelope,
        persisted: bool,
        reply: oneshot::Sender<Result<TokenEnvelope>>,
    },
    /// Read-only state copy
    GetSnapshot {
        reply: oneshot::Sender<JobSnapshot>,
    },
}

/// Single-threaded owner of one job's state
pub struct JobActor {
    state: JobState,
    stream: ProgressStream,
    pool: SqlitePool,
    settings: BatchSettings,
    metrics: MetricsSink,
    rx: mpsc::Receiver<JobCommand>,
    self_tx: mpsc::Sender<JobCommand>,
    worker_cancel: CancellationToken,
    /// A persist failed and awaits retry on the next tick
    persist_pending: bool,
    /// Terminal transition happened but is not yet persisted, so the
    /// terminal stream message is still held back
    terminal_unannounced: bool,
}

impl JobActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: JobState,
        pool: SqlitePool,
        settings: BatchSettings,
        metrics: MetricsSink,
        rx: mpsc::Receiver<JobCommand>,
        self_tx: mpsc::Sender<JobCommand>,
        worker_cancel: CancellationToken,
    ) -> Self {
        let stream = ProgressStream::new(state.job_id);
        Self {
            state,
            stream,
            pool,
            settings,
            metrics,
            rx,
            self_tx,
            worker_cancel,
            persist_pending: false,
            terminal_unannounced: false,
        }
    }

    /// Run until the cleanup alarm fires or every mailbox sender is gone.
    pub async fn run(mut self) {
        tracing::info!(
            job_id = %self.state.job_id,
            total_items = self.state.total_items(),
            "Job actor started"
        );

        if self.state.status == JobStatus::Pending {
            self.state.transition_to(JobStatus::Running);
            self.metrics.emit(MetricEvent::JobTransition {
                job_id: self.state.job_id,
                status: JobStatus::Running,
            });
            self.try_persist().await;
        }

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let alarm = tokio::time::sleep(self.alarm_remaining());
            tokio::pin!(alarm);

            tokio::select! {
                maybe_cmd = self.rx.recv() => {
                    match maybe_cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => {
                            tracing::debug!(job_id = %self.state.job_id, "Mailbox closed, stopping actor");
                            break;
                        }
                    }
                }
                _ = tick.tick() => {
                    self.on_tick().await;
                }
                _ = &mut alarm => {
                    self.on_alarm().await;
                    break;
                }
            }
        }

        tracing::info!(job_id = %self.state.job_id, "Job actor stopped");
    }

    fn alarm_remaining(&self) -> Duration {
        (self.state.alarm_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    async fn handle(&mut self, cmd: JobCommand) {
        match cmd {
            JobCommand::AttachStream {
                token,
                resume_after,
                reply,
            } => {
                let result = self.attach_stream(&token, resume_after);
                let _ = reply.send(result);
            }
            JobCommand::Resume { last_seq, reply } => {
                let rx = self.stream.attach(self.state.snapshot(), Some(last_seq));
                let _ = reply.send(rx);
            }
            JobCommand::Pong => self.stream.pong(),
            JobCommand::ClientDetached => self.stream.detach(),
            JobCommand::ItemCompleted {
                index,
                outcome,
                book_id,
                error_kind,
            } => self.on_item_completed(index, outcome, book_id, error_kind).await,
            JobCommand::Cancel { token, reply } => {
                let result = self.cancel(&token).await;
                let _ = reply.send(result);
            }
            JobCommand::RefreshToken { token, reply } => self.refresh_token(&token, reply),
            JobCommand::TokenPersisted {
                candidate,
                persisted,
                reply,
            } => self.on_token_persisted(candidate, persisted, reply),
            JobCommand::GetSnapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
        }
    }

    fn attach_stream(
        &mut self,
        token: &str,
        resume_after: Option<u64>,
    ) -> Result<mpsc::Receiver<StreamMessage>> {
        self.validate_token(token)?;
        Ok(self.stream.attach(self.state.snapshot(), resume_after))
    }

    fn validate_token(&self, presented: &str) -> Result<()> {
        if !self.state.token.matches(presented) {
            return Err(Error::InvalidToken);
        }
        if !self.state.token.is_valid_at(Utc::now()) {
            return Err(Error::ExpiredToken);
        }
        Ok(())
    }

    async fn on_item_completed(
        &mut self,
        index: usize,
        outcome: ItemOutcome,
        book_id: Option<String>,
        error_kind: Option<String>,
    ) {
        if self.state.status != JobStatus::Running {
            // Late delivery from a cancelled worker
            return;
        }

        self.state.record_item(index, outcome, book_id, error_kind);

        if let Some(item) = self.state.items.get(index) {
            self.stream.push_item_done(item.clone());
        }
        self.stream.push_progress(ProgressPayload::new(
            self.state.completed_items,
            self.state.failed_items,
            self.state.total_items(),
        ));

        if self.state.all_items_done() {
            let terminal = self.state.derive_terminal_status();
            self.finish(terminal).await;
        } else if self.state.persist_due(
            self.settings.persist_update_count,
            self.settings.persist_interval,
            Utc::now(),
        ) {
            self.try_persist().await;
        }
    }

    async fn cancel(&mut self, token: &str) -> Result<JobStatus> {
        self.validate_token(token)?;

        match self.state.status {
            JobStatus::Running | JobStatus::Pending => {
                self.worker_cancel.cancel();
                self.finish(JobStatus::Cancelled).await;
                Ok(JobStatus::Cancelled)
            }
            // Idempotent: cancelling a cancelled job succeeds
            JobStatus::Cancelled => Ok(JobStatus::Cancelled),
            other => Err(Error::Conflict(format!(
                "job is not running (status {other:?})"
            ))),
        }
    }

    /// Two-phase refresh: the window and conflict checks run here, the
    /// durable write runs in a spawned task, and the token only becomes
    /// current when `TokenPersisted` comes back. Any refresh arriving
    /// while the write is in flight observes `refresh_in_progress` and
    /// fails with RefreshConflict.
    fn refresh_token(&mut self, token: &str, reply: oneshot::Sender<Result<TokenEnvelope>>) {
        if let Err(e) = self.validate_token(token) {
            let _ = reply.send(Err(e));
            return;
        }

        if self.state.refresh_in_progress {
            let _ = reply.send(Err(Error::RefreshConflict));
            return;
        }

        if !self
            .state
            .token
            .in_refresh_window(Utc::now(), self.settings.refresh_window)
        {
            let _ = reply.send(Err(Error::Validation(
                "token is outside its refresh window".to_string(),
            )));
            return;
        }

        self.state.refresh_in_progress = true;
        self.state.touch();

        let candidate = TokenEnvelope::mint(self.settings.token_lifetime);
        let pool = self.pool.clone();
        let job_id = self.state.job_id;
        let self_tx = self.self_tx.clone();
        let persisted_candidate = candidate.clone();

        tokio::spawn(async move {
            let persisted = db::jobs::save_token(&pool, job_id, &persisted_candidate)
                .await
                .map_err(|e| {
                    tracing::error!(job_id = %job_id, error = %e, "Token persist failed");
                })
                .is_ok();
            let _ = self_tx
                .send(JobCommand::TokenPersisted {
                    candidate: persisted_candidate,
                    persisted,
                    reply,
                })
                .await;
        });
    }

    fn on_token_persisted(
        &mut self,
        candidate: TokenEnvelope,
        persisted: bool,
        reply: oneshot::Sender<Result<TokenEnvelope>>,
    ) {
        self.state.refresh_in_progress = false;

        if persisted {
            // The old token is invalid from this point on
            self.state.token = candidate.clone();
            self.state.touch();
            self.persist_pending = true;
            tracing::info!(job_id = %self.state.job_id, "Capability token refreshed");
            let _ = reply.send(Ok(candidate));
        } else {
            self.state.touch();
            let _ = reply.send(Err(Error::Storage(
                "token refresh could not be persisted".to_string(),
            )));
        }
    }

    /// Terminal transition. The terminal stream message is held back
    /// until the state is durably persisted.
    async fn finish(&mut self, status: JobStatus) {
        self.state.transition_to(status);
        self.metrics.emit(MetricEvent::JobTransition {
            job_id: self.state.job_id,
            status,
        });
        self.terminal_unannounced = true;
        self.try_persist().await;
        if !self.persist_pending {
            self.announce_terminal();
        }
    }

    fn announce_terminal(&mut self) {
        if !self.terminal_unannounced {
            return;
        }
        self.terminal_unannounced = false;
        self.stream.push_terminal(TerminalPayload {
            status: self.state.status,
            completed_items: self.state.completed_items,
            failed_items: self.state.failed_items,
            total_items: self.state.total_items(),
        });
    }

    async fn try_persist(&mut self) {
        match db::jobs::save_state(&self.pool, &self.state).await {
            Ok(_) => {
                self.state.mark_persisted();
                self.persist_pending = false;
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %self.state.job_id,
                    error = %e,
                    "Job persist failed, will retry on next tick"
                );
                self.persist_pending = true;
            }
        }
    }

    async fn on_tick(&mut self) {
        self.stream.tick();

        if self.persist_pending {
            self.try_persist().await;
            if !self.persist_pending {
                self.announce_terminal();
            }
        }
    }

    /// Cleanup alarm: delete everything persisted and close the stream.
    /// A job still running past the ceiling is expired first.
    async fn on_alarm(&mut self) {
        tracing::info!(
            job_id = %self.state.job_id,
            status = ?self.state.status,
            "Cleanup alarm fired"
        );

        if !self.state.status.is_terminal() {
            self.worker_cancel.cancel();
            self.state.transition_to(JobStatus::Expired);
            self.metrics.emit(MetricEvent::JobTransition {
                job_id: self.state.job_id,
                status: JobStatus::Expired,
            });
            self.terminal_unannounced = true;
            self.announce_terminal();
        }

        if let Err(e) = db::jobs::delete_job(&self.pool, self.state.job_id).await {
            tracing::warn!(job_id = %self.state.job_id, error = %e, "Cleanup delete failed");
        }
        self.stream.detach();
    }
}
