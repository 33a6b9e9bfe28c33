//! Job registry
//!
//! Sharded map of job mailboxes: one mpsc sender per live job, each
//! consumed by a single actor task. The registry is the only way the
//! API layer reaches a job; it launches actors, routes commands and
//! prunes entries when actors stop.

use crate::config::BatchSettings;
use crate::db;
use crate::jobs::actor::{JobActor, JobCommand};
use crate::jobs::state::{JobState, TokenEnvelope};
use crate::jobs::ItemEnricher;
use crate::metrics::MetricsSink;
use libris_common::events::{ItemOutcome, JobSnapshot, JobStatus, StreamMessage};
use libris_common::time::to_iso8601;
use libris_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Mailbox capacity per job
const MAILBOX_CAPACITY: usize = 256;

/// Launch response for the API layer
#[derive(Debug, Clone)]
pub struct LaunchReceipt {
    pub job_id: Uuid,
    pub auth_token: String,
    pub auth_token_expires_at: chrono::DateTime<chrono::Utc>,
    pub stream_url: String,
}

/// Registry of live job actors
pub struct JobRegistry {
    mailboxes: Mutex<HashMap<Uuid, mpsc::Sender<JobCommand>>>,
    pool: SqlitePool,
    settings: BatchSettings,
    metrics: MetricsSink,
    enricher: Arc<dyn ItemEnricher>,
    shutdown: CancellationToken,
}

impl JobRegistry {
    pub fn new(
        pool: SqlitePool,
        settings: BatchSettings,
        metrics: MetricsSink,
        enricher: Arc<dyn ItemEnricher>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            mailboxes: Mutex::new(HashMap::new()),
            pool,
            settings,
            metrics,
            enricher,
            shutdown,
        })
    }

    /// Create a job: persist state then token, spawn the actor and its
    /// worker, and hand back the capability receipt.
    pub async fn launch(
        self: &Arc<Self>,
        owner_principal: &str,
        inputs: Vec<String>,
    ) -> Result<LaunchReceipt> {
        if inputs.is_empty() {
            return Err(Error::Validation("batch has no items".to_string()));
        }

        let state = JobState::new(
            owner_principal,
            inputs.clone(),
            self.settings.token_lifetime,
            self.settings.cleanup,
        );
        let job_id = state.job_id;
        let token = state.token.clone();

        // State first, then token: recovery treats a missing token row
        // as a job with no active stream.
        db::jobs::save_state(&self.pool, &state)
            .await
            .map_err(|e| Error::Storage(format!("cannot persist job: {e}")))?;
        db::jobs::save_token(&self.pool, job_id, &token)
            .await
            .map_err(|e| Error::Storage(format!("cannot persist job token: {e}")))?;

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let worker_cancel = self.shutdown.child_token();

        let actor = JobActor::new(
            state,
            self.pool.clone(),
            self.settings.clone(),
            self.metrics.clone(),
            rx,
            tx.clone(),
            worker_cancel.clone(),
        );

        self.mailboxes.lock().await.insert(job_id, tx.clone());

        // Actor task, with registry cleanup when it stops
        let registry = self.clone();
        tokio::spawn(async move {
            actor.run().await;
            registry.mailboxes.lock().await.remove(&job_id);
        });

        // Worker task feeding item results into the mailbox
        let enricher = self.enricher.clone();
        tokio::spawn(run_worker(inputs, enricher, tx, worker_cancel));

        tracing::info!(job_id = %job_id, owner = owner_principal, "Batch job launched");

        Ok(LaunchReceipt {
            job_id,
            auth_token: token.token,
            auth_token_expires_at: token.expires_at,
            stream_url: format!("/ws/progress?jobId={job_id}"),
        })
    }

    async fn sender(&self, job_id: Uuid) -> Result<mpsc::Sender<JobCommand>> {
        let mailboxes = self.mailboxes.lock().await;
        mailboxes
            .get(&job_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {job_id} is not active")))
    }

    async fn send(&self, job_id: Uuid, cmd: JobCommand) -> Result<()> {
        let sender = self.sender(job_id).await?;
        sender
            .send(cmd)
            .await
            .map_err(|_| Error::NotFound(format!("job {job_id} is not active")))
    }

    /// Attach the progress stream with a presented token
    pub async fn attach_stream(
        &self,
        job_id: Uuid,
        token: &str,
        resume_after: Option<u64>,
    ) -> Result<mpsc::Receiver<StreamMessage>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            job_id,
            JobCommand::AttachStream {
                token: token.to_string(),
                resume_after,
                reply,
            },
        )
        .await?;
        rx.await
            .map_err(|_| Error::Internal("job actor dropped attach reply".to_string()))?
    }

    /// Mid-connection resume requested by the client
    pub async fn resume_stream(
        &self,
        job_id: Uuid,
        last_seq: u64,
    ) -> Result<mpsc::Receiver<StreamMessage>> {
        let (reply, rx) = oneshot::channel();
        self.send(job_id, JobCommand::Resume { last_seq, reply }).await?;
        rx.await
            .map_err(|_| Error::Internal("job actor dropped resume reply".to_string()))
    }

    pub async fn pong(&self, job_id: Uuid) {
        let _ = self.send(job_id, JobCommand::Pong).await;
    }

    pub async fn client_detached(&self, job_id: Uuid) {
        let _ = self.send(job_id, JobCommand::ClientDetached).await;
    }

    /// Cancel with token; falls back to the persisted record for jobs
    /// whose actor is already gone.
    pub async fn cancel(&self, job_id: Uuid, token: &str) -> Result<JobStatus> {
        match self.sender(job_id).await {
            Ok(sender) => {
                let (reply, rx) = oneshot::channel();
                sender
                    .send(JobCommand::Cancel {
                        token: token.to_string(),
                        reply,
                    })
                    .await
                    .map_err(|_| Error::NotFound(format!("job {job_id} is not active")))?;
                rx.await
                    .map_err(|_| Error::Internal("job actor dropped cancel reply".to_string()))?
            }
            Err(not_found) => {
                let stored = db::jobs::load_job(&self.pool, job_id)
                    .await
                    .map_err(|e| Error::Storage(e.to_string()))?
                    .ok_or(not_found)?;
                match stored.status {
                    JobStatus::Cancelled => Ok(JobStatus::Cancelled),
                    other => Err(Error::Conflict(format!(
                        "job is not running (status {other:?})"
                    ))),
                }
            }
        }
    }

    /// Refresh the capability token inside its refresh window
    pub async fn refresh_token(&self, job_id: Uuid, token: &str) -> Result<TokenEnvelope> {
        let (reply, rx) = oneshot::channel();
        self.send(
            job_id,
            JobCommand::RefreshToken {
                token: token.to_string(),
                reply,
            },
        )
        .await?;
        rx.await
            .map_err(|_| Error::Internal("job actor dropped refresh reply".to_string()))?
    }

    /// Snapshot from the live actor, or from persisted state for jobs
    /// whose actor has stopped.
    pub async fn snapshot(&self, job_id: Uuid) -> Result<JobSnapshot> {
        match self.sender(job_id).await {
            Ok(sender) => {
                let (reply, rx) = oneshot::channel();
                sender
                    .send(JobCommand::GetSnapshot { reply })
                    .await
                    .map_err(|_| Error::NotFound(format!("job {job_id} is not active")))?;
                rx.await
                    .map_err(|_| Error::Internal("job actor dropped snapshot reply".to_string()))
            }
            Err(not_found) => {
                let stored = db::jobs::load_job(&self.pool, job_id)
                    .await
                    .map_err(|e| Error::Storage(e.to_string()))?
                    .ok_or(not_found)?;
                Ok(JobSnapshot {
                    job_id,
                    status: stored.status,
                    total_items: stored.items.len(),
                    completed_items: stored.completed_items,
                    failed_items: stored.failed_items,
                    items: stored.items,
                    created_at: to_iso8601(stored.created_at),
                    updated_at: to_iso8601(stored.updated_at),
                    version: stored.version,
                })
            }
        }
    }
}

/// Sequential worker: runs the read path for each item and reports the
/// outcome to the actor. Cancellation stops uncommitted work only.
async fn run_worker(
    inputs: Vec<String>,
    enricher: Arc<dyn ItemEnricher>,
    tx: mpsc::Sender<JobCommand>,
    cancel: CancellationToken,
) {
    for (index, input) in inputs.into_iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            result = enricher.enrich(&input) => result,
        };

        let cmd = match outcome {
            Ok(book_id) => JobCommand::ItemCompleted {
                index,
                outcome: ItemOutcome::Enriched,
                book_id: Some(book_id),
                error_kind: None,
            },
            Err(error_kind) => JobCommand::ItemCompleted {
                index,
                outcome: ItemOutcome::Failed,
                book_id: None,
                error_kind: Some(error_kind),
            },
        };

        if tx.send(cmd).await.is_err() {
            break;
        }
    }
}
