//! Batch job persistence
//!
//! Job state and token envelope are written as two rows under the same
//! job id: state first, then token. Recovery treats a missing token row
//! as "no active stream". State writes compare-and-swap on the version
//! counter so a stale writer can never clobber newer state.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::jobs::state::{JobState, TokenEnvelope};
use libris_common::events::{ItemResult, JobStatus};

/// Persist job state (without the token). Returns false when the write
/// was rejected because a newer version is already stored.
pub async fn save_state(pool: &SqlitePool, job: &JobState) -> Result<bool> {
    let items = serde_json::to_string(&job.items)?;
    let status = serde_json::to_string(&job.status)?;

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (
            job_id, owner_principal, status, total_items, completed_items,
            failed_items, items, created_at, updated_at, version, alarm_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            status = excluded.status,
            completed_items = excluded.completed_items,
            failed_items = excluded.failed_items,
            items = excluded.items,
            updated_at = excluded.updated_at,
            version = excluded.version,
            alarm_at = excluded.alarm_at
        WHERE excluded.version > jobs.version
        "#,
    )
    .bind(job.job_id.to_string())
    .bind(&job.owner_principal)
    .bind(status)
    .bind(job.total_items() as i64)
    .bind(job.completed_items as i64)
    .bind(job.failed_items as i64)
    .bind(items)
    .bind(job.created_at.to_rfc3339())
    .bind(job.updated_at.to_rfc3339())
    .bind(job.version as i64)
    .bind(job.alarm_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Persist the token envelope for a job
pub async fn save_token(pool: &SqlitePool, job_id: Uuid, token: &TokenEnvelope) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO job_tokens (job_id, token, expires_at)
        VALUES (?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            token = excluded.token,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(job_id.to_string())
    .bind(&token.token)
    .bind(token.expires_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Persisted job fields, loaded for recovery and snapshots
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub job_id: Uuid,
    pub owner_principal: String,
    pub status: JobStatus,
    pub completed_items: usize,
    pub failed_items: usize,
    pub items: Vec<ItemResult>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
    pub version: u64,
    pub alarm_at: chrono::DateTime<Utc>,
    /// None when the token row is missing (treated as no active stream)
    pub token: Option<TokenEnvelope>,
}

/// Load one job with its token if present
pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<StoredJob>> {
    let row = sqlx::query(
        r#"
        SELECT owner_principal, status, completed_items, failed_items, items,
               created_at, updated_at, version, alarm_at
        FROM jobs
        WHERE job_id = ?
        "#,
    )
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.get("status");
    let status: JobStatus = serde_json::from_str(&status)?;
    let items: String = row.get("items");
    let items: Vec<ItemResult> = serde_json::from_str(&items)?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let alarm_at: String = row.get("alarm_at");

    let token_row = sqlx::query("SELECT token, expires_at FROM job_tokens WHERE job_id = ?")
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    let token = match token_row {
        Some(t) => {
            let expires_at: String = t.get("expires_at");
            Some(TokenEnvelope {
                token: t.get("token"),
                expires_at: chrono::DateTime::parse_from_rfc3339(&expires_at)?
                    .with_timezone(&Utc),
            })
        }
        None => None,
    };

    Ok(Some(StoredJob {
        job_id,
        owner_principal: row.get("owner_principal"),
        status,
        completed_items: row.get::<i64, _>("completed_items") as usize,
        failed_items: row.get::<i64, _>("failed_items") as usize,
        items,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at)?.with_timezone(&Utc),
        version: row.get::<i64, _>("version") as u64,
        alarm_at: chrono::DateTime::parse_from_rfc3339(&alarm_at)?.with_timezone(&Utc),
        token,
    }))
}

/// Delete all persisted fields for a job (state and token)
pub async fn delete_job(pool: &SqlitePool, job_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM job_tokens WHERE job_id = ?")
        .bind(job_id.to_string())
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark non-terminal jobs from a previous run as failed.
///
/// Any job not in a terminal state at startup belonged to a dead
/// process and will never make progress.
pub async fn recover_stale_jobs(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = '"FAILED"',
            updated_at = ?,
            version = version + 1
        WHERE status IN ('"PENDING"', '"RUNNING"')
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    let recovered = result.rows_affected();
    if recovered > 0 {
        tracing::warn!(recovered, "Marked stale jobs from previous run as failed");
    }
    Ok(recovered)
}
