//! Background job queue implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use curio_core::defaults;
use curio_core::{Error, Job, JobQueue, JobStatus, JobType, Result};

/// PostgreSQL implementation of JobQueue.
pub struct PgJobQueue {
    pool: Pool<Postgres>,
}

impl PgJobQueue {
    /// Create a new PgJobQueue with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &PgRow) -> Result<Job> {
    let job_type: String = row.get("job_type");
    let status: String = row.get("status");
    Ok(Job {
        id: row.get("id"),
        item_id: row.get("item_id"),
        job_type: job_type.parse::<JobType>().map_err(Error::Internal)?,
        status: status.parse::<JobStatus>().map_err(Error::Internal)?,
        priority: row.get("priority"),
        error_message: row.get("error_message"),
        retry_count: row.get("retry_count"),
        max_retries: row.get("max_retries"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    })
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn queue(&self, item_id: Uuid, job_type: JobType, priority: i32) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO job (id, item_id, job_type, priority, max_retries)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(item_id)
        .bind(job_type.to_string())
        .bind(priority)
        .bind(defaults::JOB_MAX_RETRIES)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn claim_next(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let type_names: Vec<String> = job_types.iter().map(|t| t.to_string()).collect();

        // SKIP LOCKED lets concurrent workers claim without blocking each other.
        let row = sqlx::query(
            r#"
            UPDATE job SET status = 'running', started_at = now()
            WHERE id = (
                SELECT id FROM job
                WHERE status = 'pending'
                  AND (cardinality($1::text[]) = 0 OR job_type = ANY($1))
                ORDER BY priority DESC, created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, item_id, job_type, status, priority, error_message,
                      retry_count, max_retries, created_at, started_at, completed_at
            "#,
        )
        .bind(&type_names)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE job SET status = 'completed', completed_at = now() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        // Re-queue while retries remain; otherwise terminal failure.
        sqlx::query(
            r#"
            UPDATE job SET
                retry_count = retry_count + 1,
                error_message = $2,
                status = CASE
                    WHEN retry_count + 1 >= max_retries THEN 'failed'
                    ELSE 'pending'
                END,
                completed_at = CASE
                    WHEN retry_count + 1 >= max_retries THEN now()
                    ELSE NULL
                END
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT count(*) AS count FROM job WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("count"))
    }
}
