use crate::database::store::PgStore;
use crate::error::{Error, Result};
use crate::services::grading_service::GradingService;
use crate::services::ranking_service::RankingService;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub const KIND_GRADE_ATTEMPTS: &str = "grade_attempts";
pub const KIND_REBUILD_RANKING: &str = "rebuild_ranking";

#[derive(Debug, Serialize, Deserialize)]
struct RankingJobPayload {
    exam_id: Uuid,
}

/// Postgres-backed job queue tying the pipeline together. Grading passes
/// and ranking rebuilds run as separate jobs; grading hands off to ranking
/// by enqueueing one rebuild per touched exam rather than calling it
/// inline, so rebuilds for different exams can run on different workers.
#[derive(Clone)]
pub struct JobQueueService {
    pool: PgPool,
    grading: GradingService<PgStore>,
    ranking: RankingService<PgStore>,
}

impl JobQueueService {
    pub fn new(pool: PgPool) -> Self {
        let store = PgStore::new(pool.clone());
        Self {
            pool,
            grading: GradingService::new(store.clone()),
            ranking: RankingService::new(store),
        }
    }

    /// Trigger point for the API layer once an attempt is marked completed,
    /// and for the scheduler cadence. Redundant enqueues are harmless: a
    /// pass with nothing to grade is a no-op.
    pub async fn enqueue_grading(&self) -> Result<Uuid> {
        self.enqueue(KIND_GRADE_ATTEMPTS, serde_json::json!({})).await
    }

    /// Trigger point for administrators forcing a leaderboard rebuild; also
    /// used by the grading job itself for the per-exam fan-out.
    pub async fn enqueue_ranking(&self, exam_id: Uuid) -> Result<Uuid> {
        let payload = serde_json::to_value(RankingJobPayload { exam_id })?;
        self.enqueue(KIND_REBUILD_RANKING, payload).await
    }

    async fn enqueue(&self, kind: &str, payload: JsonValue) -> Result<Uuid> {
        let row = sqlx::query(r#"INSERT INTO jobs (kind, payload) VALUES ($1, $2) RETURNING id"#)
            .bind(kind)
            .bind(payload)
            .fetch_one(&self.pool)
            .await?;
        let id: Uuid = row.try_get("id")?;
        Ok(id)
    }

    /// Claims and processes one due job. Returns false when the queue is
    /// empty so worker loops can sleep between polls. SKIP LOCKED keeps
    /// concurrent workers off the same job.
    pub async fn run_once(&self) -> Result<bool> {
        let rec = sqlx::query(
            r#"
            UPDATE jobs SET status='running', started_at=NOW(), attempts = attempts + 1
            WHERE id = (
                SELECT id FROM jobs
                WHERE status='pending' AND (next_retry_at IS NULL OR next_retry_at <= NOW())
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, kind, payload
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = rec else { return Ok(false) };
        let job_id: Uuid = row.try_get("id")?;
        let kind: String = row.try_get("kind")?;
        let payload: JsonValue = row.try_get("payload")?;

        match self.dispatch(&kind, payload).await {
            Ok(()) => {
                sqlx::query(r#"UPDATE jobs SET status='succeeded', finished_at=NOW() WHERE id=$1"#)
                    .bind(job_id)
                    .execute(&self.pool)
                    .await?;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Job {} ({}) failed", job_id, kind);
                self.park_or_retry(job_id, &e.to_string()).await?;
            }
        }

        Ok(true)
    }

    async fn dispatch(&self, kind: &str, payload: JsonValue) -> Result<()> {
        match kind {
            KIND_GRADE_ATTEMPTS => {
                let exams = self.grading.run_once().await?;
                for exam_id in exams {
                    self.enqueue_ranking(exam_id).await?;
                }
                Ok(())
            }
            KIND_REBUILD_RANKING => {
                let payload: RankingJobPayload = serde_json::from_value(payload)?;
                self.ranking.rebuild(payload.exam_id).await
            }
            other => Err(Error::Internal(format!("Unknown job kind: {}", other))),
        }
    }

    /// Failed jobs go back to pending with exponential backoff until
    /// max_attempts, then stay failed for operator inspection.
    async fn park_or_retry(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = CASE WHEN attempts < max_attempts THEN 'pending' ELSE 'failed' END,
                error = $2,
                next_retry_at = CASE WHEN attempts < max_attempts
                    THEN NOW() + make_interval(secs => LEAST(3600, 30 * power(2::float, GREATEST(0, attempts-1))::int))
                    ELSE next_retry_at END,
                finished_at = CASE WHEN attempts < max_attempts THEN NULL ELSE NOW() END
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
