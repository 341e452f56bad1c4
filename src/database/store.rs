use crate::error::Result;
use crate::models::exam_attempt::ExamAttempt;
use crate::models::ranking_entry::RankingEntry;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// One attempt still waiting for a score, captured before grading mutates it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UngradedAttempt {
    pub attempt_id: Uuid,
    pub exam_id: Uuid,
}

/// Joined projection of one participant answer: the weight of the question
/// it belongs to and whether the chosen answer is flagged correct.
#[derive(Debug, Clone, Copy, PartialEq, sqlx::FromRow)]
pub struct AnswerRow {
    pub weight: Decimal,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ScoredAttempt {
    pub attempt_id: Uuid,
    pub user_id: Uuid,
    pub score: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRankingEntry {
    pub user_id: Uuid,
    pub attempt_id: Uuid,
    pub position: i32,
    pub score: Decimal,
}

/// Storage operations the grading and ranking jobs depend on. Services take
/// this by type parameter so tests can substitute a double for the database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Attempts with no score yet, oldest first. The exam id rides along so
    /// the grading job can fan out ranking rebuilds without a second query.
    async fn list_ungraded_attempts(&self) -> Result<Vec<UngradedAttempt>>;

    /// Answer rows for one attempt. A chosen answer that no longer exists
    /// surfaces as `is_correct = false` rather than an error.
    async fn list_participant_answers(&self, attempt_id: Uuid) -> Result<Vec<AnswerRow>>;

    async fn set_attempt_score(&self, attempt_id: Uuid, score: Decimal) -> Result<()>;

    /// Scored attempts for one exam, ordered score descending then attempt
    /// id ascending.
    async fn list_scored_attempts(&self, exam_id: Uuid) -> Result<Vec<ScoredAttempt>>;

    /// Returns the exam's ranking id, creating the row on first use.
    async fn get_or_create_ranking(&self, exam_id: Uuid) -> Result<Uuid>;

    /// Swaps the full entry set for a ranking in one transaction. The old
    /// entries survive any failure; concurrent swaps for the same ranking
    /// are serialized on the ranking row.
    async fn replace_ranking_entries(
        &self,
        ranking_id: Uuid,
        entries: Vec<NewRankingEntry>,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read surface for the API layer: one attempt with its (possibly still
    /// null) score.
    pub async fn get_attempt(&self, attempt_id: Uuid) -> Result<ExamAttempt> {
        let attempt = sqlx::query_as::<_, ExamAttempt>(
            r#"SELECT * FROM exam_attempts WHERE id = $1"#,
        )
        .bind(attempt_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    /// Read surface for the API layer: the current leaderboard of an exam.
    pub async fn list_ranking_entries(&self, exam_id: Uuid) -> Result<Vec<RankingEntry>> {
        let entries = sqlx::query_as::<_, RankingEntry>(
            r#"
            SELECT re.*
            FROM ranking_entries re
            JOIN rankings r ON r.id = re.ranking_id
            WHERE r.exam_id = $1
            ORDER BY re.position ASC
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_ungraded_attempts(&self) -> Result<Vec<UngradedAttempt>> {
        let attempts = sqlx::query_as::<_, UngradedAttempt>(
            r#"
            SELECT id AS attempt_id, exam_id
            FROM exam_attempts
            WHERE score IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn list_participant_answers(&self, attempt_id: Uuid) -> Result<Vec<AnswerRow>> {
        let rows = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT q.weight, COALESCE(a.is_correct, FALSE) AS is_correct
            FROM participant_answers pa
            JOIN questions q ON q.id = pa.question_id
            LEFT JOIN answers a ON a.id = pa.chosen_answer_id
            WHERE pa.attempt_id = $1
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn set_attempt_score(&self, attempt_id: Uuid, score: Decimal) -> Result<()> {
        sqlx::query(
            r#"UPDATE exam_attempts SET score = $2, updated_at = NOW() WHERE id = $1"#,
        )
        .bind(attempt_id)
        .bind(score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_scored_attempts(&self, exam_id: Uuid) -> Result<Vec<ScoredAttempt>> {
        let attempts = sqlx::query_as::<_, ScoredAttempt>(
            r#"
            SELECT id AS attempt_id, user_id, score
            FROM exam_attempts
            WHERE exam_id = $1 AND score IS NOT NULL
            ORDER BY score DESC, id ASC
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn get_or_create_ranking(&self, exam_id: Uuid) -> Result<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO rankings (exam_id) VALUES ($1)
            ON CONFLICT (exam_id) DO UPDATE SET updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(exam_id)
        .fetch_one(&self.pool)
        .await?;
        let id: Uuid = row.try_get("id")?;
        Ok(id)
    }

    async fn replace_ranking_entries(
        &self,
        ranking_id: Uuid,
        entries: Vec<NewRankingEntry>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent rebuilds of the same exam.
        sqlx::query(r#"SELECT id FROM rankings WHERE id = $1 FOR UPDATE"#)
            .bind(ranking_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(r#"DELETE FROM ranking_entries WHERE ranking_id = $1"#)
            .bind(ranking_id)
            .execute(&mut *tx)
            .await?;

        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO ranking_entries (ranking_id, user_id, attempt_id, position, score)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(ranking_id)
            .bind(entry.user_id)
            .bind(entry.attempt_id)
            .bind(entry.position)
            .bind(entry.score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
