use crate::database::store::Store;
use crate::error::Result;
use crate::services::scoring_service::ScoreAggregator;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Clone)]
pub struct GradingService<S> {
    store: S,
}

impl<S: Store> GradingService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Scores every attempt currently lacking a score and returns the
    /// distinct exams whose attempts were scored, so the caller can enqueue
    /// one ranking rebuild per exam.
    ///
    /// The candidate set is snapshotted up front; attempts created while
    /// the pass runs wait for the next one, and attempts that already carry
    /// a score are never re-selected. A failing read or write skips that
    /// attempt only and the batch continues.
    pub async fn run_once(&self) -> Result<Vec<Uuid>> {
        let candidates = self.store.list_ungraded_attempts().await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        tracing::info!("Grading {} ungraded attempts", candidates.len());

        let mut touched_exams: BTreeSet<Uuid> = BTreeSet::new();
        for candidate in &candidates {
            let answers = match self
                .store
                .list_participant_answers(candidate.attempt_id)
                .await
            {
                Ok(answers) => answers,
                Err(e) => {
                    tracing::error!(
                        error = ?e,
                        "Failed to load answers for attempt {}, skipping",
                        candidate.attempt_id
                    );
                    continue;
                }
            };

            let score = ScoreAggregator::total(&answers);
            match self.store.set_attempt_score(candidate.attempt_id, score).await {
                Ok(()) => {
                    touched_exams.insert(candidate.exam_id);
                }
                Err(e) => {
                    tracing::error!(
                        error = ?e,
                        "Failed to persist score for attempt {}, skipping",
                        candidate.attempt_id
                    );
                }
            }
        }

        Ok(touched_exams.into_iter().collect())
    }
}
