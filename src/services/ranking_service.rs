use crate::database::store::{NewRankingEntry, Store};
use crate::error::Result;
use uuid::Uuid;

#[derive(Clone)]
pub struct RankingService<S> {
    store: S,
}

impl<S: Store> RankingService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Rebuilds the leaderboard for one exam from its scored attempts.
    /// Entries are replaced wholesale inside one transaction, so a failed
    /// rebuild leaves the previous leaderboard in place and a re-run with
    /// unchanged attempts produces an identical entry set.
    pub async fn rebuild(&self, exam_id: Uuid) -> Result<()> {
        let mut scored = self.store.list_scored_attempts(exam_id).await?;

        // Highest score first; equal scores fall back to attempt id so the
        // ordering is stable across rebuilds.
        scored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.attempt_id.cmp(&b.attempt_id))
        });

        let ranking_id = self.store.get_or_create_ranking(exam_id).await?;

        let entries: Vec<NewRankingEntry> = scored
            .into_iter()
            .enumerate()
            .map(|(idx, attempt)| NewRankingEntry {
                user_id: attempt.user_id,
                attempt_id: attempt.attempt_id,
                position: idx as i32 + 1,
                score: attempt.score,
            })
            .collect();

        let total = entries.len();
        self.store.replace_ranking_entries(ranking_id, entries).await?;
        tracing::info!("Rebuilt ranking for exam {} with {} entries", exam_id, total);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::{MockStore, ScoredAttempt};
    use crate::error::Error;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;

    fn scored(attempt_id: Uuid, user_id: Uuid, score: i64) -> ScoredAttempt {
        ScoredAttempt {
            attempt_id,
            user_id,
            score: Decimal::from(score),
        }
    }

    #[tokio::test]
    async fn positions_follow_score_descending() {
        let exam_id = Uuid::from_u128(10);
        let ranking_id = Uuid::from_u128(99);
        let t1 = Uuid::from_u128(1);
        let u1 = Uuid::from_u128(101);
        let t2 = Uuid::from_u128(2);
        let u2 = Uuid::from_u128(102);

        let mut store = MockStore::new();
        store
            .expect_list_scored_attempts()
            .with(eq(exam_id))
            .returning(move |_| Ok(vec![scored(t1, u1, 10), scored(t2, u2, 8)]));
        store
            .expect_get_or_create_ranking()
            .with(eq(exam_id))
            .returning(move |_| Ok(ranking_id));
        store
            .expect_replace_ranking_entries()
            .withf(move |rid, entries| {
                *rid == ranking_id
                    && entries.len() == 2
                    && entries[0].position == 1
                    && entries[0].attempt_id == t1
                    && entries[0].user_id == u1
                    && entries[0].score == Decimal::from(10)
                    && entries[1].position == 2
                    && entries[1].attempt_id == t2
                    && entries[1].user_id == u2
                    && entries[1].score == Decimal::from(8)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        RankingService::new(store).rebuild(exam_id).await.unwrap();
    }

    #[tokio::test]
    async fn ties_break_on_attempt_id_ascending() {
        let exam_id = Uuid::from_u128(10);
        let ranking_id = Uuid::from_u128(99);
        let t1 = Uuid::from_u128(1);
        let t2 = Uuid::from_u128(2);
        let t3 = Uuid::from_u128(3);
        let user = Uuid::from_u128(100);

        let mut store = MockStore::new();
        // Deliberately unordered so the service's own sort is what decides.
        store
            .expect_list_scored_attempts()
            .with(eq(exam_id))
            .returning(move |_| {
                Ok(vec![
                    scored(t2, user, 8),
                    scored(t3, user, 10),
                    scored(t1, user, 10),
                ])
            });
        store
            .expect_get_or_create_ranking()
            .returning(move |_| Ok(ranking_id));
        store
            .expect_replace_ranking_entries()
            .withf(move |_, entries| {
                entries.len() == 3
                    && entries[0].attempt_id == t1
                    && entries[0].position == 1
                    && entries[1].attempt_id == t3
                    && entries[1].position == 2
                    && entries[2].attempt_id == t2
                    && entries[2].position == 3
            })
            .times(1)
            .returning(|_, _| Ok(()));

        RankingService::new(store).rebuild(exam_id).await.unwrap();
    }

    #[tokio::test]
    async fn exam_with_no_scored_attempts_gets_an_empty_leaderboard() {
        let exam_id = Uuid::from_u128(10);
        let ranking_id = Uuid::from_u128(99);

        let mut store = MockStore::new();
        store
            .expect_list_scored_attempts()
            .returning(|_| Ok(Vec::new()));
        store
            .expect_get_or_create_ranking()
            .returning(move |_| Ok(ranking_id));
        store
            .expect_replace_ranking_entries()
            .withf(|_, entries| entries.is_empty())
            .times(1)
            .returning(|_, _| Ok(()));

        RankingService::new(store).rebuild(exam_id).await.unwrap();
    }

    #[tokio::test]
    async fn failed_replace_propagates_to_the_caller() {
        let exam_id = Uuid::from_u128(10);

        let mut store = MockStore::new();
        store
            .expect_list_scored_attempts()
            .returning(move |_| Ok(vec![scored(Uuid::from_u128(1), Uuid::from_u128(100), 5)]));
        store
            .expect_get_or_create_ranking()
            .returning(|_| Ok(Uuid::from_u128(99)));
        store
            .expect_replace_ranking_entries()
            .returning(|_, _| Err(Error::Internal("transaction aborted".to_string())));

        let result = RankingService::new(store).rebuild(exam_id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failed_attempt_listing_skips_the_replace() {
        let exam_id = Uuid::from_u128(10);

        let mut store = MockStore::new();
        store
            .expect_list_scored_attempts()
            .returning(|_| Err(Error::Internal("read failed".to_string())));

        let result = RankingService::new(store).rebuild(exam_id).await;
        assert!(result.is_err());
    }
}
