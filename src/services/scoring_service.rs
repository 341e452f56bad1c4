use crate::database::store::AnswerRow;
use rust_decimal::Decimal;

pub struct ScoreAggregator;

impl ScoreAggregator {
    /// Total score for one attempt: the sum of question weights where the
    /// chosen answer is flagged correct. Unanswered questions have no row
    /// and contribute nothing; an attempt with no rows scores exactly zero.
    pub fn total(answers: &[AnswerRow]) -> Decimal {
        answers
            .iter()
            .filter(|row| row.is_correct)
            .map(|row| row.weight)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(weight: Decimal, is_correct: bool) -> AnswerRow {
        AnswerRow { weight, is_correct }
    }

    #[test]
    fn sums_weights_of_correct_answers() {
        let answers = vec![
            row(Decimal::from(3), true),
            row(Decimal::from(2), false),
            row(Decimal::from(5), true),
        ];
        assert_eq!(ScoreAggregator::total(&answers), Decimal::from(8));
    }

    #[test]
    fn all_wrong_answers_score_zero() {
        let answers = vec![row(Decimal::from(3), false), row(Decimal::from(4), false)];
        assert_eq!(ScoreAggregator::total(&answers), Decimal::ZERO);
    }

    #[test]
    fn empty_attempt_scores_zero() {
        assert_eq!(ScoreAggregator::total(&[]), Decimal::ZERO);
    }

    #[test]
    fn fractional_weights_sum_without_drift() {
        // 0.1 + 0.2 must come out as exactly 0.3.
        let answers = vec![
            row(Decimal::new(1, 1), true),
            row(Decimal::new(2, 1), true),
        ];
        assert_eq!(ScoreAggregator::total(&answers), Decimal::new(3, 1));
    }
}
