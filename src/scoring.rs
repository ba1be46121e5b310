//! Per-question answer aggregation and the scoring engine
//!
//! The aggregator collects raw answers with the moment the host received
//! them; the scoring function is pure, converting one answer into points
//! given the question, correctness and elapsed time. Scores decay linearly
//! with time so an instant correct answer is worth the most.

use std::collections::{HashMap, HashSet};

use web_time::{Duration, SystemTime};

use crate::constants::scoring::{
    MAX_BASE_POINTS, MULTI_SELECT_MAX_POINTS, MULTI_SELECT_PERFECT_BONUS,
    MULTI_SELECT_SPEED_BONUS,
};
use crate::protocol::AnswerValue;
use crate::quiz::{CorrectAnswer, Question, QuestionType};
use crate::registry::PlayerKey;

/// One recorded answer: the submitted value and the host receipt moment
#[derive(Debug, Clone)]
pub struct AnswerRecord {
    /// The submitted answer value
    pub value: AnswerValue,
    /// When the host received the submission
    pub received_at: SystemTime,
}

/// Collects answers keyed by (question index, player key)
///
/// A later submission for the same pair overwrites the earlier one; the
/// host session only records while the question is still open, so an
/// overwrite can never land after scoring.
#[derive(Debug, Default)]
pub struct AnswerAggregator {
    answers: HashMap<usize, HashMap<PlayerKey, AnswerRecord>>,
}

impl AnswerAggregator {
    /// Stores or overwrites the entry for `(question_index, key)`
    pub fn record(
        &mut self,
        question_index: usize,
        key: PlayerKey,
        value: AnswerValue,
        received_at: SystemTime,
    ) {
        self.answers
            .entry(question_index)
            .or_default()
            .insert(key, AnswerRecord { value, received_at });
    }

    /// A read-only snapshot of every answer to one question
    pub fn answers_for(&self, question_index: usize) -> Option<&HashMap<PlayerKey, AnswerRecord>> {
        self.answers.get(&question_index)
    }

    /// One player's recorded answer to one question
    pub fn answer_of(&self, question_index: usize, key: &PlayerKey) -> Option<&AnswerRecord> {
        self.answers.get(&question_index)?.get(key)
    }

    /// How many players have answered one question, for "N of M" displays
    pub fn answered_count(&self, question_index: usize) -> usize {
        self.answers.get(&question_index).map_or(0, HashMap::len)
    }

    /// Drops every recorded answer, for a "play again" round
    pub fn clear(&mut self) {
        self.answers.clear();
    }
}

/// The outcome of scoring one answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    /// Points gained
    pub points: u64,
    /// Binary correctness for display: exact match only, even for sliders
    pub correct: bool,
    /// Absolute distance to the correct value, for slider questions
    pub closeness: Option<f64>,
}

impl ScoreOutcome {
    /// The outcome for a player who never answered
    pub fn unanswered() -> Self {
        Self {
            points: 0,
            correct: false,
            closeness: None,
        }
    }
}

/// The fraction of points left by answer speed: 1 for instant, 0 at the
/// time limit, never negative
fn speed_fraction(elapsed: Duration, time_limit: Duration) -> f64 {
    if time_limit.is_zero() {
        return 0.0;
    }
    (1.0 - elapsed.as_secs_f64() / time_limit.as_secs_f64()).max(0.0)
}

fn score_single_select(question: &Question, answer: &AnswerValue, elapsed: Duration) -> ScoreOutcome {
    let correct_index = match &question.correct {
        CorrectAnswer::Index(i) => *i,
        _ => return ScoreOutcome::unanswered(),
    };

    let correct = answer.as_index() == Some(correct_index);
    ScoreOutcome {
        points: if correct {
            (MAX_BASE_POINTS * speed_fraction(elapsed, question.time_limit)).round() as u64
        } else {
            0
        },
        correct,
        closeness: None,
    }
}

fn score_slider(question: &Question, answer: &AnswerValue, elapsed: Duration) -> ScoreOutcome {
    let Some(correct_value) = question.correct.as_slider_value() else {
        return ScoreOutcome::unanswered();
    };
    let Some(submitted) = answer.as_slider_value() else {
        return ScoreOutcome::unanswered();
    };

    let distance = (submitted - correct_value).abs();
    let range = question
        .slider_range()
        .map(|(min, max)| max - min)
        .filter(|r| *r > 0.0);

    // Without a usable range only an exact hit earns proximity points.
    let proximity = match range {
        Some(range) => (MAX_BASE_POINTS * (1.0 - distance / range).max(0.0)).round(),
        None if distance == 0.0 => MAX_BASE_POINTS,
        None => 0.0,
    };
    let speed = (MAX_BASE_POINTS * speed_fraction(elapsed, question.time_limit)).round();

    ScoreOutcome {
        points: ((proximity + speed) / 2.0).round() as u64,
        correct: distance == 0.0,
        closeness: Some(distance),
    }
}

fn score_multi_select(question: &Question, answer: &AnswerValue, elapsed: Duration) -> ScoreOutcome {
    let correct_set: HashSet<usize> = match &question.correct {
        CorrectAnswer::Indices(indices) => indices.iter().copied().collect(),
        _ => return ScoreOutcome::unanswered(),
    };
    let Some(selection) = answer.as_selection() else {
        return ScoreOutcome::unanswered();
    };
    if correct_set.is_empty() {
        return ScoreOutcome::unanswered();
    }

    let selected: HashSet<usize> = selection.iter().copied().collect();
    let correct_count = selected.intersection(&correct_set).count();
    let wrong_count = selected.difference(&correct_set).count();

    if correct_count == 0 {
        return ScoreOutcome::unanswered();
    }

    let base = MAX_BASE_POINTS * correct_count as f64 / correct_set.len() as f64;
    let penalty_divisor = selected.union(&correct_set).count().max(correct_set.len() + 1);
    let penalty = wrong_count as f64 * MAX_BASE_POINTS / penalty_divisor as f64;
    let speed_bonus = MULTI_SELECT_SPEED_BONUS * speed_fraction(elapsed, question.time_limit);

    let perfect = correct_count == correct_set.len() && wrong_count == 0;
    let perfect_bonus = if perfect { MULTI_SELECT_PERFECT_BONUS } else { 0.0 };

    ScoreOutcome {
        points: (base - penalty + speed_bonus + perfect_bonus)
            .clamp(0.0, MULTI_SELECT_MAX_POINTS)
            .round() as u64,
        correct: perfect,
        closeness: None,
    }
}

/// Scores one submitted answer against a question
///
/// Pure: the same inputs always produce the same outcome. An answer whose
/// shape does not match the question type scores 0 and is not correct; a
/// player who never answered is scored by the caller with
/// [`ScoreOutcome::unanswered`].
pub fn score_answer(question: &Question, answer: &AnswerValue, elapsed: Duration) -> ScoreOutcome {
    match question.question_type {
        QuestionType::MultipleChoice | QuestionType::TrueFalse => {
            score_single_select(question, answer, elapsed)
        }
        QuestionType::Slider => score_slider(question, answer, elapsed),
        QuestionType::MultiSelect => score_multi_select(question, answer, elapsed),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn multiple_choice(time_limit_secs: u64) -> Question {
        Question {
            text: "2+2?".to_string(),
            question_type: QuestionType::MultipleChoice,
            options: vec!["3".into(), "4".into(), "5".into(), "6".into()],
            correct: CorrectAnswer::Index(1),
            time_limit: Duration::from_secs(time_limit_secs),
            slider_min: None,
            slider_max: None,
            media: None,
        }
    }

    fn slider(correct: f64, min: f64, max: f64, time_limit_secs: u64) -> Question {
        Question {
            text: "Guess".to_string(),
            question_type: QuestionType::Slider,
            options: Vec::new(),
            correct: CorrectAnswer::Value(correct),
            time_limit: Duration::from_secs(time_limit_secs),
            slider_min: Some(min),
            slider_max: Some(max),
            media: None,
        }
    }

    fn multi_select(correct: &[usize], time_limit_secs: u64) -> Question {
        Question {
            text: "Pick all".to_string(),
            question_type: QuestionType::MultiSelect,
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct: CorrectAnswer::Indices(correct.to_vec()),
            time_limit: Duration::from_secs(time_limit_secs),
            slider_min: None,
            slider_max: None,
            media: None,
        }
    }

    #[test]
    fn test_instant_correct_answers_score_the_maximum() {
        let outcome = score_answer(
            &multiple_choice(20),
            &AnswerValue::Index(1),
            Duration::ZERO,
        );
        assert_eq!(outcome.points, 1000);
        assert!(outcome.correct);

        let outcome = score_answer(
            &slider(50.0, 0.0, 100.0, 10),
            &AnswerValue::Slider(50.0),
            Duration::ZERO,
        );
        assert_eq!(outcome.points, 1000);
        assert!(outcome.correct);

        let outcome = score_answer(
            &multi_select(&[0, 2], 20),
            &AnswerValue::Selection(vec![0, 2]),
            Duration::ZERO,
        );
        assert_eq!(outcome.points, 1350);
        assert!(outcome.correct);
    }

    #[test]
    fn test_speed_component_is_zero_at_and_past_the_limit() {
        for elapsed_secs in [20, 21, 1000] {
            let outcome = score_answer(
                &multiple_choice(20),
                &AnswerValue::Index(1),
                Duration::from_secs(elapsed_secs),
            );
            assert_eq!(outcome.points, 0, "elapsed {elapsed_secs}s");
            assert!(outcome.correct);
        }
    }

    #[test]
    fn test_wrong_single_select_scores_zero() {
        let outcome = score_answer(
            &multiple_choice(20),
            &AnswerValue::Index(0),
            Duration::from_secs(2),
        );
        assert_eq!(outcome.points, 0);
        assert!(!outcome.correct);
    }

    #[test]
    fn test_single_select_decays_linearly() {
        // 2000ms of 20000ms gone: round(1000 * 0.9) = 900
        let outcome = score_answer(
            &multiple_choice(20),
            &AnswerValue::Index(1),
            Duration::from_millis(2000),
        );
        assert_eq!(outcome.points, 900);
        assert!(outcome.correct);
    }

    #[test]
    fn test_slider_mixes_proximity_and_speed() {
        // proximity 1000, speed round(1000 * 0.9) = 900, mean 950
        let outcome = score_answer(
            &slider(50.0, 0.0, 100.0, 10),
            &AnswerValue::Slider(50.0),
            Duration::from_millis(1000),
        );
        assert_eq!(outcome.points, 950);
        assert!(outcome.correct);
        assert_eq!(outcome.closeness, Some(0.0));
    }

    #[test]
    fn test_slider_correctness_requires_exact_hit() {
        let outcome = score_answer(
            &slider(50.0, 0.0, 100.0, 10),
            &AnswerValue::Slider(55.0),
            Duration::ZERO,
        );
        assert!(!outcome.correct);
        assert_eq!(outcome.closeness, Some(5.0));
        // proximity round(1000 * 0.95) = 950, speed 1000, mean 975
        assert_eq!(outcome.points, 975);
    }

    #[test]
    fn test_slider_accepts_integral_correct_value_from_quiz_json() {
        // A whole-number correct value deserializes as an index through
        // the untagged union; scoring must still treat it numerically.
        let question: Question = serde_json::from_str(
            r#"{"text":"Guess","question_type":"slider","correct":50,"slider_min":0.0,"slider_max":100.0,"time_limit":10}"#,
        )
        .unwrap();
        assert_eq!(question.correct, CorrectAnswer::Index(50));

        let outcome = score_answer(&question, &AnswerValue::Slider(50.0), Duration::ZERO);
        assert_eq!(outcome.points, 1000);
        assert!(outcome.correct);
        assert_eq!(outcome.closeness, Some(0.0));

        let near = score_answer(&question, &AnswerValue::Slider(55.0), Duration::ZERO);
        assert!(!near.correct);
        assert_eq!(near.closeness, Some(5.0));
    }

    #[test]
    fn test_slider_accepts_integral_submissions() {
        let outcome = score_answer(
            &slider(50.0, 0.0, 100.0, 10),
            &AnswerValue::Index(50),
            Duration::ZERO,
        );
        assert!(outcome.correct);
        assert_eq!(outcome.points, 1000);
    }

    #[test]
    fn test_multi_select_zero_correct_scores_zero_regardless_of_wrong() {
        for selection in [vec![1], vec![1, 3], vec![3]] {
            let outcome = score_answer(
                &multi_select(&[0, 2], 20),
                &AnswerValue::Selection(selection.clone()),
                Duration::ZERO,
            );
            assert_eq!(outcome.points, 0, "selection {selection:?}");
            assert!(!outcome.correct);
        }
    }

    #[test]
    fn test_multi_select_partial_credit_with_penalty() {
        // correct {0,2}, selected {0,1}: base 500, union {0,1,2} vs
        // |correct|+1 = 3, penalty 1000/3, no speed left, no bonus
        let outcome = score_answer(
            &multi_select(&[0, 2], 20),
            &AnswerValue::Selection(vec![0, 1]),
            Duration::from_secs(20),
        );
        assert_eq!(outcome.points, 167);
        assert!(!outcome.correct);
    }

    #[test]
    fn test_multi_select_never_exceeds_clamp() {
        let outcome = score_answer(
            &multi_select(&[0], 20),
            &AnswerValue::Selection(vec![0]),
            Duration::ZERO,
        );
        // base 1000 + speed 150 + perfect 200 = 1350 <= 1500
        assert_eq!(outcome.points, 1350);
    }

    #[test]
    fn test_multi_select_exact_match_required_for_correct_flag() {
        let outcome = score_answer(
            &multi_select(&[0, 2], 20),
            &AnswerValue::Selection(vec![0]),
            Duration::ZERO,
        );
        assert!(!outcome.correct);
        assert!(outcome.points > 0);
    }

    #[test]
    fn test_mismatched_answer_shape_scores_zero() {
        let outcome = score_answer(
            &multiple_choice(20),
            &AnswerValue::Selection(vec![1]),
            Duration::ZERO,
        );
        assert_eq!(outcome, ScoreOutcome::unanswered());
    }

    #[test]
    fn test_aggregator_overwrites_same_pair() {
        let mut aggregator = AnswerAggregator::default();
        let key = PlayerKey::new("ada").unwrap();
        let early = SystemTime::now();
        let late = early + Duration::from_secs(2);

        aggregator.record(0, key.clone(), AnswerValue::Index(0), early);
        aggregator.record(0, key.clone(), AnswerValue::Index(1), late);

        assert_eq!(aggregator.answered_count(0), 1);
        let record = aggregator.answer_of(0, &key).unwrap();
        assert_eq!(record.value, AnswerValue::Index(1));
        assert_eq!(record.received_at, late);
    }

    #[test]
    fn test_aggregator_keys_questions_independently() {
        let mut aggregator = AnswerAggregator::default();
        let key = PlayerKey::new("ada").unwrap();
        aggregator.record(0, key.clone(), AnswerValue::Index(1), SystemTime::now());
        aggregator.record(3, key, AnswerValue::Index(2), SystemTime::now());

        assert_eq!(aggregator.answered_count(0), 1);
        assert_eq!(aggregator.answered_count(3), 1);
        assert_eq!(aggregator.answered_count(1), 0);

        aggregator.clear();
        assert_eq!(aggregator.answered_count(0), 0);
        assert!(aggregator.answers_for(3).is_none());
    }
}
