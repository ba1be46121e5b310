//! The quiz object consumed at session start
//!
//! A [`Quiz`] is handed to the host session whole by an external
//! collaborator (authoring, import, storage). The engine trusts its shape
//! and never validates quiz JSON itself; it only reads questions off the
//! ordered list and renders them onto the wire.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use web_time::Duration;

use crate::constants::scoring::DEFAULT_TIME_LIMIT_SECONDS;
use crate::protocol::{AnswerValue, HostMessage};

/// A complete quiz: a title and an ordered list of questions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    /// The quiz title (not used in gameplay)
    pub title: String,
    /// The questions, presented in order
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Returns the number of questions in this quiz
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Checks whether this quiz contains any questions
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// The type tag of a question, deciding its answer shape and scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Single-select from a list of options
    MultipleChoice,
    /// Single-select between true and false
    TrueFalse,
    /// A numeric value on a bounded range
    Slider,
    /// Any subset of the options, with partial credit
    MultiSelect,
}

/// The correct-answer encoding, matching the question's type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    /// The correct option index for single-select questions
    Index(usize),
    /// The correct value for slider questions
    Value(f64),
    /// The correct option indices for multi-select questions
    Indices(Vec<usize>),
}

impl CorrectAnswer {
    /// Converts the encoding into the wire answer-value shape
    pub fn to_answer_value(&self) -> AnswerValue {
        match self {
            Self::Index(i) => AnswerValue::Index(*i),
            Self::Value(v) => AnswerValue::Slider(*v),
            Self::Indices(indices) => AnswerValue::Selection(indices.clone()),
        }
    }

    /// Returns the encoding as a numeric slider value
    ///
    /// Accepts both `Value` and `Index`, since a whole-number correct
    /// value in quiz JSON deserializes as an index through the untagged
    /// union.
    pub fn as_slider_value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Index(i) => Some(*i as f64),
            Self::Indices(_) => None,
        }
    }
}

/// Media attached to a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Media {
    /// An image referenced by URL
    Image {
        /// Where the image lives
        url: String,
        /// Alternative text for accessibility
        alt: String,
    },
}

fn default_time_limit() -> Duration {
    Duration::from_secs(DEFAULT_TIME_LIMIT_SECONDS)
}

/// A single question with its options, correct answer and timing
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// The question text shown to players
    pub text: String,
    /// The question type tag
    pub question_type: QuestionType,
    /// Answer options; empty for slider questions
    #[serde(default)]
    pub options: Vec<String>,
    /// The correct answer in the encoding matching `question_type`
    pub correct: CorrectAnswer,
    /// Time players have to answer
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_time_limit")]
    pub time_limit: Duration,
    /// Lower bound of the slider range
    pub slider_min: Option<f64>,
    /// Upper bound of the slider range
    pub slider_max: Option<f64>,
    /// Optional media accompanying the question
    pub media: Option<Media>,
}

impl Question {
    /// Returns the slider bounds as a `(min, max)` pair, if both are set
    pub fn slider_range(&self) -> Option<(f64, f64)> {
        match (self.slider_min, self.slider_max) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    }

    /// Builds the full rendering payload broadcast when this question starts
    pub fn to_wire(&self, index: usize, total: usize) -> HostMessage {
        HostMessage::Question {
            index,
            total,
            text: self.text.clone(),
            options: self.options.clone(),
            time_limit_seconds: self.time_limit.as_secs(),
            question_type: self.question_type,
            slider_min: self.slider_min,
            slider_max: self.slider_max,
            media: self.media.clone(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_question_defaults_on_deserialize() {
        let question: Question = serde_json::from_str(
            r#"{"text":"2+2?","question_type":"multiple_choice","options":["3","4"],"correct":1}"#,
        )
        .unwrap();
        assert_eq!(question.time_limit, Duration::from_secs(DEFAULT_TIME_LIMIT_SECONDS));
        assert_eq!(question.correct, CorrectAnswer::Index(1));
        assert!(question.slider_range().is_none());
    }

    #[test]
    fn test_slider_question_range() {
        let question: Question = serde_json::from_str(
            r#"{"text":"?","question_type":"slider","correct":50.0,"slider_min":0.0,"slider_max":100.0,"time_limit":10}"#,
        )
        .unwrap();
        assert_eq!(question.slider_range(), Some((0.0, 100.0)));
        assert_eq!(question.time_limit, Duration::from_secs(10));
        assert!(question.options.is_empty());
    }

    #[test]
    fn test_to_wire_carries_rendering_payload() {
        let question = Question {
            text: "Pick two".to_string(),
            question_type: QuestionType::MultiSelect,
            options: vec!["a".into(), "b".into(), "c".into()],
            correct: CorrectAnswer::Indices(vec![0, 2]),
            time_limit: Duration::from_secs(30),
            slider_min: None,
            slider_max: None,
            media: None,
        };
        match question.to_wire(2, 7) {
            HostMessage::Question {
                index,
                total,
                time_limit_seconds,
                question_type,
                options,
                ..
            } => {
                assert_eq!(index, 2);
                assert_eq!(total, 7);
                assert_eq!(time_limit_seconds, 30);
                assert_eq!(question_type, QuestionType::MultiSelect);
                assert_eq!(options.len(), 3);
            }
            other => panic!("expected a question payload, got {other:?}"),
        }
    }
}
