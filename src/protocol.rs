//! The wire message contract between host and players
//!
//! This module defines the closed set of tagged messages exchanged in each
//! direction. Every message is a flat object carrying a `type` tag and is
//! self-describing; receivers decode with [`decode`] and drop anything that
//! does not match a known shape instead of erroring.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_with::skip_serializing_none;

use crate::quiz::{Media, QuestionType};
use crate::session_code::SessionCode;

/// One state of the host-authoritative game state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for players to join before the quiz starts
    Lobby,
    /// A question is open for answers
    Question,
    /// The correct answer has been revealed and scores awarded
    AnswerReveal,
    /// Per-player results for the question are on display
    AnswerSummary,
    /// The quiz has ended and final standings are out
    Finished,
}

/// A submitted answer in any of the supported shapes
///
/// The wire form is the bare value: an option index, a numeric slider
/// value, or an array of option indices. Whole-number slider submissions
/// arrive as `Index`, so slider handling goes through [`Self::as_slider_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::From)]
#[serde(untagged)]
pub enum AnswerValue {
    /// A single selected option index
    Index(usize),
    /// A numeric slider value
    Slider(f64),
    /// The selected option indices of a multi-select answer
    Selection(Vec<usize>),
}

impl AnswerValue {
    /// Returns the answer as a single option index, if it is one
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the answer as a slider value
    ///
    /// Accepts both `Slider` and `Index`, since integral slider values
    /// deserialize as indices.
    pub fn as_slider_value(&self) -> Option<f64> {
        match self {
            Self::Slider(v) => Some(*v),
            Self::Index(i) => Some(*i as f64),
            Self::Selection(_) => None,
        }
    }

    /// Returns the answer as a multi-select choice of indices
    pub fn as_selection(&self) -> Option<&[usize]> {
        match self {
            Self::Selection(indices) => Some(indices),
            _ => None,
        }
    }
}

/// A roster entry in a `player_list` broadcast
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// The player's display name
    pub name: String,
    /// Optional avatar descriptor chosen by the player
    pub avatar: Option<String>,
    /// The player's cumulative score
    pub score: u64,
    /// Whether the player currently has a live channel
    pub connected: bool,
}

/// One row of the final (or current) ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// 1-based position in the ranking
    pub rank: usize,
    /// The player's display name
    pub name: String,
    /// The player's cumulative score
    pub score: u64,
}

/// One row of an `answer_summary` broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSummaryEntry {
    /// The player's display name
    pub name: String,
    /// Whether the player's answer was correct
    pub correct: bool,
    /// Points the player gained on this question
    pub score_gained: u64,
    /// The player's cumulative score after this question
    pub total_score: u64,
}

/// Messages sent from a player to the host
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request to join the session under a display name
    Join {
        /// The requested display name
        name: String,
        /// Optional avatar descriptor
        avatar: Option<String>,
    },
    /// Reconnection handshake preserving an existing identity and score
    Rejoin {
        /// The display name used when first joining
        name: String,
        /// Optional avatar descriptor
        avatar: Option<String>,
    },
    /// Resync handshake restoring the view of the current phase/question
    GetState {
        /// The display name used when first joining
        name: String,
    },
    /// An answer submission for the current question
    #[serde(rename_all = "camelCase")]
    Answer {
        /// Index of the question being answered
        question_index: usize,
        /// The submitted answer value
        answer: AnswerValue,
        /// Client-side submission moment in epoch milliseconds (advisory;
        /// the host scores by its own receipt time)
        answered_at: Option<u64>,
    },
    /// Opportunistic liveness probe
    Ping,
}

/// Messages sent from the host to a player
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Confirms a fresh join
    #[serde(rename_all = "camelCase")]
    Welcome {
        /// The display name the player was registered under
        player_name: String,
        /// The code of the session joined
        session_code: SessionCode,
    },
    /// Confirms a rejoin, restoring identity and score
    #[serde(rename_all = "camelCase")]
    RejoinSuccess {
        /// The display name the player was re-registered under
        player_name: String,
        /// The code of the session joined
        session_code: SessionCode,
        /// The player's preserved cumulative score
        score: u64,
        /// Index of the current question, if one is active
        current_question_index: Option<usize>,
        /// The current game phase
        phase: Phase,
    },
    /// Full snapshot of the player's view of the session
    #[serde(rename_all = "camelCase")]
    GameState {
        /// The current game phase
        phase: Phase,
        /// Index of the current question, if one is active
        current_question_index: Option<usize>,
        /// The requesting player's cumulative score
        score: u64,
        /// Current ranking, included once the game has finished
        standings: Option<Vec<Standing>>,
    },
    /// Current roster, broadcast after every registry mutation
    PlayerList {
        /// All player records in the session
        players: Vec<PlayerInfo>,
    },
    /// The full rendering payload of a question
    #[serde(rename_all = "camelCase")]
    Question {
        /// 0-based index of this question
        index: usize,
        /// Total number of questions in the quiz
        total: usize,
        /// The question text
        text: String,
        /// Answer options (empty for slider questions)
        options: Vec<String>,
        /// Seconds players have to answer
        time_limit_seconds: u64,
        /// The question type tag
        question_type: QuestionType,
        /// Lower bound of the slider range, for slider questions
        slider_min: Option<f64>,
        /// Upper bound of the slider range, for slider questions
        slider_max: Option<f64>,
        /// Optional media accompanying the question
        media: Option<Media>,
    },
    /// Acknowledges receipt of an answer
    #[serde(rename_all = "camelCase")]
    AnswerAck {
        /// Index of the acknowledged question
        question_index: usize,
    },
    /// Personalized reveal of the correct answer and points gained
    #[serde(rename_all = "camelCase")]
    AnswerReveal {
        /// Index of the revealed question
        question_index: usize,
        /// The question type tag
        question_type: QuestionType,
        /// The correct answer in the shape matching the question type
        correct_answer: AnswerValue,
        /// The recipient's submitted answer, if any
        your_answer: Option<AnswerValue>,
        /// Whether the recipient's answer was correct
        correct: bool,
        /// Points the recipient gained on this question
        score_gained: u64,
        /// Absolute distance to the correct value, for slider questions
        closeness: Option<f64>,
    },
    /// Per-player results for the question just revealed
    AnswerSummary {
        /// One entry per player who was scored
        results: Vec<AnswerSummaryEntry>,
    },
    /// Final standings at the end of the quiz
    GameOver {
        /// The final ranking, best score first
        standings: Vec<Standing>,
    },
    /// The session is restarting with scores reset
    PlayAgain,
    /// An advisory error string for the receiving channel only
    Error {
        /// Human-readable description of what was rejected
        message: String,
    },
    /// Liveness reply to a `ping`
    Pong,
}

impl ClientMessage {
    /// Converts the message to its JSON wire form
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which cannot happen for these shapes.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

impl HostMessage {
    /// Converts the message to its JSON wire form
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which cannot happen for these shapes.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Decodes a raw payload into a message, tolerating malformed input
///
/// Returns `None` for payloads missing their `type` tag or of unknown
/// shape; a peer must never be able to crash the session with a bad frame.
pub fn decode<M: DeserializeOwned>(raw: &str) -> Option<M> {
    serde_json::from_str(raw).ok()
}
