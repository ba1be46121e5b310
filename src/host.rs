//! The host-authoritative session state machine
//!
//! One [`HostSession`] owns everything about a running session: the quiz,
//! the phase, the player registry and the collected answers. Every
//! transition is driven either by a host UI action (start, reveal, advance)
//! or by an inbound player message, and every decision that matters
//! (registration, scoring, phase gating) is made here, never on a player
//! device.
//!
//! Channels are reached through a tunnel-finder closure so the session
//! stays independent of the concrete transport.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use web_time::SystemTime;

use crate::protocol::{
    AnswerSummaryEntry, AnswerValue, ClientMessage, HostMessage, Phase, decode,
};
use crate::quiz::Quiz;
use crate::registry::{self, PlayerKey, Registry};
use crate::scoring::{AnswerAggregator, ScoreOutcome, score_answer};
use crate::session_code::SessionCode;
use crate::transport::{Channel, ChannelEvent, ChannelId};

/// A running session on the host device
#[derive(Debug)]
pub struct HostSession {
    code: SessionCode,
    quiz: Quiz,
    phase: Phase,
    current_index: usize,
    question_started_at: Option<SystemTime>,
    registry: Registry,
    answers: AnswerAggregator,
    last_outcomes: HashMap<PlayerKey, ScoreOutcome>,
}

impl HostSession {
    /// Creates a session in the lobby phase for a claimed code and a quiz
    pub fn new(code: SessionCode, quiz: Quiz) -> Self {
        Self {
            code,
            quiz,
            phase: Phase::Lobby,
            current_index: 0,
            question_started_at: None,
            registry: Registry::default(),
            answers: AnswerAggregator::default(),
            last_outcomes: HashMap::new(),
        }
    }

    /// The session code players type in to connect
    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    /// The current phase of the session
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The player registry, for host UI displays
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Index of the question currently in play, if any
    pub fn current_question_index(&self) -> Option<usize> {
        match self.phase {
            Phase::Question | Phase::AnswerReveal | Phase::AnswerSummary => {
                Some(self.current_index)
            }
            Phase::Lobby | Phase::Finished => None,
        }
    }

    /// How many players have answered the question in play
    pub fn answered_count(&self) -> usize {
        self.answers.answered_count(self.current_index)
    }

    /// Transitions the phase only if it currently matches `before`
    ///
    /// This compare-and-set is the only way the phase ever changes, so a
    /// stale UI action or a duplicate message can never skip a phase.
    fn change_phase(&mut self, before: Phase, after: Phase) -> bool {
        if self.phase == before {
            debug!(?before, ?after, "phase transition");
            self.phase = after;
            true
        } else {
            warn!(current = ?self.phase, ?before, ?after, "phase transition rejected");
            false
        }
    }

    /// Starts the quiz, opening the first question
    ///
    /// Only valid from the lobby, and only if the quiz has questions.
    /// Returns whether the transition happened.
    pub fn start_quiz<T, F>(&mut self, tunnel_finder: F) -> bool
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        if self.quiz.is_empty() || !self.change_phase(Phase::Lobby, Phase::Question) {
            return false;
        }
        self.current_index = 0;
        self.open_current_question(tunnel_finder);
        info!(code = %self.code, "quiz started");
        true
    }

    fn open_current_question<T, F>(&mut self, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        self.question_started_at = Some(SystemTime::now());
        let payload = self.quiz.questions[self.current_index].to_wire(self.current_index, self.quiz.len());
        self.registry.broadcast(&payload, tunnel_finder);
    }

    /// Closes the question in play: scores every player and reveals
    ///
    /// Each connected player gets a personalized `answer_reveal`; scores
    /// are committed to the registry here and nowhere else. Returns whether
    /// the transition happened.
    pub fn reveal_answers<T, F>(&mut self, tunnel_finder: F) -> bool
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        if !self.change_phase(Phase::Question, Phase::AnswerReveal) {
            return false;
        }

        let question = self.quiz.questions[self.current_index].clone();
        let started_at = self.question_started_at.take();
        let correct_answer = question.correct.to_answer_value();

        self.last_outcomes.clear();
        let keys: Vec<PlayerKey> = self.registry.iter().map(|(key, _)| key.clone()).collect();
        for key in keys {
            let record = self.answers.answer_of(self.current_index, &key).cloned();
            let outcome = match (&record, started_at) {
                (Some(record), Some(started_at)) => {
                    let elapsed = record
                        .received_at
                        .duration_since(started_at)
                        .unwrap_or_default();
                    score_answer(&question, &record.value, elapsed)
                }
                _ => ScoreOutcome::unanswered(),
            };

            self.registry.add_score(&key, outcome.points);
            self.registry.unicast(
                &key,
                &HostMessage::AnswerReveal {
                    question_index: self.current_index,
                    question_type: question.question_type,
                    correct_answer: correct_answer.clone(),
                    your_answer: record.map(|r| r.value),
                    correct: outcome.correct,
                    score_gained: outcome.points,
                    closeness: outcome.closeness,
                },
                &tunnel_finder,
            );
            self.last_outcomes.insert(key, outcome);
        }
        true
    }

    /// Broadcasts the per-player results of the question just revealed
    ///
    /// Returns whether the transition happened.
    pub fn show_summary<T, F>(&mut self, tunnel_finder: F) -> bool
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        if !self.change_phase(Phase::AnswerReveal, Phase::AnswerSummary) {
            return false;
        }

        let mut results: Vec<_> = self
            .registry
            .iter()
            .map(|(key, player)| {
                let outcome = self
                    .last_outcomes
                    .get(key)
                    .copied()
                    .unwrap_or_else(ScoreOutcome::unanswered);
                AnswerSummaryEntry {
                    name: player.name().to_owned(),
                    correct: outcome.correct,
                    score_gained: outcome.points,
                    total_score: player.score(),
                }
            })
            .collect();
        results.sort_by(|a, b| a.name.cmp(&b.name));

        self.registry
            .broadcast(&HostMessage::AnswerSummary { results }, tunnel_finder);
        true
    }

    /// Moves on from a revealed question: next question, or the finish
    ///
    /// Valid after a reveal whether or not the summary was shown. Past the
    /// last question the session finishes and the final standings go out.
    /// Returns whether anything happened.
    pub fn advance<T, F>(&mut self, tunnel_finder: F) -> bool
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        if !matches!(self.phase, Phase::AnswerReveal | Phase::AnswerSummary) {
            warn!(current = ?self.phase, "advance rejected");
            return false;
        }

        if self.current_index + 1 < self.quiz.len() {
            self.current_index += 1;
            self.phase = Phase::Question;
            self.open_current_question(tunnel_finder);
        } else {
            self.phase = Phase::Finished;
            self.question_started_at = None;
            let standings = self.registry.standings();
            info!(code = %self.code, players = standings.len(), "quiz finished");
            self.registry
                .broadcast(&HostMessage::GameOver { standings }, tunnel_finder);
        }
        true
    }

    /// Restarts a finished session with the same quiz and roster
    ///
    /// Scores and answers are wiped; player records and their channels are
    /// kept. Returns whether the transition happened.
    pub fn play_again<T, F>(&mut self, tunnel_finder: F) -> bool
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        if !self.change_phase(Phase::Finished, Phase::Lobby) {
            return false;
        }
        self.current_index = 0;
        self.question_started_at = None;
        self.answers.clear();
        self.last_outcomes.clear();
        self.registry.reset_for_replay();

        self.registry.broadcast(&HostMessage::PlayAgain, &tunnel_finder);
        self.broadcast_roster(tunnel_finder);
        true
    }

    /// Feeds one transport event into the session
    pub fn handle_event<T, F>(&mut self, event: ChannelEvent, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        match event {
            // Nothing to do until the peer introduces itself.
            ChannelEvent::Open(channel) => {
                debug!(%channel, "channel opened");
            }
            ChannelEvent::Message(channel, raw) => {
                self.handle_raw_message(channel, &raw, tunnel_finder);
            }
            ChannelEvent::Closed(channel) | ChannelEvent::Error(channel, _) => {
                self.handle_disconnect(channel, tunnel_finder);
            }
        }
    }

    /// Decodes and dispatches one raw payload, dropping malformed input
    pub fn handle_raw_message<T, F>(&mut self, channel: ChannelId, raw: &str, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        match decode::<ClientMessage>(raw) {
            Some(message) => self.handle_message(channel, message, tunnel_finder),
            None => {
                warn!(%channel, "dropping undecodable payload");
            }
        }
    }

    /// Dispatches one decoded player message
    pub fn handle_message<T, F>(&mut self, channel: ChannelId, message: ClientMessage, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        match message {
            ClientMessage::Join { name, avatar } => {
                self.handle_join(channel, &name, avatar, tunnel_finder);
            }
            ClientMessage::Rejoin { name, avatar } => {
                self.handle_rejoin(channel, &name, avatar, tunnel_finder);
            }
            ClientMessage::GetState { name } => {
                self.handle_get_state(channel, &name, tunnel_finder);
            }
            ClientMessage::Answer {
                question_index,
                answer,
                answered_at: _,
            } => {
                self.handle_answer(channel, question_index, answer, tunnel_finder);
            }
            // Pings are answered even before registration, so a connecting
            // player can probe liveness.
            ClientMessage::Ping => {
                if let Some(tunnel) = tunnel_finder(channel) {
                    tunnel.send(&HostMessage::Pong);
                }
            }
        }
    }

    /// Marks the player owning a closed channel disconnected
    ///
    /// The record and its score stay for a later rejoin; the updated
    /// roster is broadcast so everyone sees the connectivity change.
    pub fn handle_disconnect<T, F>(&mut self, channel: ChannelId, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        if let Some(key) = self.registry.mark_disconnected(channel) {
            info!(key = key.as_str(), "player lost their channel");
            self.broadcast_roster(tunnel_finder);
        }
    }

    fn handle_join<T, F>(&mut self, channel: ChannelId, name: &str, avatar: Option<String>, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        match self.registry.register(name, channel, avatar) {
            Ok(key) => {
                let player_name = self
                    .registry
                    .get(&key)
                    .map(|p| p.name().to_owned())
                    .unwrap_or_default();
                self.registry.unicast(
                    &key,
                    &HostMessage::Welcome {
                        player_name,
                        session_code: self.code.clone(),
                    },
                    &tunnel_finder,
                );
                self.broadcast_roster(tunnel_finder);
            }
            Err(error) => {
                Self::send_error(channel, &error, tunnel_finder);
            }
        }
    }

    fn handle_rejoin<T, F>(&mut self, channel: ChannelId, name: &str, avatar: Option<String>, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        match self.registry.reattach(name, channel) {
            Ok(key) => {
                let score = self.registry.get(&key).map_or(0, |p| p.score());
                self.registry.unicast(
                    &key,
                    &HostMessage::RejoinSuccess {
                        player_name: self
                            .registry
                            .get(&key)
                            .map(|p| p.name().to_owned())
                            .unwrap_or_default(),
                        session_code: self.code.clone(),
                        score,
                        current_question_index: self.current_question_index(),
                        phase: self.phase,
                    },
                    &tunnel_finder,
                );
                self.broadcast_roster(tunnel_finder);
            }
            // A rejoin for a name the session has never seen is treated as
            // a fresh join, so a player who lost everything still gets in.
            Err(registry::Error::NotFound) => {
                self.handle_join(channel, name, avatar, tunnel_finder);
            }
            Err(error) => {
                Self::send_error(channel, &error, tunnel_finder);
            }
        }
    }

    fn handle_get_state<T, F>(&mut self, channel: ChannelId, name: &str, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        let Some(key) = PlayerKey::new(name) else {
            Self::send_error(channel, &registry::Error::EmptyName, tunnel_finder);
            return;
        };
        let Some(player) = self.registry.get(&key) else {
            Self::send_error(channel, &registry::Error::NotFound, tunnel_finder);
            return;
        };

        // A resync can arrive on a channel the host has not associated
        // yet (a disconnect it never noticed). Adopt the new channel for a
        // disconnected record; a record live on another channel means a
        // stale duplicate tab, which is refused.
        if player.is_connected() && player.channel() != Some(channel) {
            Self::send_error(channel, &registry::Error::AlreadyConnected, tunnel_finder);
            return;
        }
        if !player.is_connected() && self.registry.reattach(name, channel).is_ok() {
            self.broadcast_roster(&tunnel_finder);
        }

        let score = self.registry.get(&key).map_or(0, |p| p.score());
        let snapshot = HostMessage::GameState {
            phase: self.phase,
            current_question_index: self.current_question_index(),
            score,
            standings: (self.phase == Phase::Finished).then(|| self.registry.standings()),
        };
        self.registry.unicast(&key, &snapshot, &tunnel_finder);

        // A resyncing player mid-question needs the rendering payload
        // again; the snapshot alone only names the index.
        if self.phase == Phase::Question {
            let payload = self.quiz.questions[self.current_index].to_wire(self.current_index, self.quiz.len());
            self.registry.unicast(&key, &payload, &tunnel_finder);
        }
    }

    fn handle_answer<T, F>(
        &mut self,
        channel: ChannelId,
        question_index: usize,
        answer: AnswerValue,
        tunnel_finder: F,
    ) where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        // Answers only count while their question is the one in play; a
        // late or mis-indexed submission is dropped without a reply.
        if self.phase != Phase::Question || question_index != self.current_index {
            debug!(%channel, question_index, "ignoring out-of-window answer");
            return;
        }
        let Some(key) = self.registry.key_for_channel(channel).cloned() else {
            warn!(%channel, "answer from unregistered channel");
            return;
        };

        self.answers
            .record(question_index, key.clone(), answer, SystemTime::now());
        self.registry.mark_answered(&key, question_index);
        self.registry
            .unicast(&key, &HostMessage::AnswerAck { question_index }, tunnel_finder);
    }

    fn broadcast_roster<T, F>(&self, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        self.registry.broadcast(
            &HostMessage::PlayerList {
                players: self.registry.player_list(),
            },
            tunnel_finder,
        );
    }

    fn send_error<T, F>(channel: ChannelId, error: &registry::Error, tunnel_finder: F)
    where
        T: Channel,
        F: Fn(ChannelId) -> Option<T>,
    {
        if let Some(tunnel) = tunnel_finder(channel) {
            tunnel.send(&HostMessage::Error {
                message: error.to_string(),
            });
        }
    }
}
