//! The player-side session: local view and reconnection manager
//!
//! A [`PlayerSession`] never decides anything about the game; it folds the
//! host's messages into a local view for rendering and produces the
//! messages the player should send. Its real job is the reconnection
//! policy: when the channel to the host drops, it schedules bounded retry
//! attempts, keeps at most one attempt in flight, and knows which
//! handshake to replay once a new channel is up.
//!
//! The embedding application owns the actual timers and peer connection;
//! this type only answers "wait this long, then try again" and "now send
//! these".

use tracing::{debug, info, warn};
use web_time::{Duration, SystemTime};

use crate::constants::reconnect;
use crate::protocol::{AnswerValue, ClientMessage, HostMessage, Phase, PlayerInfo, Standing};
use crate::session_code::SessionCode;
use crate::transport::{ClientChannel, ConnectError};

/// Connectivity status of the player's channel to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The channel is up
    Connected,
    /// No channel is open: the initial dial or a retry is in progress
    Reconnecting,
    /// Reconnection has been abandoned; the player must act manually
    Failed,
}

/// Bounds on the automatic reconnection policy
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    /// How many attempts to make per outage before giving up
    pub max_attempts: u32,
    /// Fixed delay before each attempt
    pub retry_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: reconnect::MAX_ATTEMPTS,
            retry_interval: reconnect::RETRY_INTERVAL,
        }
    }
}

/// The player's local, render-ready view of the session
///
/// Everything here is an echo of what the host said last; nothing in it is
/// authoritative.
#[derive(Debug, Clone, Default)]
pub struct PlayerView {
    /// The phase the host last reported
    pub phase: Option<Phase>,
    /// Index of the question in play, if any
    pub current_question_index: Option<usize>,
    /// The player's cumulative score as confirmed by the host
    pub score: u64,
    /// The roster from the last `player_list` broadcast
    pub roster: Vec<PlayerInfo>,
    /// Final standings, once the game has finished
    pub standings: Option<Vec<Standing>>,
    /// The last advisory error the host sent this channel
    pub last_error: Option<String>,
}

/// One player's connection to a session
#[derive(Debug)]
pub struct PlayerSession {
    code: SessionCode,
    name: String,
    avatar: Option<String>,
    config: ReconnectConfig,
    state: ConnectionState,
    attempts_made: u32,
    attempt_in_flight: bool,
    resync_needed: bool,
    view: PlayerView,
}

impl PlayerSession {
    /// Creates a session for a code the player typed in
    pub fn new(code: SessionCode, name: String, avatar: Option<String>) -> Self {
        Self::with_config(code, name, avatar, ReconnectConfig::default())
    }

    /// Creates a session with a non-default reconnection policy
    pub fn with_config(
        code: SessionCode,
        name: String,
        avatar: Option<String>,
        config: ReconnectConfig,
    ) -> Self {
        Self {
            code,
            name,
            avatar,
            config,
            // No channel exists yet; the initial dial is an outage too.
            state: ConnectionState::Reconnecting,
            attempts_made: 0,
            attempt_in_flight: false,
            resync_needed: false,
            view: PlayerView::default(),
        }
    }

    /// The code of the session this player is in
    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    /// The current connectivity status
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The local view for rendering
    pub fn view(&self) -> &PlayerView {
        &self.view
    }

    /// The initial handshake sent when the first channel opens
    pub fn join_message(&self) -> ClientMessage {
        ClientMessage::Join {
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }

    /// Reports that the first channel to the host is open and joins
    ///
    /// Sends the `join` handshake down the channel and flips the state to
    /// connected. Later reopens go through [`Self::complete_reconnect`]
    /// instead, which preserves the player's identity and score.
    pub fn channel_opened<C: ClientChannel>(&mut self, channel: &C) {
        self.state = ConnectionState::Connected;
        self.attempt_in_flight = false;
        self.attempts_made = 0;
        channel.send(&self.join_message());
    }

    /// Builds an answer submission, stamped with the local clock
    pub fn answer_message(&self, question_index: usize, answer: AnswerValue) -> ClientMessage {
        let answered_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .ok()
            .map(|since_epoch| since_epoch.as_millis() as u64);
        ClientMessage::Answer {
            question_index,
            answer,
            answered_at,
        }
    }

    /// Reports that the channel to the host dropped
    ///
    /// Starts a fresh outage: the attempt counter resets and the caller
    /// should schedule the first attempt after the returned delay. Returns
    /// `None` when reconnection has already been abandoned. Losing the
    /// channel mid-game also flags that the view must be resynced after
    /// the next successful handshake.
    pub fn on_channel_lost(&mut self) -> Option<Duration> {
        if self.state == ConnectionState::Failed {
            return None;
        }
        if self.view.phase.is_some_and(|phase| phase != Phase::Lobby) {
            self.resync_needed = true;
        }
        self.state = ConnectionState::Reconnecting;
        self.attempts_made = 0;
        self.attempt_in_flight = false;
        info!(code = %self.code, "channel lost, scheduling reconnection");
        Some(self.config.retry_interval)
    }

    /// Claims the next reconnection attempt
    ///
    /// Returns whether the caller may dial now. At most one attempt is
    /// ever in flight, and no attempt is granted past the configured
    /// bound or outside an outage.
    pub fn begin_attempt(&mut self) -> bool {
        if self.state != ConnectionState::Reconnecting
            || self.attempt_in_flight
            || self.attempts_made >= self.config.max_attempts
        {
            return false;
        }
        self.attempts_made += 1;
        self.attempt_in_flight = true;
        debug!(attempt = self.attempts_made, "reconnection attempt started");
        true
    }

    /// Reports that the in-flight attempt failed
    ///
    /// Returns the delay before the next attempt, or `None` when the
    /// outage is abandoned: either the failure is terminal (the host is
    /// confirmed gone) or the attempt bound is exhausted.
    pub fn attempt_failed(&mut self, error: &ConnectError) -> Option<Duration> {
        self.attempt_in_flight = false;
        if error.is_terminal() || self.attempts_made >= self.config.max_attempts {
            warn!(%error, attempts = self.attempts_made, "reconnection abandoned");
            self.state = ConnectionState::Failed;
            return None;
        }
        debug!(%error, attempt = self.attempts_made, "reconnection attempt failed");
        Some(self.config.retry_interval)
    }

    /// Reports that a new channel to the host is open
    ///
    /// Returns the handshake to send on it: a `rejoin` to restore the
    /// identity and score, followed by a `get_state` when the outage may
    /// have straddled a phase change.
    pub fn attempt_succeeded(&mut self) -> Vec<ClientMessage> {
        self.state = ConnectionState::Connected;
        self.attempt_in_flight = false;
        self.attempts_made = 0;
        info!(code = %self.code, "reconnected");

        let mut handshake = vec![ClientMessage::Rejoin {
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }];
        if std::mem::take(&mut self.resync_needed) {
            handshake.push(ClientMessage::GetState {
                name: self.name.clone(),
            });
        }
        handshake
    }

    /// Completes a reconnection attempt over the freshly opened channel
    ///
    /// Sends the rejoin (and, after a mid-game outage, resync) handshake
    /// from [`Self::attempt_succeeded`] directly.
    pub fn complete_reconnect<C: ClientChannel>(&mut self, channel: &C) {
        for message in self.attempt_succeeded() {
            channel.send(&message);
        }
    }

    /// Submits an answer for a question up the host channel
    pub fn submit_answer<C: ClientChannel>(
        &self,
        channel: &C,
        question_index: usize,
        answer: AnswerValue,
    ) {
        channel.send(&self.answer_message(question_index, answer));
    }

    /// Folds one host message into the local view
    pub fn handle_message(&mut self, message: HostMessage) {
        match message {
            HostMessage::Welcome { player_name, .. } => {
                self.name = player_name;
                self.view.phase = Some(Phase::Lobby);
            }
            HostMessage::RejoinSuccess {
                player_name,
                score,
                current_question_index,
                phase,
                ..
            } => {
                self.name = player_name;
                self.view.score = score;
                self.view.current_question_index = current_question_index;
                self.view.phase = Some(phase);
            }
            HostMessage::GameState {
                phase,
                current_question_index,
                score,
                standings,
            } => {
                self.view.phase = Some(phase);
                self.view.current_question_index = current_question_index;
                self.view.score = score;
                if standings.is_some() {
                    self.view.standings = standings;
                }
            }
            HostMessage::PlayerList { players } => {
                self.view.roster = players;
            }
            HostMessage::Question { index, .. } => {
                self.view.phase = Some(Phase::Question);
                self.view.current_question_index = Some(index);
            }
            HostMessage::AnswerReveal { score_gained, .. } => {
                self.view.phase = Some(Phase::AnswerReveal);
                self.view.score += score_gained;
            }
            HostMessage::AnswerSummary { .. } => {
                self.view.phase = Some(Phase::AnswerSummary);
            }
            HostMessage::GameOver { standings } => {
                self.view.phase = Some(Phase::Finished);
                self.view.standings = Some(standings);
            }
            HostMessage::PlayAgain => {
                self.view.phase = Some(Phase::Lobby);
                self.view.score = 0;
                self.view.current_question_index = None;
                self.view.standings = None;
            }
            HostMessage::Error { message } => {
                self.view.last_error = Some(message);
            }
            HostMessage::AnswerAck { .. } | HostMessage::Pong => {}
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn session() -> PlayerSession {
        PlayerSession::new(
            SessionCode::from_str("AB23").unwrap(),
            "Ada".to_string(),
            None,
        )
    }

    fn transient() -> ConnectError {
        ConnectError::Transport("connection reset".to_string())
    }

    #[derive(Clone, Default)]
    struct RecordingChannel {
        sent: std::sync::Arc<std::sync::Mutex<Vec<ClientMessage>>>,
    }

    impl RecordingChannel {
        fn drain(&self) -> Vec<ClientMessage> {
            self.sent.lock().unwrap().drain(..).collect()
        }
    }

    impl ClientChannel for RecordingChannel {
        fn send(&self, message: &ClientMessage) {
            self.sent.lock().unwrap().push(message.clone());
        }

        fn close(self) {}
    }

    #[test]
    fn test_view_follows_host_messages() {
        let mut player = session();
        player.handle_message(HostMessage::Welcome {
            player_name: "Ada".to_string(),
            session_code: player.code().clone(),
        });
        assert_eq!(player.view().phase, Some(Phase::Lobby));

        player.handle_message(HostMessage::Question {
            index: 2,
            total: 5,
            text: "?".to_string(),
            options: Vec::new(),
            time_limit_seconds: 20,
            question_type: crate::quiz::QuestionType::MultipleChoice,
            slider_min: None,
            slider_max: None,
            media: None,
        });
        assert_eq!(player.view().phase, Some(Phase::Question));
        assert_eq!(player.view().current_question_index, Some(2));

        player.handle_message(HostMessage::AnswerReveal {
            question_index: 2,
            question_type: crate::quiz::QuestionType::MultipleChoice,
            correct_answer: AnswerValue::Index(1),
            your_answer: Some(AnswerValue::Index(1)),
            correct: true,
            score_gained: 900,
            closeness: None,
        });
        assert_eq!(player.view().score, 900);
        assert_eq!(player.view().phase, Some(Phase::AnswerReveal));

        player.handle_message(HostMessage::GameOver {
            standings: vec![Standing {
                rank: 1,
                name: "Ada".to_string(),
                score: 900,
            }],
        });
        assert_eq!(player.view().phase, Some(Phase::Finished));
        assert!(player.view().standings.is_some());

        player.handle_message(HostMessage::PlayAgain);
        assert_eq!(player.view().phase, Some(Phase::Lobby));
        assert_eq!(player.view().score, 0);
        assert!(player.view().standings.is_none());
    }

    #[test]
    fn test_reconnection_gives_up_after_bounded_attempts() {
        let mut player = session();
        assert_eq!(
            player.on_channel_lost(),
            Some(reconnect::RETRY_INTERVAL)
        );
        assert_eq!(player.state(), ConnectionState::Reconnecting);

        for attempt in 1..=reconnect::MAX_ATTEMPTS {
            assert!(player.begin_attempt(), "attempt {attempt}");
            let delay = player.attempt_failed(&transient());
            if attempt < reconnect::MAX_ATTEMPTS {
                assert_eq!(delay, Some(reconnect::RETRY_INTERVAL));
            } else {
                assert_eq!(delay, None);
            }
        }

        assert_eq!(player.state(), ConnectionState::Failed);
        assert!(!player.begin_attempt());
        assert_eq!(player.on_channel_lost(), None);
    }

    #[test]
    fn test_only_one_attempt_in_flight() {
        let mut player = session();
        player.on_channel_lost();

        assert!(player.begin_attempt());
        assert!(!player.begin_attempt());

        player.attempt_failed(&transient());
        assert!(player.begin_attempt());
    }

    #[test]
    fn test_terminal_failure_abandons_immediately() {
        let mut player = session();
        player.on_channel_lost();
        assert!(player.begin_attempt());

        let code = player.code().clone();
        let delay = player.attempt_failed(&ConnectError::SessionNotFound(code));
        assert_eq!(delay, None);
        assert_eq!(player.state(), ConnectionState::Failed);
        assert!(!player.begin_attempt());
    }

    #[test]
    fn test_midgame_reconnect_replays_rejoin_then_resync() {
        let mut player = session();
        player.handle_message(HostMessage::Question {
            index: 1,
            total: 3,
            text: "?".to_string(),
            options: Vec::new(),
            time_limit_seconds: 20,
            question_type: crate::quiz::QuestionType::TrueFalse,
            slider_min: None,
            slider_max: None,
            media: None,
        });

        player.on_channel_lost();
        assert!(player.begin_attempt());
        let handshake = player.attempt_succeeded();

        assert_eq!(handshake.len(), 2);
        assert!(matches!(&handshake[0], ClientMessage::Rejoin { name, .. } if name == "Ada"));
        assert!(matches!(&handshake[1], ClientMessage::GetState { name } if name == "Ada"));
        assert_eq!(player.state(), ConnectionState::Connected);

        // A later outage starts with a fresh attempt budget.
        assert!(player.on_channel_lost().is_some());
        assert!(player.begin_attempt());
    }

    #[test]
    fn test_lobby_reconnect_skips_resync() {
        let mut player = session();
        player.handle_message(HostMessage::Welcome {
            player_name: "Ada".to_string(),
            session_code: player.code().clone(),
        });

        player.on_channel_lost();
        player.begin_attempt();
        let handshake = player.attempt_succeeded();

        assert_eq!(handshake.len(), 1);
        assert!(matches!(&handshake[0], ClientMessage::Rejoin { .. }));
    }

    #[test]
    fn test_not_connected_until_first_channel_opens() {
        let mut player = session();
        assert_eq!(player.state(), ConnectionState::Reconnecting);

        let channel = RecordingChannel::default();
        player.channel_opened(&channel);

        assert_eq!(player.state(), ConnectionState::Connected);
        assert!(matches!(
            channel.drain().as_slice(),
            [ClientMessage::Join { name, .. }] if name == "Ada"
        ));
    }

    #[test]
    fn test_reconnect_handshake_goes_down_the_new_channel() {
        let mut player = session();
        let channel = RecordingChannel::default();
        player.channel_opened(&channel);
        player.handle_message(HostMessage::Question {
            index: 0,
            total: 2,
            text: "?".to_string(),
            options: Vec::new(),
            time_limit_seconds: 20,
            question_type: crate::quiz::QuestionType::MultipleChoice,
            slider_min: None,
            slider_max: None,
            media: None,
        });
        channel.drain();

        player.on_channel_lost();
        assert!(player.begin_attempt());
        let replacement = RecordingChannel::default();
        player.complete_reconnect(&replacement);

        let sent = replacement.drain();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], ClientMessage::Rejoin { .. }));
        assert!(matches!(&sent[1], ClientMessage::GetState { .. }));
        assert_eq!(player.state(), ConnectionState::Connected);

        player.submit_answer(&replacement, 0, AnswerValue::Index(1));
        assert!(matches!(
            replacement.drain().as_slice(),
            [ClientMessage::Answer { question_index: 0, .. }]
        ));
    }

    #[test]
    fn test_answer_message_carries_local_timestamp() {
        let player = session();
        match player.answer_message(0, AnswerValue::Index(1)) {
            ClientMessage::Answer {
                question_index,
                answer,
                answered_at,
            } => {
                assert_eq!(question_index, 0);
                assert_eq!(answer, AnswerValue::Index(1));
                assert!(answered_at.is_some());
            }
            other => panic!("expected an answer, got {other:?}"),
        }
    }
}
