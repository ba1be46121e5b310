//! Configuration constants for the peerquiz session engine
//!
//! This module contains the tunable limits and timing defaults used
//! throughout the crate. They are exposed as named constants so that
//! none of the retry/backoff behavior hides behind inline literals.

/// Session identity and capacity constants
pub mod session {
    /// Number of characters in a session code
    pub const CODE_LENGTH: usize = 4;
    /// Alphabet used for session codes, with visually-confusable glyphs
    /// (I, L, O, 0, 1) removed
    pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
    /// Prefix prepended to a session code to form the published identity
    pub const IDENTITY_PREFIX: &str = "session-";
    /// Maximum number of player records in a single session
    pub const MAX_PLAYERS: usize = 20;
}

/// Host-side identity publishing retry constants
pub mod publish {
    use web_time::Duration;

    /// Maximum number of attempts to claim a session identity
    pub const MAX_ATTEMPTS: u32 = 3;
    /// Delay before the first retry, long enough for a stale registration
    /// on the signaling layer to expire
    pub const STALE_IDENTITY_DELAY: Duration = Duration::from_secs(3);
    /// Delay before subsequent retries
    pub const RETRY_DELAY: Duration = Duration::from_secs(1);
}

/// Player-side reconnection constants
pub mod reconnect {
    use web_time::Duration;

    /// Maximum number of automatic reconnection attempts before giving up
    pub const MAX_ATTEMPTS: u32 = 3;
    /// Interval between reconnection attempts
    pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);
}

/// Scoring formula constants
pub mod scoring {
    /// Maximum points for the base component of every formula
    pub const MAX_BASE_POINTS: f64 = 1000.0;
    /// Additive speed bonus ceiling for multi-select questions
    pub const MULTI_SELECT_SPEED_BONUS: f64 = 150.0;
    /// Bonus for selecting exactly the correct set on a multi-select question
    pub const MULTI_SELECT_PERFECT_BONUS: f64 = 200.0;
    /// Upper clamp for a multi-select score
    pub const MULTI_SELECT_MAX_POINTS: f64 = 1500.0;
    /// Default per-question time limit when the quiz does not specify one
    pub const DEFAULT_TIME_LIMIT_SECONDS: u64 = 20;
}
