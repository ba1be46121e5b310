//! Transport adapter over a peer-to-peer data-channel primitive
//!
//! The engine never talks to a concrete WebRTC stack directly. Channels are
//! reached through the [`Channel`]/[`ClientChannel`] traits and a
//! tunnel-finder closure, and the signaling-layer operations the engine
//! needs (publishing a host identity, classifying connect failures) are
//! expressed against closures so they can be driven by any peer library
//! and mocked in tests.

use std::fmt::Display;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;
use web_time::Duration;

use crate::constants::publish;
use crate::protocol::{ClientMessage, HostMessage};
use crate::session_code::SessionCode;

/// A unique identifier for one live data channel
///
/// Channel ids are ephemeral: a reconnecting player arrives on a brand new
/// channel with a brand new id, and the registry re-points the player
/// record at it.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// Creates a new random channel id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ChannelId {
    type Err = uuid::Error;

    /// Parses a channel id from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A host-side handle for sending messages down one player channel
///
/// Implementations wrap whatever data-channel primitive the embedding
/// application uses. Delivery is assumed reliable and ordered per channel,
/// one discrete message per send call.
pub trait Channel {
    /// Sends a host message down this channel
    fn send(&self, message: &HostMessage);

    /// Closes this channel
    fn close(self);
}

/// A player-side handle for sending messages up the host channel
pub trait ClientChannel {
    /// Sends a client message up this channel
    fn send(&self, message: &ClientMessage);

    /// Closes this channel
    fn close(self);
}

/// Connection lifecycle events surfaced by a transport implementation
///
/// The embedding application maps its peer library's callbacks onto these
/// and feeds them to the host session one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A new inbound channel opened
    Open(ChannelId),
    /// A raw payload arrived on a channel
    Message(ChannelId, String),
    /// A channel closed
    Closed(ChannelId),
    /// A channel errored; treated like a close for bookkeeping
    Error(ChannelId, String),
}

/// Errors reported when publishing a session identity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The identity is already registered on the signaling layer
    #[error("session identity is already taken")]
    IdentityTaken,
    /// Any other signaling-layer failure
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Fatal host configuration failure: no session identity could be claimed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not claim a session identity after {attempts} attempts: {source}")]
pub struct ClaimIdentityError {
    /// How many publish attempts were made
    pub attempts: u32,
    /// The error from the final attempt
    #[source]
    pub source: PublishError,
}

/// Errors reported when a player connects to a session code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The published identity does not exist: the host is gone
    #[error("no session found for code {0}")]
    SessionNotFound(SessionCode),
    /// Any other transport failure, eligible for automatic reconnection
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ConnectError {
    /// Whether this failure is terminal (do not retry)
    ///
    /// A missing remote identity means the host is confirmed absent, so
    /// retrying cannot help. Everything else is treated as transient.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionNotFound(_))
    }
}

/// Publishes a session identity, regenerating the code on collisions
///
/// Generates a fresh code, publishes `session-<CODE>` through `publish`,
/// and on an [`PublishError::IdentityTaken`] collision waits via `wait` and
/// tries again with a new code, up to [`publish::MAX_ATTEMPTS`] attempts.
/// The first wait is longer than the rest so a stale registration on the
/// signaling layer has time to expire. Any other publish failure is fatal
/// immediately.
///
/// # Errors
///
/// Returns [`ClaimIdentityError`] when every attempt collided or the
/// transport failed outright; the session cannot proceed.
pub fn claim_identity<P, W>(mut publish_fn: P, mut wait: W) -> Result<SessionCode, ClaimIdentityError>
where
    P: FnMut(&str) -> Result<(), PublishError>,
    W: FnMut(Duration),
{
    for attempt in 0..publish::MAX_ATTEMPTS {
        let code = SessionCode::generate();
        match publish_fn(&code.identity()) {
            Ok(()) => {
                debug!(%code, attempt, "session identity published");
                return Ok(code);
            }
            Err(PublishError::IdentityTaken) => {
                warn!(%code, attempt, "session identity collision, regenerating");
                if attempt + 1 < publish::MAX_ATTEMPTS {
                    wait(if attempt == 0 {
                        publish::STALE_IDENTITY_DELAY
                    } else {
                        publish::RETRY_DELAY
                    });
                }
            }
            Err(error) => {
                return Err(ClaimIdentityError {
                    attempts: attempt + 1,
                    source: error,
                });
            }
        }
    }

    Err(ClaimIdentityError {
        attempts: publish::MAX_ATTEMPTS,
        source: PublishError::IdentityTaken,
    })
}
