//! Host-side player and connection registry
//!
//! This module is the host's bookkeeping for everyone in the session. It
//! maps a canonical player key (trimmed, case-folded name) to a player
//! record and to the live channel currently attached to that player.
//! Records are never deleted for the lifetime of the session; a departing
//! player is only marked disconnected so their score survives a rejoin.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::constants::session::MAX_PLAYERS;
use crate::protocol::{HostMessage, PlayerInfo, Standing};
use crate::transport::{Channel, ChannelId};

/// The canonical uniqueness key for a player: name trimmed and case-folded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerKey(String);

impl PlayerKey {
    /// Canonicalizes a display name, returning `None` if nothing is left
    /// after trimming
    pub fn new(name: &str) -> Option<Self> {
        let folded = name.trim().to_lowercase();
        if folded.is_empty() {
            None
        } else {
            Some(Self(folded))
        }
    }

    /// Returns the canonical key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One player record, created on first join and kept for the session
#[derive(Debug, Clone)]
pub struct Player {
    name: String,
    avatar: Option<String>,
    score: u64,
    connected: bool,
    channel: Option<ChannelId>,
    answered: HashSet<usize>,
}

impl Player {
    /// The display name the player joined with (trimmed, case preserved)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The player's avatar descriptor, if they chose one
    pub fn avatar(&self) -> Option<&str> {
        self.avatar.as_deref()
    }

    /// The player's cumulative score
    pub fn score(&self) -> u64 {
        self.score
    }

    /// Whether the player currently has a live channel
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The channel currently attached to the player, if connected
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    /// Whether the player has already answered the given question
    pub fn has_answered(&self, question_index: usize) -> bool {
        self.answered.contains(&question_index)
    }
}

/// Reasons a join or rejoin is rejected
///
/// These are reported only to the offending channel as an advisory
/// `error` message; nothing about the session changes.
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A connected player already holds this name
    #[error("that name is already taken")]
    DuplicateName,
    /// The session has reached its player cap
    #[error("the room is full")]
    RoomFull,
    /// The name is empty after trimming
    #[error("a name cannot be empty")]
    EmptyName,
    /// No record exists for this name
    #[error("no player with that name has joined")]
    NotFound,
    /// The record is already attached to a live channel, so a stale
    /// duplicate tab cannot silently take over
    #[error("a player with that name is still connected")]
    AlreadyConnected,
}

/// The host's player registry
///
/// All operations are keyed by canonical player key; at most one record
/// exists per key, and the registry holds at most `capacity` records.
#[derive(Debug)]
pub struct Registry {
    players: HashMap<PlayerKey, Player>,
    capacity: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_capacity(MAX_PLAYERS)
    }
}

impl Registry {
    /// Creates a registry with a non-default player cap
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            players: HashMap::new(),
            capacity,
        }
    }

    /// Registers a fresh player and attaches their channel
    ///
    /// A record that exists but is disconnected is reclaimed: the new
    /// channel is attached and the record's score survives. Only a record
    /// with a live channel blocks the name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyName`], [`Error::DuplicateName`] or
    /// [`Error::RoomFull`].
    pub fn register(
        &mut self,
        name: &str,
        channel: ChannelId,
        avatar: Option<String>,
    ) -> Result<PlayerKey, Error> {
        let key = PlayerKey::new(name).ok_or(Error::EmptyName)?;

        if let Some(player) = self.players.get_mut(&key) {
            if player.connected {
                return Err(Error::DuplicateName);
            }
            player.connected = true;
            player.channel = Some(channel);
            if avatar.is_some() {
                player.avatar = avatar;
            }
            debug!(key = key.as_str(), %channel, "reclaimed disconnected player record");
            return Ok(key);
        }

        if self.players.len() >= self.capacity {
            return Err(Error::RoomFull);
        }

        self.players.insert(
            key.clone(),
            Player {
                name: name.trim().to_owned(),
                avatar,
                score: 0,
                connected: true,
                channel: Some(channel),
                answered: HashSet::new(),
            },
        );
        debug!(key = key.as_str(), %channel, "registered player");
        Ok(key)
    }

    /// Re-attaches a rejoining player to a new channel
    ///
    /// The record's score and answered-set are untouched; only the channel
    /// handle is replaced, never duplicated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record exists (callers fall back
    /// to a fresh [`Self::register`]), [`Error::AlreadyConnected`] if the
    /// record still has a live channel, or [`Error::EmptyName`].
    pub fn reattach(&mut self, name: &str, channel: ChannelId) -> Result<PlayerKey, Error> {
        let key = PlayerKey::new(name).ok_or(Error::EmptyName)?;

        let player = self.players.get_mut(&key).ok_or(Error::NotFound)?;
        if player.connected {
            return Err(Error::AlreadyConnected);
        }
        player.connected = true;
        player.channel = Some(channel);
        debug!(key = key.as_str(), %channel, "player reattached");
        Ok(key)
    }

    /// Marks the player owning a channel as disconnected
    ///
    /// The record and its score stay; only the connectivity flag flips and
    /// the channel handle is dropped. Returns the affected key, or `None`
    /// if no player owned the channel.
    pub fn mark_disconnected(&mut self, channel: ChannelId) -> Option<PlayerKey> {
        let (key, player) = self
            .players
            .iter_mut()
            .find(|(_, p)| p.channel == Some(channel))?;
        player.connected = false;
        player.channel = None;
        debug!(key = key.as_str(), %channel, "player disconnected");
        Some(key.clone())
    }

    /// Looks up the player owning a channel
    pub fn key_for_channel(&self, channel: ChannelId) -> Option<&PlayerKey> {
        self.players
            .iter()
            .find(|(_, p)| p.channel == Some(channel))
            .map(|(key, _)| key)
    }

    /// Gets a player record by key
    pub fn get(&self, key: &PlayerKey) -> Option<&Player> {
        self.players.get(key)
    }

    /// Adds points to a player's cumulative score
    pub fn add_score(&mut self, key: &PlayerKey, points: u64) {
        if let Some(player) = self.players.get_mut(key) {
            player.score += points;
        }
    }

    /// Records that a player has answered the given question
    pub fn mark_answered(&mut self, key: &PlayerKey, question_index: usize) {
        if let Some(player) = self.players.get_mut(key) {
            player.answered.insert(question_index);
        }
    }

    /// Resets every score and answered-set for a "play again" round
    pub fn reset_for_replay(&mut self) {
        for player in self.players.values_mut() {
            player.score = 0;
            player.answered.clear();
        }
    }

    /// Number of player records (connected or not)
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether the registry holds no records
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Number of players with a live channel
    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.connected).count()
    }

    /// Iterates over every record as `(key, player)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&PlayerKey, &Player)> {
        self.players.iter()
    }

    /// An immutable roster snapshot, sorted by canonical key
    pub fn player_list(&self) -> Vec<PlayerInfo> {
        self.players
            .iter()
            .sorted_by_key(|(key, _)| (*key).clone())
            .map(|(_, player)| PlayerInfo {
                name: player.name.clone(),
                avatar: player.avatar.clone(),
                score: player.score,
                connected: player.connected,
            })
            .collect_vec()
    }

    /// The ranking over all records, best score first
    ///
    /// Ties are broken by name so the order is stable across broadcasts.
    pub fn standings(&self) -> Vec<Standing> {
        self.players
            .values()
            .sorted_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)))
            .enumerate()
            .map(|(position, player)| Standing {
                rank: position + 1,
                name: player.name.clone(),
                score: player.score,
            })
            .collect_vec()
    }

    /// Sends a message to every currently-connected player
    ///
    /// Players without an open channel are silently skipped.
    pub fn broadcast<T: Channel, F: Fn(ChannelId) -> Option<T>>(
        &self,
        message: &HostMessage,
        tunnel_finder: F,
    ) {
        for player in self.players.values().filter(|p| p.connected) {
            let Some(tunnel) = player.channel.and_then(&tunnel_finder) else {
                continue;
            };
            tunnel.send(message);
        }
    }

    /// Sends a message to one player, if they are connected
    ///
    /// Silently no-ops for unknown keys and players without an open channel.
    pub fn unicast<T: Channel, F: Fn(ChannelId) -> Option<T>>(
        &self,
        key: &PlayerKey,
        message: &HostMessage,
        tunnel_finder: F,
    ) {
        let Some(player) = self.players.get(key).filter(|p| p.connected) else {
            return;
        };
        let Some(tunnel) = player.channel.and_then(tunnel_finder) else {
            return;
        };
        tunnel.send(message);
    }
}
