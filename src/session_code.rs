//! Session code generation and parsing
//!
//! This module provides the short, human-typeable codes that identify a
//! live session. Codes are drawn from an alphabet with visually-confusable
//! glyphs removed so they survive being read off a screen or spoken aloud.

use std::fmt::Display;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::constants::session::{CODE_ALPHABET, CODE_LENGTH, IDENTITY_PREFIX};

/// A short code identifying a live host session
///
/// Codes are always `CODE_LENGTH` characters from `CODE_ALPHABET`. Parsing
/// is case-insensitive so players can type the code however they like.
#[derive(Debug, Clone, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay)]
pub struct SessionCode(String);

/// Errors that can occur when parsing a session code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseCodeError {
    /// The code does not have exactly `CODE_LENGTH` characters
    #[error("a session code must be exactly {CODE_LENGTH} characters")]
    WrongLength,
    /// The code contains a character outside the code alphabet
    #[error("invalid character in session code: {0}")]
    InvalidCharacter(char),
}

impl SessionCode {
    /// Generates a new random session code
    pub fn generate() -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| char::from(CODE_ALPHABET[fastrand::usize(..CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Returns the identity string published on the signaling layer
    ///
    /// The identity is the code prefixed with `"session-"`, e.g. a code of
    /// `K7QF` publishes as `session-K7QF`.
    pub fn identity(&self) -> String {
        format!("{IDENTITY_PREFIX}{}", self.0)
    }

    /// Returns the code as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionCode {
    type Err = ParseCodeError;

    /// Parses a session code, folding lowercase input to uppercase
    ///
    /// # Errors
    ///
    /// Returns [`ParseCodeError`] if the input has the wrong length or
    /// contains a character outside the code alphabet.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = s.trim().to_uppercase();
        if folded.chars().count() != CODE_LENGTH {
            return Err(ParseCodeError::WrongLength);
        }
        if let Some(bad) = folded.chars().find(|c| !CODE_ALPHABET.contains(&(*c as u8))) {
            return Err(ParseCodeError::InvalidCharacter(bad));
        }
        Ok(Self(folded))
    }
}
