//! # PeerQuiz Session Library
//!
//! This library provides the core session logic for a serverless,
//! peer-to-peer live quiz. One device hosts a session under a short
//! join code and holds all authoritative state: the roster, the game
//! phase, the collected answers and the scores. Player devices connect
//! directly to the host over a data-channel transport, render what the
//! host tells them, and reconnect automatically when their channel drops.
//!
//! The library is transport-agnostic: the embedding application supplies
//! the peer connection and timers, and the session types here supply the
//! protocol, the state machines and the policies.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]

pub mod client;
pub mod constants;
pub mod host;
pub mod protocol;
pub mod quiz;
pub mod registry;
pub mod scoring;
pub mod session_code;
pub mod transport;

pub use client::{ConnectionState, PlayerSession, ReconnectConfig};
pub use host::HostSession;
pub use protocol::{ClientMessage, HostMessage, Phase};
pub use quiz::Quiz;
pub use session_code::SessionCode;
