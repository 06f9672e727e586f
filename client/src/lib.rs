//! # Quiz Client Library
//!
//! This library provides the participant side of a live quiz session. A
//! participant enters a room code, joins the host's room, answers questions
//! against the clock and follows the chat and reactions of the room.
//!
//! ## Architecture Overview
//!
//! The client is a thin mirror of the host. It renders what the host
//! announces and sends intents back; it never scores an answer, never
//! decides correctness and never ranks anyone.
//!
//! ### Optimistic Answers
//! Submitting an answer flips the screen to ANSWERED immediately, before the
//! host confirms anything. The host may still ignore a late answer; the next
//! ROUND_END carries the real outcome.
//!
//! ### Local Clock
//! The countdown shown during a question is local. When it runs out before
//! the participant answered, the client sends a skip answer of `-1` so the
//! host can close the round early.
//!
//! ### Recovery
//! Every connection problem returns the participant to room entry with a
//! short localized message. Nothing from the previous room survives.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Participant state machine and the data copied from host messages.
//!
//! ### Input Module (`input`)
//! Console line parsing into participant commands.
//!
//! ### Network Module (`network`)
//! Channel to the host and the participant event loop.
//!
//! ### Profile Module (`profile`)
//! Name, avatar and language remembered between runs.
//!
//! ### View Module (`view`)
//! Localized text rendering of each screen.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//! use client::profile::ProfileStore;
//! use client::session::ClientSession;
//! use shared::{DirRendezvous, Language, RoomCode};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rendezvous = Arc::new(DirRendezvous::new("/tmp/quiz-rooms")?);
//!     let session = ClientSession::new("Ava", "🐶", Language::En);
//!     let profile = ProfileStore::new(ProfileStore::default_path());
//!     let mut client = Client::new(ClientConfig::default(), rendezvous, profile, session);
//!
//!     if let Some(room) = RoomCode::parse("123 456") {
//!         client.join(room).await;
//!     }
//!
//!     let (_commands, rx) = mpsc::unbounded_channel();
//!     client.run(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;
pub mod profile;
pub mod session;
pub mod view;
