//! # Quiz Host Library
//!
//! This library provides the authoritative host for a live quiz session. The
//! host owns the only copy of the session state: players, scores, streaks,
//! the current question and the round clock. Participants send intents and
//! render whatever the host tells them.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Session
//! Every decision happens here: who joined, which answer counted, how many
//! points it earned and who ranks where. Clients never compute scores.
//!
//! ### Room Management
//! A fresh six-digit room code is registered in a rendezvous directory once
//! the quiz content is ready, retrying on collision up to three times. The
//! code is unregistered when the session is discarded.
//!
//! ### Relay
//! Chat messages and reactions are stamped with the sender's identity and
//! relayed to every joined participant.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! One loop owns the [`session::HostMachine`], the
//! [`connection_manager::ConnectionManager`] and the [`relay::Relay`]. Reader
//! tasks, the accept task, content generation and the operator console all
//! feed it through one channel, so transitions never race each other.
//!
//! ### Effects, Not Sends
//! State transitions return [`session::Outbound`] effects instead of writing
//! to sockets. The loop hands them to per-connection writer queues, which
//! keeps every transition synchronous and testable without a network.
//!
//! ## Module Organization
//!
//! ### Connection Manager (`connection_manager`)
//! Open channels, capacity, outbound queues and broadcast fan-out.
//!
//! ### Session (`session`)
//! Host phase machine, players, round timer and ranking.
//!
//! ### Relay (`relay`)
//! Chat log, moderation deletes and reaction gating.
//!
//! ### Content (`content`)
//! Question providers: the built-in bank and JSON quiz files.
//!
//! ### Operator (`operator`)
//! Console command parsing and status rendering.
//!
//! ### Network (`network`)
//! TCP transport, rendezvous registration and the main loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use host::content::QuestionBank;
//! use host::network::{HostConfig, Server};
//! use host::operator::OperatorCommand;
//! use shared::DirRendezvous;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rendezvous = Arc::new(DirRendezvous::new("/tmp/quiz-rooms")?);
//!     let mut server = Server::bind(HostConfig::default(), rendezvous, QuestionBank::new()).await?;
//!
//!     // Generate a quiz and open the lobby as soon as the loop runs
//!     server.operator().send(OperatorCommand::Generate(Some("Space".into())))?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod connection_manager;
pub mod content;
pub mod network;
pub mod operator;
pub mod relay;
pub mod session;
