//! # Quiz Session Shared Library
//!
//! Everything both ends of a quiz session must agree on lives here: the
//! wire protocol and its framing, the room identity scheme used to find a
//! host, the scoring rule, the chat and reaction containers, and the error
//! taxonomy.
//!
//! The host is authoritative. Clients only ever learn scores, correctness
//! and rankings from host messages, so the scoring module is used by the
//! host alone; it lives here because its rules are part of the protocol
//! contract and are exercised by the integration tests.

pub mod chat;
pub mod error;
pub mod protocol;
pub mod room;
pub mod scoring;

pub use chat::{ChatLog, ReactionBoard};
pub use error::{ProtocolError, SessionError};
pub use protocol::{
    ChatMessage, Decoded, Difficulty, Language, NetworkMessage, PeerId, Question,
};
pub use room::{create_room, DirRendezvous, MemoryRendezvous, Rendezvous, RoomCode};

/// Longest display name kept by the host, in characters
pub const MAX_NAME_LEN: usize = 15;

/// Longest avatar glyph sequence kept by the host, in characters
pub const MAX_AVATAR_LEN: usize = 8;

pub const DEFAULT_AVATAR: &str = "😎";

/// Avatars offered to participants
pub const AVATARS: [&str; 8] = ["😎", "🐶", "🦊", "🐼", "🐸", "🦄", "🐙", "🤖"];

/// Truncates a display name to [`MAX_NAME_LEN`] characters after trimming
pub fn clamp_name(name: &str) -> String {
    name.trim().chars().take(MAX_NAME_LEN).collect()
}

/// Falls back to [`DEFAULT_AVATAR`] for empty input and caps the length
pub fn clamp_avatar(avatar: &str) -> String {
    let avatar: String = avatar.trim().chars().take(MAX_AVATAR_LEN).collect();
    if avatar.is_empty() {
        DEFAULT_AVATAR.to_string()
    } else {
        avatar
    }
}
