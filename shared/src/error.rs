//! Error taxonomy shared by host and client
//!
//! Connection-class errors carry a short localized message for the
//! participant; none of them ever touches the host's Session. A second
//! answer in the same round and an unknown message kind are not errors at
//! all: they are expressed as ordinary outcomes and skipped.

use crate::protocol::Language;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    #[error("malformed message: {0}")]
    Malformed(#[from] bincode::Error),
    #[error("channel i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not register a room after {attempts} attempts")]
    RoomCreationFailure { attempts: u32 },
    #[error("timed out connecting to room {room}")]
    ConnectionTimeout { room: String },
    #[error("room {room} is not available")]
    PeerUnavailable { room: String },
    #[error("failed to send {kind} to {peer}")]
    SendFailure { peer: String, kind: &'static str },
    #[error("connection to the host was lost")]
    ConnectionLost,
    #[error("content generation failed: {0}")]
    ContentGeneration(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Short message shown to the participant
    pub fn user_message(&self, language: Language) -> &'static str {
        match (self, language) {
            (SessionError::RoomCreationFailure { .. }, Language::De) => {
                "Raum konnte nicht erstellt werden."
            }
            (SessionError::RoomCreationFailure { .. }, Language::En) => "Could not create a room.",
            (SessionError::ConnectionTimeout { .. }, Language::De) => "Zeitüberschreitung.",
            (SessionError::ConnectionTimeout { .. }, Language::En) => "Connection timed out.",
            (SessionError::PeerUnavailable { .. }, Language::De) => "Raum nicht gefunden.",
            (SessionError::PeerUnavailable { .. }, Language::En) => "Room not found.",
            (SessionError::SendFailure { .. }, Language::De) => "Fehler beim Senden.",
            (SessionError::SendFailure { .. }, Language::En) => "Sending failed.",
            (SessionError::ConnectionLost, Language::De) => "Verbindung verloren.",
            (SessionError::ConnectionLost, Language::En) => "Connection lost.",
            (SessionError::ContentGeneration(_), Language::De) => "Quiz konnte nicht erstellt werden.",
            (SessionError::ContentGeneration(_), Language::En) => "Could not create the quiz.",
            (_, Language::De) => "Netzwerkfehler.",
            (_, Language::En) => "Network error.",
        }
    }
}
