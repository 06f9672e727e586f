//! Wire protocol between the quiz host and its clients
//!
//! Every message travels as one length-prefixed frame: a 4-byte big-endian
//! payload length followed by the bincode encoding of a [`NetworkMessage`].
//! Bincode writes the enum variant index as a leading little-endian `u32`,
//! which doubles as the message discriminant. Decoding peeks that tag first
//! so that a peer speaking a newer protocol revision never brings the
//! connection down: unknown kinds surface as [`Decoded::Unknown`] and are
//! skipped by the receiver.

use crate::error::ProtocolError;
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted in a single frame
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Identity of a participant, assigned by the host from the connection
pub type PeerId = String;

/// Session language negotiated by the host and announced in WELCOME
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum Language {
    #[default]
    De,
    En,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::De => write!(f, "DE"),
            Language::En => write!(f, "EN"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DE" => Ok(Language::De),
            "EN" => Ok(Language::En),
            other => Err(format!("unsupported language '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Extreme,
}

impl Difficulty {
    pub fn label(&self, language: Language) -> &'static str {
        match (self, language) {
            (Difficulty::Easy, Language::De) => "Einfach",
            (Difficulty::Medium, Language::De) => "Mittel",
            (Difficulty::Hard, Language::De) => "Schwer",
            (Difficulty::Extreme, Language::De) => "Extrem",
            (Difficulty::Easy, Language::En) => "Easy",
            (Difficulty::Medium, Language::En) => "Medium",
            (Difficulty::Hard, Language::En) => "Hard",
            (Difficulty::Extreme, Language::En) => "Extreme",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" | "einfach" => Ok(Difficulty::Easy),
            "medium" | "mittel" => Ok(Difficulty::Medium),
            "hard" | "schwer" => Ok(Difficulty::Hard),
            "extreme" | "extrem" => Ok(Difficulty::Extreme),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

/// One quiz round's content. Immutable once generated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub text: String,
    pub options: [String; 4],
    pub correct_index: u8,
    pub time_limit_seconds: u32,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl Question {
    /// A question can be played when its answer key points at one of the
    /// four options and the round has a non-zero duration.
    pub fn is_playable(&self) -> bool {
        (self.correct_index as usize) < self.options.len() && self.time_limit_seconds > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: PeerId,
    pub sender_name: String,
    pub sender_avatar: String,
    pub text: String,
    pub timestamp: u64,
    pub is_host: bool,
}

/// Closed set of messages exchanged over a host/client channel.
///
/// Variant order is the wire discriminant; append new kinds at the end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum NetworkMessage {
    // client -> host
    Join {
        name: String,
        avatar: String,
    },

    // host -> one client
    Welcome {
        player_id: PeerId,
        topic: String,
        cover_ref: Option<String>,
        language: Language,
    },

    // host -> all
    StartGame,
    QuestionStart {
        question: Question,
        round_index: u32,
        total_rounds: u32,
    },

    // client -> host, -1 means skip or timeout
    Answer {
        answer_index: i32,
    },

    // host -> one client
    RoundEnd {
        correct_index: u8,
        score: u64,
        streak: u32,
        points_this_round: u64,
        was_correct: bool,
    },

    ShowLeaderboard,

    GameOver {
        rank: u32,
    },

    // bidirectional
    ChatMessage {
        message: ChatMessage,
    },
    DeleteChatMessage {
        id: String,
    },
    Reaction {
        emoji: String,
        sender_id: PeerId,
    },
}

/// Number of message kinds this build understands
pub const KNOWN_MESSAGE_KINDS: u32 = 11;

impl NetworkMessage {
    /// Protocol name of the message kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            NetworkMessage::Join { .. } => "JOIN",
            NetworkMessage::Welcome { .. } => "WELCOME",
            NetworkMessage::StartGame => "START_GAME",
            NetworkMessage::QuestionStart { .. } => "QUESTION_START",
            NetworkMessage::Answer { .. } => "ANSWER",
            NetworkMessage::RoundEnd { .. } => "ROUND_END",
            NetworkMessage::ShowLeaderboard => "SHOW_LEADERBOARD",
            NetworkMessage::GameOver { .. } => "GAME_OVER",
            NetworkMessage::ChatMessage { .. } => "CHAT_MESSAGE",
            NetworkMessage::DeleteChatMessage { .. } => "DELETE_CHAT_MESSAGE",
            NetworkMessage::Reaction { .. } => "REACTION",
        }
    }

    /// True for kinds a client is allowed to send to the host
    pub fn is_client_originated(&self) -> bool {
        matches!(
            self,
            NetworkMessage::Join { .. }
                | NetworkMessage::Answer { .. }
                | NetworkMessage::ChatMessage { .. }
                | NetworkMessage::Reaction { .. }
        )
    }
}

/// Result of decoding one frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Message(NetworkMessage),
    /// A discriminant this build does not know; the payload is skipped
    Unknown { tag: u32 },
}

pub fn encode(message: &NetworkMessage) -> Result<Vec<u8>, ProtocolError> {
    Ok(serialize(message)?)
}

pub fn decode(payload: &[u8]) -> Result<Decoded, ProtocolError> {
    if payload.len() >= 4 {
        let tag = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if tag >= KNOWN_MESSAGE_KINDS {
            return Ok(Decoded::Unknown { tag });
        }
    }
    Ok(Decoded::Message(deserialize(payload)?))
}

/// Writes one message as a length-prefixed frame
pub async fn write_frame<W>(writer: &mut W, message: &NetworkMessage) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame payload. Returns `Ok(None)` when the peer closed the
/// stream cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}
