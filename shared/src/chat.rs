//! Chat history and ephemeral reactions
//!
//! Both sides of a connection keep their own bounded [`ChatLog`]; moderation
//! removes entries by id and a removal of an unknown id is a no-op.
//! Reactions are never logged, only displayed on a [`ReactionBoard`] until
//! they expire.

use crate::protocol::{ChatMessage, PeerId};
use rand::Rng;
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Messages retained per log
pub const CHAT_LOG_CAPACITY: usize = 50;

/// Longest chat text accepted, in characters
pub const MAX_CHAT_TEXT_LEN: usize = 100;

/// How long a reaction stays on screen
pub const REACTION_DISPLAY: Duration = Duration::from_secs(5);

/// Reactions offered to participants
pub const REACTION_EMOJIS: [&str; 6] = ["❤️", "😂", "😮", "🎉", "🔥", "💩"];

const MAX_EMOJI_LEN: usize = 16;

/// Current wall clock time in milliseconds
pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Fresh message id: send time plus a random suffix
pub fn new_message_id() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-{:08x}", timestamp_millis(), suffix)
}

/// Trims and caps chat text. Returns `None` when nothing is left to send.
pub fn sanitize_text(text: &str) -> Option<String> {
    let text: String = text.trim().chars().take(MAX_CHAT_TEXT_LEN).collect();
    let text = text.trim_end().to_string();
    (!text.is_empty()).then_some(text)
}

/// Reactions must be short, non-empty glyph sequences
pub fn is_valid_emoji(emoji: &str) -> bool {
    !emoji.trim().is_empty() && emoji.len() <= MAX_EMOJI_LEN
}

#[derive(Debug, Clone)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a message, evicting the oldest once the log is full
    pub fn push(&mut self, message: ChatMessage) {
        if self.capacity == 0 {
            return;
        }
        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Removes a message by id. Unknown ids are ignored.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new(CHAT_LOG_CAPACITY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveReaction {
    pub emoji: String,
    pub sender_id: PeerId,
    pub expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct ReactionBoard {
    active: Vec<ActiveReaction>,
    display: Duration,
}

impl ReactionBoard {
    pub fn new(display: Duration) -> Self {
        Self {
            active: Vec::new(),
            display,
        }
    }

    pub fn show(&mut self, emoji: &str, sender_id: &str, now: Instant) {
        self.active.push(ActiveReaction {
            emoji: emoji.to_string(),
            sender_id: sender_id.to_string(),
            expires_at: now + self.display,
        });
    }

    /// Drops reactions whose display time has passed, returning how many
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.active.len();
        self.active.retain(|r| r.expires_at > now);
        before - self.active.len()
    }

    pub fn active(&self) -> &[ActiveReaction] {
        &self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for ReactionBoard {
    fn default() -> Self {
        Self::new(REACTION_DISPLAY)
    }
}
