//! Chat and reaction relay
//!
//! Chat and reactions never touch quiz state. The relay stamps what a
//! participant sent with the identity the host knows for that connection,
//! keeps the host's own chat log, and turns every accepted item into a
//! broadcast effect. Chat is echoed to everyone including the author so all
//! logs agree on order; reactions skip the author, who already shows its
//! own reaction locally.

use crate::connection_manager::ConnectionId;
use crate::session::Outbound;
use log::{debug, info};
use shared::chat::{is_valid_emoji, new_message_id, sanitize_text, timestamp_millis};
use shared::{clamp_avatar, clamp_name, ChatLog, ChatMessage, NetworkMessage, ReactionBoard};
use std::time::Instant;

pub const HOST_SENDER_ID: &str = "host";

/// Relay state shown on the operator status screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatus {
    pub reactions_allowed: bool,
    pub chat_messages: usize,
    /// Emojis still on display, oldest first
    pub active_reactions: Vec<String>,
}

pub struct Relay {
    log: ChatLog,
    reactions: ReactionBoard,
    reactions_allowed: bool,
    host_name: String,
    host_avatar: String,
}

impl Relay {
    pub fn new(reactions_allowed: bool, host_name: &str, host_avatar: &str) -> Self {
        Self {
            log: ChatLog::default(),
            reactions: ReactionBoard::default(),
            reactions_allowed,
            host_name: clamp_name(host_name),
            host_avatar: clamp_avatar(host_avatar),
        }
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn reactions(&self) -> &ReactionBoard {
        &self.reactions
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            reactions_allowed: self.reactions_allowed,
            chat_messages: self.log.len(),
            active_reactions: self
                .reactions
                .active()
                .iter()
                .map(|r| r.emoji.clone())
                .collect(),
        }
    }

    pub fn reactions_allowed(&self) -> bool {
        self.reactions_allowed
    }

    pub fn set_reactions_allowed(&mut self, allowed: bool) {
        info!("Reactions {}", if allowed { "enabled" } else { "disabled" });
        self.reactions_allowed = allowed;
    }

    /// Accepts a participant's chat message.
    ///
    /// `sender` is the (name, avatar) of the player bound to the connection;
    /// the claimed identity in the message is only used when the host has
    /// none. Empty text is dropped.
    pub fn inbound_chat(
        &mut self,
        peer_id: &str,
        sender: Option<(&str, &str)>,
        message: ChatMessage,
    ) -> Option<Outbound> {
        let Some(text) = sanitize_text(&message.text) else {
            debug!("Dropping empty chat message from {}", peer_id);
            return None;
        };

        let (sender_name, sender_avatar) = match sender {
            Some((name, avatar)) => (name.to_string(), avatar.to_string()),
            None => (
                clamp_name(&message.sender_name),
                clamp_avatar(&message.sender_avatar),
            ),
        };

        // Ids must stay unique in the log or a delete would hit both entries
        let id = if message.id.trim().is_empty() || self.log.contains(&message.id) {
            new_message_id()
        } else {
            message.id
        };

        let message = ChatMessage {
            id,
            sender_id: peer_id.to_string(),
            sender_name,
            sender_avatar,
            text,
            timestamp: if message.timestamp == 0 {
                timestamp_millis()
            } else {
                message.timestamp
            },
            is_host: false,
        };
        Some(self.publish(message))
    }

    /// Posts a message as the host
    pub fn host_chat(&mut self, text: &str) -> Option<Outbound> {
        let text = sanitize_text(text)?;
        let message = ChatMessage {
            id: new_message_id(),
            sender_id: HOST_SENDER_ID.to_string(),
            sender_name: self.host_name.clone(),
            sender_avatar: self.host_avatar.clone(),
            text,
            timestamp: timestamp_millis(),
            is_host: true,
        };
        Some(self.publish(message))
    }

    fn publish(&mut self, message: ChatMessage) -> Outbound {
        debug!("Chat from {}: {}", message.sender_name, message.text);
        self.log.push(message.clone());
        Outbound::Broadcast {
            message: NetworkMessage::ChatMessage { message },
            exclude: None,
        }
    }

    /// Moderation delete. Always broadcast; clients ignore ids they lack.
    pub fn delete(&mut self, id: &str) -> Outbound {
        if self.log.remove(id) {
            info!("Deleted chat message {}", id);
        } else {
            debug!("Delete for unknown chat message {}", id);
        }
        Outbound::Broadcast {
            message: NetworkMessage::DeleteChatMessage { id: id.to_string() },
            exclude: None,
        }
    }

    /// Relays a reaction to everyone but its author, if reactions are on
    pub fn inbound_reaction(
        &mut self,
        conn: ConnectionId,
        peer_id: &str,
        emoji: &str,
        now: Instant,
    ) -> Option<Outbound> {
        if !self.reactions_allowed {
            debug!("Reactions disabled, dropping {} from {}", emoji, peer_id);
            return None;
        }
        if !is_valid_emoji(emoji) {
            return None;
        }

        self.reactions.show(emoji, peer_id, now);
        Some(Outbound::Broadcast {
            message: NetworkMessage::Reaction {
                emoji: emoji.to_string(),
                sender_id: peer_id.to_string(),
            },
            exclude: Some(conn),
        })
    }

    pub fn expire_reactions(&mut self, now: Instant) -> usize {
        self.reactions.expire(now)
    }

    /// Drops all chat history, used when the session is discarded
    pub fn clear(&mut self) {
        self.log = ChatLog::default();
        self.reactions = ReactionBoard::default();
    }
}
