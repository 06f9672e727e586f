//! Participant-side session state
//!
//! The client mirrors what the host announces and nothing more. Scores,
//! streaks, correctness and rank are copied from host messages; the only
//! local decision is the optimistic PLAYING → ANSWERED flip when an answer
//! is submitted.

use log::{debug, info, warn};
use shared::chat::{is_valid_emoji, new_message_id, sanitize_text, timestamp_millis};
use shared::{
    clamp_avatar, clamp_name, ChatLog, ChatMessage, Language, NetworkMessage, PeerId, Question,
    ReactionBoard, SessionError,
};
use std::time::{Duration, Instant};

/// How long to wait for WELCOME after sending JOIN
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Answer index meaning "no answer"
pub const SKIP_ANSWER: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Joining,
    Waiting,
    Playing,
    Answered,
    Feedback,
    GameOver,
}

/// Result of the last round, exactly as the host reported it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundResult {
    pub correct_index: u8,
    pub points: u64,
    pub was_correct: bool,
}

#[derive(Debug, Clone)]
pub struct ClientSession {
    state: ClientState,
    name: String,
    avatar: String,
    language: Language,

    player_id: Option<PeerId>,
    topic: Option<String>,
    cover_ref: Option<String>,
    game_started: bool,

    question: Option<Question>,
    round_index: u32,
    total_rounds: u32,
    time_left: u32,
    selected: Option<i32>,

    last_result: Option<RoundResult>,
    score: u64,
    streak: u32,
    rank: Option<u32>,
    showing_leaderboard: bool,

    chat: ChatLog,
    reactions: ReactionBoard,
    join_sent_at: Option<Instant>,
    notice: Option<String>,
    round_started: bool,
}

impl ClientSession {
    pub fn new(name: &str, avatar: &str, language: Language) -> Self {
        Self {
            state: ClientState::Connecting,
            name: clamp_name(name),
            avatar: clamp_avatar(avatar),
            language,
            player_id: None,
            topic: None,
            cover_ref: None,
            game_started: false,
            question: None,
            round_index: 0,
            total_rounds: 0,
            time_left: 0,
            selected: None,
            last_result: None,
            score: 0,
            streak: 0,
            rank: None,
            showing_leaderboard: false,
            chat: ChatLog::default(),
            reactions: ReactionBoard::default(),
            join_sent_at: None,
            notice: None,
            round_started: false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn avatar(&self) -> &str {
        &self.avatar
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn cover_ref(&self) -> Option<&str> {
        self.cover_ref.as_deref()
    }

    pub fn game_started(&self) -> bool {
        self.game_started
    }

    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    /// (1-based round, total rounds)
    pub fn round(&self) -> (u32, u32) {
        (self.round_index, self.total_rounds)
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn selected(&self) -> Option<i32> {
        self.selected
    }

    pub fn last_result(&self) -> Option<RoundResult> {
        self.last_result
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn rank(&self) -> Option<u32> {
        self.rank
    }

    pub fn showing_leaderboard(&self) -> bool {
        self.showing_leaderboard
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn reactions(&self) -> &ReactionBoard {
        &self.reactions
    }

    /// One-shot status line for the view, e.g. an error after a failed connect
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Identity changes are allowed until the host has welcomed us. While
    /// JOINING the next JOIN sent carries the new identity.
    pub fn set_identity(&mut self, name: &str, avatar: &str) -> bool {
        if !matches!(self.state, ClientState::Connecting | ClientState::Joining) {
            return false;
        }
        let name = clamp_name(name);
        if !name.is_empty() {
            self.name = name;
        }
        self.avatar = clamp_avatar(avatar);
        true
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    /// The transport is open: CONNECTING → JOINING. Returns the JOIN to send.
    pub fn connected(&mut self, now: Instant) -> NetworkMessage {
        self.state = ClientState::Joining;
        self.request_join(now)
    }

    /// Builds a JOIN and restarts the WELCOME timeout. Sending it again is
    /// harmless: the host answers a repeated JOIN with another WELCOME.
    pub fn request_join(&mut self, now: Instant) -> NetworkMessage {
        self.join_sent_at = Some(now);
        NetworkMessage::Join {
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }

    /// True once when no WELCOME arrived within [`JOIN_TIMEOUT`]; the
    /// session stays in JOINING so the user can retry.
    pub fn join_timed_out(&mut self, now: Instant) -> bool {
        if self.state != ClientState::Joining {
            return false;
        }
        match self.join_sent_at {
            Some(sent) if now.duration_since(sent) >= JOIN_TIMEOUT => {
                self.join_sent_at = None;
                let error = SessionError::ConnectionTimeout {
                    room: String::new(),
                };
                self.notice = Some(error.user_message(self.language).to_string());
                warn!("No WELCOME within {:?}", JOIN_TIMEOUT);
                true
            }
            _ => false,
        }
    }

    /// Connection failed or dropped: back to room entry. Nothing from the
    /// previous room survives.
    pub fn connection_lost(&mut self, error: &SessionError) {
        info!("Leaving room: {}", error);
        let notice = error.user_message(self.language).to_string();
        self.leave();
        self.notice = Some(notice);
    }

    /// True once after each QUESTION_START, so the local countdown can be
    /// realigned with the host's round clock
    pub fn take_round_started(&mut self) -> bool {
        std::mem::take(&mut self.round_started)
    }

    /// Back to room entry, keeping name, avatar and language
    pub fn leave(&mut self) {
        *self = Self::new(&self.name, &self.avatar, self.language);
    }

    /// Applies one host message
    pub fn apply(&mut self, message: NetworkMessage, now: Instant) {
        match message {
            NetworkMessage::Welcome {
                player_id,
                topic,
                cover_ref,
                language,
            } => {
                if self.state == ClientState::Connecting {
                    debug!("WELCOME before JOIN, ignoring");
                    return;
                }
                info!("Joined as {} for '{}'", player_id, topic);
                self.player_id = Some(player_id);
                self.topic = Some(topic);
                self.cover_ref = cover_ref;
                self.language = language;
                self.join_sent_at = None;
                if self.state == ClientState::Joining {
                    self.state = ClientState::Waiting;
                }
            }
            NetworkMessage::StartGame => {
                if self.joined() {
                    self.game_started = true;
                    self.state = ClientState::Waiting;
                }
            }
            NetworkMessage::QuestionStart {
                question,
                round_index,
                total_rounds,
            } => {
                if !self.joined() {
                    return;
                }
                self.time_left = question.time_limit_seconds;
                self.question = Some(question);
                self.round_index = round_index;
                self.total_rounds = total_rounds;
                self.selected = None;
                self.last_result = None;
                self.showing_leaderboard = false;
                self.game_started = true;
                self.round_started = true;
                self.state = ClientState::Playing;
            }
            NetworkMessage::RoundEnd {
                correct_index,
                score,
                streak,
                points_this_round,
                was_correct,
            } => {
                if !self.joined() {
                    return;
                }
                self.score = score;
                self.streak = streak;
                self.last_result = Some(RoundResult {
                    correct_index,
                    points: points_this_round,
                    was_correct,
                });
                self.time_left = 0;
                self.state = ClientState::Feedback;
            }
            NetworkMessage::ShowLeaderboard => {
                if self.joined() {
                    self.showing_leaderboard = true;
                    self.state = ClientState::Waiting;
                }
            }
            NetworkMessage::GameOver { rank } => {
                if self.joined() {
                    self.rank = Some(rank);
                    self.time_left = 0;
                    self.state = ClientState::GameOver;
                }
            }
            NetworkMessage::ChatMessage { message } => self.chat.push(message),
            NetworkMessage::DeleteChatMessage { id } => {
                self.chat.remove(&id);
            }
            NetworkMessage::Reaction { emoji, sender_id } => {
                if Some(sender_id.as_str()) != self.player_id.as_deref() {
                    self.reactions.show(&emoji, &sender_id, now);
                }
            }
            other @ (NetworkMessage::Join { .. } | NetworkMessage::Answer { .. }) => {
                warn!("Host sent client-only message {}", other.kind());
            }
        }
    }

    fn joined(&self) -> bool {
        !matches!(self.state, ClientState::Connecting | ClientState::Joining)
    }

    /// PLAYING → ANSWERED, unconditionally and before the host confirms.
    /// Returns the ANSWER to send, or None outside PLAYING.
    pub fn submit_answer(&mut self, answer_index: i32) -> Option<NetworkMessage> {
        if self.state != ClientState::Playing {
            return None;
        }
        let option_count = self.question.as_ref().map_or(0, |q| q.options.len()) as i32;
        let answer_index = if (0..option_count).contains(&answer_index) {
            answer_index
        } else {
            SKIP_ANSWER
        };

        self.selected = Some(answer_index);
        self.state = ClientState::Answered;
        Some(NetworkMessage::Answer { answer_index })
    }

    /// Builds a chat message; the host's echo is what lands in the log
    pub fn compose_chat(&self, text: &str) -> Option<NetworkMessage> {
        if !self.joined() {
            return None;
        }
        let text = sanitize_text(text)?;
        Some(NetworkMessage::ChatMessage {
            message: ChatMessage {
                id: new_message_id(),
                sender_id: self.player_id.clone().unwrap_or_default(),
                sender_name: self.name.clone(),
                sender_avatar: self.avatar.clone(),
                text,
                timestamp: timestamp_millis(),
                is_host: false,
            },
        })
    }

    /// Shows the reaction locally and returns the message for the host,
    /// which relays it to everyone else
    pub fn send_reaction(&mut self, emoji: &str, now: Instant) -> Option<NetworkMessage> {
        if !self.joined() || !is_valid_emoji(emoji) {
            return None;
        }
        let sender_id = self.player_id.clone().unwrap_or_default();
        self.reactions.show(emoji, &sender_id, now);
        Some(NetworkMessage::Reaction {
            emoji: emoji.to_string(),
            sender_id,
        })
    }

    /// One second passed. Counts the visible clock down and, when it runs
    /// out before an answer was given, returns the timeout ANSWER.
    pub fn tick(&mut self, now: Instant) -> Option<NetworkMessage> {
        self.reactions.expire(now);

        if !matches!(self.state, ClientState::Playing | ClientState::Answered) {
            return None;
        }
        self.time_left = self.time_left.saturating_sub(1);

        if self.time_left == 0 && self.state == ClientState::Playing {
            debug!("Local clock ran out, sending timeout answer");
            return self.submit_answer(SKIP_ANSWER);
        }
        None
    }
}
