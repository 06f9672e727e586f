//! Authoritative quiz session state machine
//!
//! [`HostMachine`] owns the only mutable [`Session`] in the system. Every
//! mutation goes through one of its transition functions, and every
//! transition returns the protocol messages it wants delivered as a list of
//! [`Outbound`] effects. The machine never touches the network itself, which
//! keeps each transition synchronous and lets the event loop decide how the
//! effects are written to the wire.
//!
//! Phases: WELCOME → LOADING → LOBBY → PLAYING → FEEDBACK → (LEADERBOARD) →
//! PLAYING … → GAME_OVER. The round timer is owned by the machine and is
//! cancelled on every path that ends a round, so a late tick can never end
//! the same round twice.

use crate::connection_manager::ConnectionId;
use crate::content::ContentBundle;
use crate::relay::RelayStatus;
use log::{debug, info, warn};
use shared::scoring::score_answer;
use shared::{clamp_avatar, clamp_name, Difficulty, Language, NetworkMessage, PeerId, Question, RoomCode};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPhase {
    Welcome,
    Loading,
    Lobby,
    Playing,
    Feedback,
    Leaderboard,
    GameOver,
}

/// A message the machine wants delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    To {
        conn: ConnectionId,
        message: NetworkMessage,
    },
    Broadcast {
        message: NetworkMessage,
        exclude: Option<ConnectionId>,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action} while in {phase:?}")]
    InvalidPhase {
        action: &'static str,
        phase: HostPhase,
    },
    #[error("at least one player is required to start")]
    NoPlayers,
    #[error("generated content contains no playable question")]
    NoQuestions,
    #[error("content request {0} is no longer pending")]
    StaleContent(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Admitted,
    /// The connection already had a player; WELCOME is repeated, nothing else
    Rejoined,
    /// No lobby is open or the name was empty
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Accepted,
    /// The player already answered this round; first answer wins
    Duplicate,
    NotPlaying,
    UnknownPlayer,
}

/// A participant as the host tracks it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PeerId,
    pub conn: ConnectionId,
    pub name: String,
    pub avatar: String,
    pub score: u64,
    pub streak: u32,
    /// `None` until an answer is accepted this round
    pub last_answer_index: Option<i32>,
    /// Round time left when the answer was accepted
    pub last_answer_time_left: u32,
    pub last_answer_correct: Option<bool>,
    pub last_points: u64,
}

impl Player {
    pub fn new(id: PeerId, conn: ConnectionId, name: String, avatar: String) -> Self {
        Self {
            id,
            conn,
            name,
            avatar,
            score: 0,
            streak: 0,
            last_answer_index: None,
            last_answer_time_left: 0,
            last_answer_correct: None,
            last_points: 0,
        }
    }

    fn reset_round(&mut self) {
        self.last_answer_index = None;
        self.last_answer_time_left = 0;
        self.last_answer_correct = None;
        self.last_points = 0;
    }

    pub fn has_answered(&self) -> bool {
        self.last_answer_index.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub room: RoomCode,
    pub topic: String,
    pub cover_ref: Option<String>,
    pub difficulty: Difficulty,
    pub questions: Vec<Question>,
    pub current_index: usize,
    /// Join order; ranking ties keep this order
    pub players: Vec<Player>,
    pub language: Language,
}

impl Session {
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn player_by_conn(&self, conn: ConnectionId) -> Option<&Player> {
        self.players.iter().find(|p| p.conn == conn)
    }

    fn player_by_conn_mut(&mut self, conn: ConnectionId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.conn == conn)
    }

    /// Players by score descending; equal scores keep join order
    pub fn ranking(&self) -> Vec<&Player> {
        let mut ranked: Vec<&Player> = self.players.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    fn welcome_for(&self, player: &Player) -> NetworkMessage {
        NetworkMessage::Welcome {
            player_id: player.id.clone(),
            topic: self.topic.clone(),
            cover_ref: self.cover_ref.clone(),
            language: self.language,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    Idle,
    Running(u32),
    Expired,
}

/// One-second countdown for the active round
#[derive(Debug, Clone, Default)]
pub struct RoundTimer {
    remaining: Option<u32>,
}

impl RoundTimer {
    pub fn start(&mut self, seconds: u32) {
        self.remaining = Some(seconds);
    }

    pub fn cancel(&mut self) {
        self.remaining = None;
    }

    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    pub fn is_armed(&self) -> bool {
        self.remaining.is_some()
    }

    /// Advances one second. Expiry disarms the timer, so it fires once.
    pub fn tick(&mut self) -> TimerTick {
        match self.remaining {
            None => TimerTick::Idle,
            Some(left) if left <= 1 => {
                self.remaining = None;
                TimerTick::Expired
            }
            Some(left) => {
                self.remaining = Some(left - 1);
                TimerTick::Running(left - 1)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub rank: u32,
    pub player_id: PeerId,
    pub name: String,
    pub avatar: String,
    pub score: u64,
    pub streak: u32,
    pub answered: bool,
}

/// Read-only view of the host for the operator console and embedders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot {
    pub phase: HostPhase,
    pub room: Option<RoomCode>,
    pub topic: Option<String>,
    pub language: Language,
    /// (1-based round, total rounds)
    pub round: Option<(u32, u32)>,
    pub time_left: Option<u32>,
    pub answered: usize,
    pub standings: Vec<Standing>,
    pub relay: RelayStatus,
}

pub struct HostMachine {
    phase: HostPhase,
    session: Option<Session>,
    timer: RoundTimer,
    language: Language,
    auto_end_round: bool,
    pending_ticket: Option<u64>,
    next_ticket: u64,
    round_started: bool,
}

impl HostMachine {
    pub fn new(language: Language, auto_end_round: bool) -> Self {
        Self {
            phase: HostPhase::Welcome,
            session: None,
            timer: RoundTimer::default(),
            language,
            auto_end_round,
            pending_ticket: None,
            next_ticket: 1,
            round_started: false,
        }
    }

    pub fn phase(&self) -> HostPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn time_left(&self) -> Option<u32> {
        self.timer.remaining()
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError::InvalidPhase {
            action,
            phase: self.phase,
        }
    }

    /// WELCOME → LOADING. Returns the ticket the content completion must carry.
    pub fn begin_loading(&mut self) -> Result<u64, TransitionError> {
        if self.phase != HostPhase::Welcome {
            return Err(self.invalid("generate content"));
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending_ticket = Some(ticket);
        self.phase = HostPhase::Loading;
        info!("Generating content (request {})", ticket);
        Ok(ticket)
    }

    /// LOADING → WELCOME without waiting for the content provider
    pub fn abort_loading(&mut self) -> Result<(), TransitionError> {
        if self.phase != HostPhase::Loading {
            return Err(self.invalid("abort loading"));
        }
        self.pending_ticket = None;
        self.phase = HostPhase::Welcome;
        info!("Content generation aborted");
        Ok(())
    }

    pub fn is_pending(&self, ticket: u64) -> bool {
        self.phase == HostPhase::Loading && self.pending_ticket == Some(ticket)
    }

    /// A failed generation sends the host back to WELCOME so it can retry.
    /// Returns false when the ticket was stale and nothing changed.
    pub fn content_failed(&mut self, ticket: u64) -> bool {
        if !self.is_pending(ticket) {
            debug!("Ignoring failure of stale content request {}", ticket);
            return false;
        }
        self.pending_ticket = None;
        self.phase = HostPhase::Welcome;
        true
    }

    /// LOADING → LOBBY with freshly generated content and a registered room
    pub fn open_lobby(
        &mut self,
        ticket: u64,
        room: RoomCode,
        bundle: ContentBundle,
    ) -> Result<(), TransitionError> {
        if !self.is_pending(ticket) {
            return Err(TransitionError::StaleContent(ticket));
        }

        let questions: Vec<Question> = bundle
            .questions
            .into_iter()
            .filter(Question::is_playable)
            .collect();
        if questions.is_empty() {
            self.content_failed(ticket);
            return Err(TransitionError::NoQuestions);
        }

        info!(
            "Lobby open in room {}: '{}' with {} questions",
            room,
            bundle.topic,
            questions.len()
        );

        self.pending_ticket = None;
        self.session = Some(Session {
            room,
            topic: bundle.topic,
            cover_ref: bundle.cover_ref,
            difficulty: bundle.difficulty,
            questions,
            current_index: 0,
            players: Vec::new(),
            language: self.language,
        });
        self.phase = HostPhase::Lobby;
        Ok(())
    }

    /// Handles JOIN. Idempotent per connection: a repeated JOIN only
    /// repeats the WELCOME.
    pub fn join(
        &mut self,
        conn: ConnectionId,
        peer_id: &str,
        name: &str,
        avatar: &str,
    ) -> (JoinOutcome, Vec<Outbound>) {
        let Some(session) = self.session.as_mut() else {
            debug!("JOIN from connection {} before a lobby is open", conn);
            return (JoinOutcome::Ignored, Vec::new());
        };

        if let Some(existing) = session.player_by_conn(conn) {
            let message = session.welcome_for(existing);
            return (JoinOutcome::Rejoined, vec![Outbound::To { conn, message }]);
        }

        let name = clamp_name(name);
        if name.is_empty() {
            warn!("Rejected JOIN with empty name from connection {}", conn);
            return (JoinOutcome::Ignored, Vec::new());
        }

        let player = Player::new(peer_id.to_string(), conn, name, clamp_avatar(avatar));
        info!(
            "Player {} '{}' {} joined room {}",
            player.id, player.name, player.avatar, session.room
        );

        let message = session.welcome_for(&player);
        session.players.push(player);
        (JoinOutcome::Admitted, vec![Outbound::To { conn, message }])
    }

    /// Removes the player bound to a closed or kicked connection
    pub fn leave(&mut self, conn: ConnectionId) -> (Option<Player>, Vec<Outbound>) {
        let Some(session) = self.session.as_mut() else {
            return (None, Vec::new());
        };
        let Some(pos) = session.players.iter().position(|p| p.conn == conn) else {
            return (None, Vec::new());
        };

        let player = session.players.remove(pos);
        info!("Player {} '{}' left", player.id, player.name);

        let outbound = if self.phase == HostPhase::Playing && self.everyone_answered() {
            self.finish_round()
        } else {
            Vec::new()
        };
        (Some(player), outbound)
    }

    /// Records an ANSWER. Only the first answer per player and round counts.
    pub fn answer(&mut self, conn: ConnectionId, answer_index: i32) -> (AnswerOutcome, Vec<Outbound>) {
        if self.phase != HostPhase::Playing {
            return (AnswerOutcome::NotPlaying, Vec::new());
        }

        let time_left = self.timer.remaining().unwrap_or(0);
        let Some(player) = self
            .session
            .as_mut()
            .and_then(|s| s.player_by_conn_mut(conn))
        else {
            return (AnswerOutcome::UnknownPlayer, Vec::new());
        };

        if player.has_answered() {
            debug!("Discarding duplicate answer from {}", player.id);
            return (AnswerOutcome::Duplicate, Vec::new());
        }

        let answer_index = if (0..4).contains(&answer_index) {
            answer_index
        } else {
            -1
        };
        player.last_answer_index = Some(answer_index);
        player.last_answer_time_left = time_left;
        debug!(
            "Player {} answered {} with {}s left",
            player.id, answer_index, time_left
        );

        let outbound = if self.everyone_answered() {
            self.finish_round()
        } else {
            Vec::new()
        };
        (AnswerOutcome::Accepted, outbound)
    }

    fn everyone_answered(&self) -> bool {
        self.auto_end_round
            && self
                .session
                .as_ref()
                .is_some_and(|s| !s.players.is_empty() && s.players.iter().all(Player::has_answered))
    }

    /// LOBBY → PLAYING
    pub fn start(&mut self) -> Result<Vec<Outbound>, TransitionError> {
        if self.phase != HostPhase::Lobby {
            return Err(self.invalid("start the game"));
        }
        let players = self.session.as_ref().map_or(0, |s| s.players.len());
        if players == 0 {
            return Err(TransitionError::NoPlayers);
        }

        info!("Starting game with {} players", players);
        let mut outbound = vec![Outbound::Broadcast {
            message: NetworkMessage::StartGame,
            exclude: None,
        }];
        outbound.extend(self.start_round());
        Ok(outbound)
    }

    fn start_round(&mut self) -> Vec<Outbound> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let Some(question) = session.current_question().cloned() else {
            return Vec::new();
        };

        for player in &mut session.players {
            player.reset_round();
        }

        let round_index = session.current_index as u32 + 1;
        let total_rounds = session.questions.len() as u32;
        info!(
            "Round {}/{} started ({}s)",
            round_index, total_rounds, question.time_limit_seconds
        );

        self.timer.start(question.time_limit_seconds);
        self.round_started = true;
        self.phase = HostPhase::Playing;

        vec![Outbound::Broadcast {
            message: NetworkMessage::QuestionStart {
                question,
                round_index,
                total_rounds,
            },
            exclude: None,
        }]
    }

    /// True once after each round start; lets the event loop realign its
    /// one-second tick with the fresh countdown
    pub fn take_round_started(&mut self) -> bool {
        std::mem::take(&mut self.round_started)
    }

    /// One second of round time has passed
    pub fn tick(&mut self) -> Vec<Outbound> {
        if self.phase != HostPhase::Playing {
            return Vec::new();
        }
        match self.timer.tick() {
            TimerTick::Expired => {
                info!("Round time is up");
                self.finish_round()
            }
            TimerTick::Running(_) | TimerTick::Idle => Vec::new(),
        }
    }

    /// Operator skip: ends the active round right away
    pub fn skip(&mut self) -> Result<Vec<Outbound>, TransitionError> {
        if self.phase != HostPhase::Playing {
            return Err(self.invalid("skip the round"));
        }
        info!("Round skipped by host");
        Ok(self.finish_round())
    }

    /// PLAYING → FEEDBACK: scores every player and sends each its own result
    fn finish_round(&mut self) -> Vec<Outbound> {
        self.timer.cancel();
        self.phase = HostPhase::Feedback;

        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let Some(question) = session.questions.get(session.current_index) else {
            return Vec::new();
        };
        let correct_index = question.correct_index;
        let total_time = question.time_limit_seconds;

        let mut outbound = Vec::with_capacity(session.players.len());
        for player in &mut session.players {
            let outcome = score_answer(
                player.last_answer_index,
                correct_index,
                player.last_answer_time_left,
                total_time,
                player.streak,
            );

            player.score += outcome.points;
            player.streak = outcome.streak;
            player.last_answer_correct = Some(outcome.correct);
            player.last_points = outcome.points;

            outbound.push(Outbound::To {
                conn: player.conn,
                message: NetworkMessage::RoundEnd {
                    correct_index,
                    score: player.score,
                    streak: player.streak,
                    points_this_round: outcome.points,
                    was_correct: outcome.correct,
                },
            });
        }

        info!(
            "Round {} ended: {}/{} correct",
            session.current_index + 1,
            session
                .players
                .iter()
                .filter(|p| p.last_answer_correct == Some(true))
                .count(),
            session.players.len()
        );
        outbound
    }

    /// FEEDBACK → LEADERBOARD
    pub fn show_leaderboard(&mut self) -> Result<Vec<Outbound>, TransitionError> {
        if self.phase != HostPhase::Feedback {
            return Err(self.invalid("show the leaderboard"));
        }
        self.phase = HostPhase::Leaderboard;
        Ok(vec![Outbound::Broadcast {
            message: NetworkMessage::ShowLeaderboard,
            exclude: None,
        }])
    }

    /// FEEDBACK or LEADERBOARD → next round, or GAME_OVER after the last one
    pub fn next(&mut self) -> Result<Vec<Outbound>, TransitionError> {
        if !matches!(self.phase, HostPhase::Feedback | HostPhase::Leaderboard) {
            return Err(self.invalid("advance"));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(self.invalid("advance"));
        };

        if session.current_index + 1 < session.questions.len() {
            session.current_index += 1;
            return Ok(self.start_round());
        }

        self.phase = HostPhase::GameOver;
        let outbound: Vec<Outbound> = session
            .ranking()
            .into_iter()
            .enumerate()
            .map(|(i, player)| Outbound::To {
                conn: player.conn,
                message: NetworkMessage::GameOver { rank: i as u32 + 1 },
            })
            .collect();
        info!("Game over, {} players ranked", outbound.len());
        Ok(outbound)
    }

    /// Any phase → WELCOME. Drops the Session and returns its room so the
    /// caller can unregister it.
    pub fn restart(&mut self) -> Option<RoomCode> {
        self.timer.cancel();
        self.pending_ticket = None;
        self.phase = HostPhase::Welcome;
        self.session.take().map(|session| {
            info!("Session in room {} closed", session.room);
            session.room
        })
    }

    /// Resolves a player by id or (case-insensitive) name
    pub fn find_player(&self, query: &str) -> Option<ConnectionId> {
        let session = self.session.as_ref()?;
        session
            .players
            .iter()
            .find(|p| p.id == query)
            .or_else(|| {
                session
                    .players
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(query))
            })
            .map(|p| p.conn)
    }

    /// Read-only view of the machine; the relay state is owned elsewhere
    /// and passed in
    pub fn snapshot(&self, relay: RelayStatus) -> HostSnapshot {
        let session = self.session.as_ref();

        let round = session.and_then(|s| {
            (!matches!(self.phase, HostPhase::Lobby))
                .then_some((s.current_index as u32 + 1, s.questions.len() as u32))
        });

        let standings = session
            .map(|s| {
                s.ranking()
                    .into_iter()
                    .enumerate()
                    .map(|(i, p)| Standing {
                        rank: i as u32 + 1,
                        player_id: p.id.clone(),
                        name: p.name.clone(),
                        avatar: p.avatar.clone(),
                        score: p.score,
                        streak: p.streak,
                        answered: p.has_answered(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        HostSnapshot {
            phase: self.phase,
            room: session.map(|s| s.room.clone()),
            topic: session.map(|s| s.topic.clone()),
            language: self.language,
            round,
            time_left: self.timer.remaining(),
            answered: session.map_or(0, |s| s.players.iter().filter(|p| p.has_answered()).count()),
            standings,
            relay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct_index: u8, time_limit_seconds: u32) -> Question {
        Question {
            text: "Which option is right?".to_string(),
            options: ["A".into(), "B".into(), "C".into(), "D".into()],
            correct_index,
            time_limit_seconds,
            explanation: None,
            image_ref: None,
        }
    }

    fn bundle(questions: Vec<Question>) -> ContentBundle {
        ContentBundle {
            topic: "Animals".to_string(),
            cover_ref: Some("covers/animals.png".to_string()),
            difficulty: Difficulty::Easy,
            questions,
        }
    }

    fn room() -> RoomCode {
        RoomCode::parse("123456").unwrap()
    }

    fn lobby_with(questions: Vec<Question>) -> HostMachine {
        let mut machine = HostMachine::new(Language::En, true);
        let ticket = machine.begin_loading().unwrap();
        machine.open_lobby(ticket, room(), bundle(questions)).unwrap();
        machine
    }

    fn messages_to(outbound: &[Outbound], target: ConnectionId) -> Vec<&NetworkMessage> {
        outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::To { conn, message } if *conn == target => Some(message),
                _ => None,
            })
            .collect()
    }

    fn ticks(machine: &mut HostMachine, n: u32) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        for _ in 0..n {
            outbound.extend(machine.tick());
        }
        outbound
    }

    #[test]
    fn test_loading_flow() {
        let mut machine = HostMachine::new(Language::De, true);
        assert_eq!(machine.phase(), HostPhase::Welcome);

        let ticket = machine.begin_loading().unwrap();
        assert_eq!(machine.phase(), HostPhase::Loading);
        assert!(machine.begin_loading().is_err());

        machine.open_lobby(ticket, room(), bundle(vec![question(0, 20)])).unwrap();
        assert_eq!(machine.phase(), HostPhase::Lobby);
        assert_eq!(machine.session().unwrap().language, Language::De);
    }

    #[test]
    fn test_content_failure_returns_to_welcome() {
        let mut machine = HostMachine::new(Language::En, true);
        let ticket = machine.begin_loading().unwrap();

        assert!(machine.content_failed(ticket));
        assert_eq!(machine.phase(), HostPhase::Welcome);
        assert!(machine.begin_loading().is_ok());
    }

    #[test]
    fn test_late_completion_after_abort_is_ignored() {
        let mut machine = HostMachine::new(Language::En, true);
        let stale = machine.begin_loading().unwrap();
        machine.abort_loading().unwrap();

        assert_eq!(
            machine.open_lobby(stale, room(), bundle(vec![question(0, 20)])),
            Err(TransitionError::StaleContent(stale))
        );
        assert!(!machine.content_failed(stale));
        assert_eq!(machine.phase(), HostPhase::Welcome);

        let fresh = machine.begin_loading().unwrap();
        assert_ne!(fresh, stale);
        assert!(!machine.content_failed(stale));
        assert_eq!(machine.phase(), HostPhase::Loading);
    }

    #[test]
    fn test_unplayable_content_fails_the_attempt() {
        let mut machine = HostMachine::new(Language::En, true);
        let ticket = machine.begin_loading().unwrap();

        let result = machine.open_lobby(ticket, room(), bundle(vec![question(7, 20)]));
        assert_eq!(result, Err(TransitionError::NoQuestions));
        assert_eq!(machine.phase(), HostPhase::Welcome);
    }

    #[test]
    fn test_join_before_lobby_is_ignored() {
        let mut machine = HostMachine::new(Language::En, true);
        let (outcome, outbound) = machine.join(1, "p-1", "Ava", "🐶");
        assert_eq!(outcome, JoinOutcome::Ignored);
        assert!(outbound.is_empty());
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut machine = lobby_with(vec![question(0, 20)]);

        let (first, first_out) = machine.join(1, "p-1", "Ava", "🐶");
        let (second, second_out) = machine.join(1, "p-1", "Ava again", "🦊");

        assert_eq!(first, JoinOutcome::Admitted);
        assert_eq!(second, JoinOutcome::Rejoined);
        assert_eq!(machine.session().unwrap().players.len(), 1);
        assert_eq!(machine.session().unwrap().players[0].name, "Ava");

        let expected = NetworkMessage::Welcome {
            player_id: "p-1".to_string(),
            topic: "Animals".to_string(),
            cover_ref: Some("covers/animals.png".to_string()),
            language: Language::En,
        };
        assert_eq!(messages_to(&first_out, 1), vec![&expected]);
        assert_eq!(messages_to(&second_out, 1), vec![&expected]);
    }

    #[test]
    fn test_join_truncates_name_and_defaults_avatar() {
        let mut machine = lobby_with(vec![question(0, 20)]);
        machine.join(1, "p-1", "  Maximilian-Alexander  ", "");

        let player = &machine.session().unwrap().players[0];
        assert_eq!(player.name, "Maximilian-Alex");
        assert_eq!(player.avatar, shared::DEFAULT_AVATAR);
        assert_eq!(player.score, 0);
        assert_eq!(player.streak, 0);

        let (outcome, _) = machine.join(2, "p-2", "   ", "🐶");
        assert_eq!(outcome, JoinOutcome::Ignored);
    }

    #[test]
    fn test_start_requires_a_player() {
        let mut machine = lobby_with(vec![question(0, 20)]);
        assert_eq!(machine.start(), Err(TransitionError::NoPlayers));
        assert_eq!(machine.phase(), HostPhase::Lobby);
    }

    #[test]
    fn test_start_broadcasts_first_question() {
        let mut machine = lobby_with(vec![question(2, 30), question(1, 10)]);
        machine.join(1, "p-1", "Ava", "🐶");

        let outbound = machine.start().unwrap();
        assert_eq!(machine.phase(), HostPhase::Playing);
        assert_eq!(machine.time_left(), Some(30));
        assert!(machine.take_round_started());
        assert!(!machine.take_round_started());

        assert_eq!(
            outbound[0],
            Outbound::Broadcast {
                message: NetworkMessage::StartGame,
                exclude: None,
            }
        );
        match &outbound[1] {
            Outbound::Broadcast {
                message:
                    NetworkMessage::QuestionStart {
                        question,
                        round_index,
                        total_rounds,
                    },
                exclude: None,
            } => {
                assert_eq!(question.correct_index, 2);
                assert_eq!(*round_index, 1);
                assert_eq!(*total_rounds, 2);
            }
            other => panic!("unexpected outbound {:?}", other),
        }
    }

    #[test]
    fn test_single_player_scenario() {
        let mut machine = lobby_with(vec![question(2, 30)]);
        machine.join(1, "p-ava", "Ava", "🐶");
        machine.start().unwrap();

        assert!(ticks(&mut machine, 20).is_empty());
        assert_eq!(machine.time_left(), Some(10));

        let (outcome, outbound) = machine.answer(1, 2);
        assert_eq!(outcome, AnswerOutcome::Accepted);
        assert_eq!(machine.phase(), HostPhase::Feedback);
        assert_eq!(machine.time_left(), None);

        assert_eq!(
            messages_to(&outbound, 1),
            vec![&NetworkMessage::RoundEnd {
                correct_index: 2,
                score: 1167,
                streak: 1,
                points_this_round: 1167,
                was_correct: true,
            }]
        );

        let player = &machine.session().unwrap().players[0];
        assert_eq!(player.score, 1167);
        assert_eq!(player.streak, 1);
        assert_eq!(player.last_answer_correct, Some(true));
    }

    #[test]
    fn test_first_answer_wins() {
        let mut machine = lobby_with(vec![question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.join(2, "p-2", "Ben", "🦊");
        machine.start().unwrap();

        assert_eq!(machine.answer(1, 3).0, AnswerOutcome::Accepted);
        assert_eq!(machine.answer(1, 0).0, AnswerOutcome::Duplicate);
        assert_eq!(machine.answer(1, 0).0, AnswerOutcome::Duplicate);

        let player = &machine.session().unwrap().players[0];
        assert_eq!(player.last_answer_index, Some(3));
        assert_eq!(machine.phase(), HostPhase::Playing);
    }

    #[test]
    fn test_answer_outside_round_is_rejected() {
        let mut machine = lobby_with(vec![question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");

        assert_eq!(machine.answer(1, 0).0, AnswerOutcome::NotPlaying);
        machine.start().unwrap();
        assert_eq!(machine.answer(9, 0).0, AnswerOutcome::UnknownPlayer);
    }

    #[test]
    fn test_out_of_range_answer_counts_as_skip() {
        let mut machine = lobby_with(vec![question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.start().unwrap();

        machine.answer(1, 17);
        let player = &machine.session().unwrap().players[0];
        assert_eq!(player.last_answer_index, Some(-1));
        assert_eq!(player.last_answer_correct, Some(false));
    }

    #[test]
    fn test_timer_expiry_ends_round_once() {
        let mut machine = lobby_with(vec![question(1, 3)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.start().unwrap();

        assert!(ticks(&mut machine, 2).is_empty());
        let outbound = machine.tick();
        assert_eq!(machine.phase(), HostPhase::Feedback);
        assert_eq!(outbound.len(), 1);

        assert!(ticks(&mut machine, 5).is_empty());
        assert_eq!(machine.phase(), HostPhase::Feedback);
    }

    #[test]
    fn test_skip_cancels_timer() {
        let mut machine = lobby_with(vec![question(1, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.join(2, "p-2", "Ben", "🦊");
        machine.start().unwrap();
        machine.answer(1, 1);

        let outbound = machine.skip().unwrap();
        assert_eq!(outbound.len(), 2);
        assert_eq!(machine.time_left(), None);
        assert!(ticks(&mut machine, 40).is_empty());
        assert!(machine.skip().is_err());

        let session = machine.session().unwrap();
        assert_eq!(session.players[0].streak, 1);
        assert_eq!(session.players[1].last_points, 0);
    }

    #[test]
    fn test_timeout_resets_streak() {
        let mut machine = lobby_with(vec![question(0, 30), question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.start().unwrap();
        machine.answer(1, 0);
        assert_eq!(machine.session().unwrap().players[0].streak, 1);

        machine.next().unwrap();
        let outbound = ticks(&mut machine, 30);
        assert_eq!(
            messages_to(&outbound, 1),
            vec![&NetworkMessage::RoundEnd {
                correct_index: 0,
                score: 1500,
                streak: 0,
                points_this_round: 0,
                was_correct: false,
            }]
        );
    }

    #[test]
    fn test_scores_never_decrease() {
        let mut machine = lobby_with(vec![question(0, 10), question(1, 10), question(2, 10)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.start().unwrap();

        let mut last_score = 0;
        for answer in [0, 3, 2] {
            machine.answer(1, answer);
            let score = machine.session().unwrap().players[0].score;
            assert!(score >= last_score);
            last_score = score;
            let _ = machine.next();
        }
        assert_eq!(machine.phase(), HostPhase::GameOver);
    }

    #[test]
    fn test_streak_bonus_applies_to_following_round() {
        let mut machine = lobby_with(vec![question(0, 30), question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.start().unwrap();

        machine.answer(1, 0);
        assert_eq!(machine.session().unwrap().players[0].last_points, 1500);

        machine.next().unwrap();
        machine.answer(1, 0);
        assert_eq!(machine.session().unwrap().players[0].last_points, 1600);
        assert_eq!(machine.session().unwrap().players[0].score, 3100);
    }

    #[test]
    fn test_round_resets_transient_fields() {
        let mut machine = lobby_with(vec![question(0, 30), question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.start().unwrap();
        machine.answer(1, 0);

        machine.next().unwrap();
        let player = &machine.session().unwrap().players[0];
        assert_eq!(player.last_answer_index, None);
        assert_eq!(player.last_answer_correct, None);
        assert_eq!(player.last_points, 0);
        assert_eq!(player.score, 1500);
    }

    #[test]
    fn test_leaderboard_then_next() {
        let mut machine = lobby_with(vec![question(0, 30), question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.start().unwrap();
        assert!(machine.show_leaderboard().is_err());

        machine.skip().unwrap();
        let outbound = machine.show_leaderboard().unwrap();
        assert_eq!(machine.phase(), HostPhase::Leaderboard);
        assert_eq!(
            outbound,
            vec![Outbound::Broadcast {
                message: NetworkMessage::ShowLeaderboard,
                exclude: None,
            }]
        );

        machine.next().unwrap();
        assert_eq!(machine.phase(), HostPhase::Playing);
        assert_eq!(machine.snapshot(RelayStatus::default()).round, Some((2, 2)));
    }

    #[test]
    fn test_two_player_ranking() {
        let mut machine = lobby_with(vec![question(2, 30)]);
        machine.join(1, "p-slow", "Ben", "🦊");
        machine.join(2, "p-ava", "Ava", "🐶");
        machine.start().unwrap();

        machine.answer(2, 2);
        ticks(&mut machine, 30);
        assert_eq!(machine.phase(), HostPhase::Feedback);

        let outbound = machine.next().unwrap();
        assert_eq!(machine.phase(), HostPhase::GameOver);
        assert_eq!(
            messages_to(&outbound, 2),
            vec![&NetworkMessage::GameOver { rank: 1 }]
        );
        assert_eq!(
            messages_to(&outbound, 1),
            vec![&NetworkMessage::GameOver { rank: 2 }]
        );
    }

    #[test]
    fn test_ties_keep_join_order() {
        let mut machine = lobby_with(vec![question(0, 30)]);
        machine.join(5, "p-a", "First", "🐶");
        machine.join(3, "p-b", "Second", "🦊");
        machine.join(4, "p-c", "Third", "🐼");
        machine.start().unwrap();
        machine.skip().unwrap();

        let outbound = machine.next().unwrap();
        let ranks: Vec<(ConnectionId, u32)> = outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::To {
                    conn,
                    message: NetworkMessage::GameOver { rank },
                } => Some((*conn, *rank)),
                _ => None,
            })
            .collect();
        assert_eq!(ranks, vec![(5, 1), (3, 2), (4, 3)]);
    }

    #[test]
    fn test_leaving_player_is_removed() {
        let mut machine = lobby_with(vec![question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.join(2, "p-2", "Ben", "🦊");

        let (removed, _) = machine.leave(1);
        assert_eq!(removed.map(|p| p.name), Some("Ava".to_string()));
        assert_eq!(machine.session().unwrap().players.len(), 1);
        assert!(machine.leave(1).0.is_none());
    }

    #[test]
    fn test_leave_completes_round_when_rest_answered() {
        let mut machine = lobby_with(vec![question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.join(2, "p-2", "Ben", "🦊");
        machine.start().unwrap();

        machine.answer(1, 0);
        assert_eq!(machine.phase(), HostPhase::Playing);

        let (_, outbound) = machine.leave(2);
        assert_eq!(machine.phase(), HostPhase::Feedback);
        assert_eq!(messages_to(&outbound, 1).len(), 1);
    }

    #[test]
    fn test_auto_end_can_be_disabled() {
        let mut machine = HostMachine::new(Language::En, false);
        let ticket = machine.begin_loading().unwrap();
        machine.open_lobby(ticket, room(), bundle(vec![question(0, 30)])).unwrap();
        machine.join(1, "p-1", "Ava", "🐶");
        machine.start().unwrap();

        let (_, outbound) = machine.answer(1, 0);
        assert!(outbound.is_empty());
        assert_eq!(machine.phase(), HostPhase::Playing);
    }

    #[test]
    fn test_restart_discards_session() {
        let mut machine = lobby_with(vec![question(0, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.start().unwrap();

        assert_eq!(machine.restart(), Some(room()));
        assert_eq!(machine.phase(), HostPhase::Welcome);
        assert!(machine.session().is_none());
        assert!(machine.tick().is_empty());
        assert_eq!(machine.restart(), None);
    }

    #[test]
    fn test_find_player_by_id_or_name() {
        let mut machine = lobby_with(vec![question(0, 30)]);
        machine.join(7, "p-7", "Ava", "🐶");

        assert_eq!(machine.find_player("p-7"), Some(7));
        assert_eq!(machine.find_player("ava"), Some(7));
        assert_eq!(machine.find_player("nobody"), None);
    }

    #[test]
    fn test_snapshot_reports_progress() {
        let mut machine = lobby_with(vec![question(0, 30), question(1, 30)]);
        machine.join(1, "p-1", "Ava", "🐶");
        machine.join(2, "p-2", "Ben", "🦊");

        let lobby = machine.snapshot(RelayStatus::default());
        assert_eq!(lobby.phase, HostPhase::Lobby);
        assert_eq!(lobby.round, None);
        assert_eq!(lobby.room, Some(room()));

        machine.start().unwrap();
        machine.answer(2, 0);
        let relay = RelayStatus {
            reactions_allowed: true,
            chat_messages: 4,
            active_reactions: vec!["🎉".to_string()],
        };
        let playing = machine.snapshot(relay.clone());
        assert_eq!(playing.relay, relay);
        assert_eq!(playing.round, Some((1, 2)));
        assert_eq!(playing.time_left, Some(30));
        assert_eq!(playing.answered, 1);
        assert_eq!(playing.standings.len(), 2);
        assert!(playing.standings[1].answered);
    }

    #[test]
    fn test_round_timer() {
        let mut timer = RoundTimer::default();
        assert_eq!(timer.tick(), TimerTick::Idle);

        timer.start(2);
        assert!(timer.is_armed());
        assert_eq!(timer.tick(), TimerTick::Running(1));
        assert_eq!(timer.tick(), TimerTick::Expired);
        assert_eq!(timer.tick(), TimerTick::Idle);

        timer.start(10);
        timer.cancel();
        assert_eq!(timer.tick(), TimerTick::Idle);
    }
}
