//! Host operator console
//!
//! The operator drives the quiz from a line-oriented console. Each line is
//! parsed into an [`OperatorCommand`] and queued on the host event loop, so
//! the console never touches the session directly.

use crate::session::{HostPhase, HostSnapshot};
use shared::ChatLog;
use std::fmt::Write;
use thiserror::Error;
use tokio::sync::oneshot;

pub const HELP: &str = "\
Commands:
  generate [topic]     create a quiz and open the lobby
  abort                cancel content generation
  start                start the game
  skip                 end the current round now
  leaderboard          show the leaderboard
  next                 next question or final ranking
  kick <id|name>       remove a player
  say <text>           chat as host
  delete <message id>  remove a chat message everywhere
  reactions on|off     allow or block reactions
  status               show room, round and standings
  chat                 show the chat log
  restart              discard the session and start over
  quit                 close the room and exit";

#[derive(Debug)]
pub enum OperatorCommand {
    /// Topic override; the configured topic is used otherwise
    Generate(Option<String>),
    Abort,
    Start,
    Skip,
    Leaderboard,
    Next,
    Kick(String),
    Say(String),
    Delete(String),
    Reactions(bool),
    Status,
    Chat,
    Restart,
    Quit,
    Help,
    /// Read-only state for embedders and tests
    Snapshot(oneshot::Sender<HostSnapshot>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<OperatorCommand>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let argument = |usage: &'static str| {
        if rest.is_empty() {
            Err(CommandError::Usage(usage))
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "generate" | "gen" => {
            OperatorCommand::Generate((!rest.is_empty()).then(|| rest.to_string()))
        }
        "abort" => OperatorCommand::Abort,
        "start" => OperatorCommand::Start,
        "skip" => OperatorCommand::Skip,
        "leaderboard" | "lb" => OperatorCommand::Leaderboard,
        "next" | "n" => OperatorCommand::Next,
        "kick" => OperatorCommand::Kick(argument("kick <player id | name>")?),
        "say" => OperatorCommand::Say(argument("say <text>")?),
        "delete" | "del" => OperatorCommand::Delete(argument("delete <message id>")?),
        "reactions" => match rest.to_ascii_lowercase().as_str() {
            "on" => OperatorCommand::Reactions(true),
            "off" => OperatorCommand::Reactions(false),
            _ => return Err(CommandError::Usage("reactions on|off")),
        },
        "status" | "s" => OperatorCommand::Status,
        "chat" => OperatorCommand::Chat,
        "restart" => OperatorCommand::Restart,
        "quit" | "exit" => OperatorCommand::Quit,
        "help" | "?" => OperatorCommand::Help,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn phase_label(phase: HostPhase) -> &'static str {
    match phase {
        HostPhase::Welcome => "WELCOME",
        HostPhase::Loading => "LOADING",
        HostPhase::Lobby => "LOBBY",
        HostPhase::Playing => "PLAYING",
        HostPhase::Feedback => "FEEDBACK",
        HostPhase::Leaderboard => "LEADERBOARD",
        HostPhase::GameOver => "GAME_OVER",
    }
}

/// Operator view of the host state
pub fn render_status(snapshot: &HostSnapshot, join_url: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Phase: {}", phase_label(snapshot.phase));

    if let Some(room) = &snapshot.room {
        let _ = writeln!(out, "Room:  {}", room);
        let _ = writeln!(out, "Join:  {}", room.join_link(join_url));
    }
    if let Some(topic) = &snapshot.topic {
        let _ = writeln!(out, "Topic: {} ({})", topic, snapshot.language);
    }
    if let Some((round, total)) = snapshot.round {
        let _ = write!(out, "Round: {}/{}", round, total);
        if let Some(left) = snapshot.time_left {
            let _ = write!(out, ", {}s left", left);
        }
        let _ = writeln!(
            out,
            ", {}/{} answered",
            snapshot.answered,
            snapshot.standings.len()
        );
    }
    let relay = &snapshot.relay;
    let _ = write!(
        out,
        "Reactions: {}, chat messages: {}",
        if relay.reactions_allowed { "on" } else { "off" },
        relay.chat_messages
    );
    if !relay.active_reactions.is_empty() {
        let _ = write!(out, "  {}", relay.active_reactions.join(" "));
    }
    let _ = writeln!(out);

    if snapshot.standings.is_empty() {
        if snapshot.room.is_some() {
            let _ = writeln!(out, "No players yet.");
        }
    } else {
        for standing in &snapshot.standings {
            let _ = writeln!(
                out,
                "{:>3}. {} {:<15} {:>7} pts  streak {}{}  [{}]",
                standing.rank,
                standing.avatar,
                standing.name,
                standing.score,
                standing.streak,
                if standing.answered { "  ✓" } else { "" },
                standing.player_id
            );
        }
    }
    out
}

/// Chat log with message ids, for moderation
pub fn render_chat(log: &ChatLog) -> String {
    if log.is_empty() {
        return "Chat is empty.\n".to_string();
    }

    let mut out = String::new();
    for message in log.iter() {
        let _ = writeln!(
            out,
            "[{}] {}{} {}: {}",
            message.id,
            if message.is_host { "(host) " } else { "" },
            message.sender_avatar,
            message.sender_name,
            message.text
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayStatus;
    use crate::session::Standing;
    use shared::{ChatMessage, Language, RoomCode};

    fn parse(line: &str) -> OperatorCommand {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn test_parse_simple_commands() {
        assert!(matches!(parse("start"), OperatorCommand::Start));
        assert!(matches!(parse("  SKIP "), OperatorCommand::Skip));
        assert!(matches!(parse("lb"), OperatorCommand::Leaderboard));
        assert!(matches!(parse("next"), OperatorCommand::Next));
        assert!(matches!(parse("restart"), OperatorCommand::Restart));
        assert!(matches!(parse("quit"), OperatorCommand::Quit));
        assert!(parse_command("   ").unwrap().is_none());
    }

    #[test]
    fn test_parse_generate_topic() {
        assert!(matches!(parse("generate"), OperatorCommand::Generate(None)));
        match parse("generate  Ancient Rome ") {
            OperatorCommand::Generate(Some(topic)) => assert_eq!(topic, "Ancient Rome"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_arguments() {
        match parse("say Welcome to the quiz!") {
            OperatorCommand::Say(text) => assert_eq!(text, "Welcome to the quiz!"),
            other => panic!("unexpected command {:?}", other),
        }
        match parse("kick Ava") {
            OperatorCommand::Kick(who) => assert_eq!(who, "Ava"),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(matches!(parse("reactions off"), OperatorCommand::Reactions(false)));
        assert!(matches!(parse("reactions ON"), OperatorCommand::Reactions(true)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_command("dance").unwrap_err(),
            CommandError::Unknown("dance".to_string())
        );
        assert!(matches!(parse_command("kick"), Err(CommandError::Usage(_))));
        assert!(matches!(parse_command("reactions maybe"), Err(CommandError::Usage(_))));
    }

    #[test]
    fn test_render_status() {
        let snapshot = HostSnapshot {
            phase: HostPhase::Playing,
            room: RoomCode::parse("482913"),
            topic: Some("Space".to_string()),
            language: Language::En,
            round: Some((2, 5)),
            time_left: Some(12),
            answered: 1,
            standings: vec![Standing {
                rank: 1,
                player_id: "p-1".to_string(),
                name: "Ava".to_string(),
                avatar: "🐶".to_string(),
                score: 1450,
                streak: 2,
                answered: true,
            }],
            relay: RelayStatus {
                reactions_allowed: true,
                chat_messages: 3,
                active_reactions: vec!["🔥".to_string(), "😂".to_string()],
            },
        };

        let text = render_status(&snapshot, "http://localhost:3000/");
        assert!(text.contains("PLAYING"));
        assert!(text.contains("482 913"));
        assert!(text.contains("gameId=quiz-party-room-482913"));
        assert!(text.contains("Round: 2/5, 12s left, 1/1 answered"));
        assert!(text.contains("1450"));
        assert!(text.contains("Reactions: on, chat messages: 3  🔥 😂"));
    }

    #[test]
    fn test_render_chat_lists_ids() {
        let mut log = ChatLog::default();
        assert_eq!(render_chat(&log), "Chat is empty.\n");

        log.push(ChatMessage {
            id: "m-7".to_string(),
            sender_id: "p-1".to_string(),
            sender_name: "Ava".to_string(),
            sender_avatar: "🐶".to_string(),
            text: "hi".to_string(),
            timestamp: 1,
            is_host: false,
        });
        assert!(render_chat(&log).contains("[m-7] 🐶 Ava: hi"));
    }
}
