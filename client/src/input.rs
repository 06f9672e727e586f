//! Participant console input
//!
//! Turns typed lines into [`ClientCommand`]s. Answers are entered as `1`-`4`
//! or `a`-`d`; a bare room code or join link joins that room.

use shared::chat::REACTION_EMOJIS;
use shared::{Language, RoomCode};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  <room code | link>   join a room, e.g. 123 456
  1-4 or a-d           answer the current question
  skip                 pass on the current question
  say <text>           send a chat message
  react <1-6|emoji>    send a reaction
  chat                 show the chat log
  name <name>          set your display name
  avatar <emoji>       set your avatar
  lang de|en           set the language
  leave                leave the room
  quit                 exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Join(RoomCode),
    Answer(i32),
    Skip,
    Say(String),
    React(String),
    Chat,
    Name(String),
    Avatar(String),
    Language(Language),
    Leave,
    Quit,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

fn answer_index(token: &str) -> Option<i32> {
    match token.to_ascii_lowercase().as_str() {
        "1" | "a" => Some(0),
        "2" | "b" => Some(1),
        "3" | "c" => Some(2),
        "4" | "d" => Some(3),
        _ => None,
    }
}

/// Palette position (1-based) or a literal emoji
fn reaction(token: &str) -> Option<String> {
    match token.parse::<usize>() {
        Ok(n) => REACTION_EMOJIS
            .get(n.checked_sub(1)?)
            .map(|emoji| emoji.to_string()),
        Err(_) => Some(token.to_string()),
    }
}

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ClientCommand>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Some(index) = answer_index(line) {
        return Ok(Some(ClientCommand::Answer(index)));
    }
    if let Some(room) = RoomCode::parse(line) {
        return Ok(Some(ClientCommand::Join(room)));
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let required = |usage: &'static str| {
        if rest.is_empty() {
            Err(InputError::Usage(usage))
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "join" => RoomCode::parse(rest)
            .map(ClientCommand::Join)
            .ok_or(InputError::Usage("join <6-digit room code | link>"))?,
        "skip" => ClientCommand::Skip,
        "say" => ClientCommand::Say(required("say <text>")?),
        "react" => reaction(&required("react <1-6 | emoji>")?)
            .map(ClientCommand::React)
            .ok_or(InputError::Usage("react <1-6 | emoji>"))?,
        "chat" => ClientCommand::Chat,
        "name" => ClientCommand::Name(required("name <display name>")?),
        "avatar" => ClientCommand::Avatar(required("avatar <emoji>")?),
        "lang" | "language" => rest
            .parse::<Language>()
            .map(ClientCommand::Language)
            .map_err(|_| InputError::Usage("lang de|en"))?,
        "leave" => ClientCommand::Leave,
        "quit" | "exit" => ClientCommand::Quit,
        "help" | "?" => ClientCommand::Help,
        other => return Err(InputError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}
