//! Text rendering of the participant screen

use crate::session::{ClientSession, ClientState};
use shared::chat::REACTION_EMOJIS;
use shared::scoring::time_fraction;
use shared::{ChatLog, Language};
use std::fmt::Write;

const OPTION_LABELS: [&str; 4] = ["A", "B", "C", "D"];
const CLOCK_WIDTH: usize = 20;

fn tr(language: Language, de: &'static str, en: &'static str) -> &'static str {
    match language {
        Language::De => de,
        Language::En => en,
    }
}

/// Countdown bar, full at the start of the round
fn clock_bar(time_left: u32, total: u32) -> String {
    let filled = (time_fraction(time_left, total) * CLOCK_WIDTH as f32).round() as usize;
    format!(
        "[{}{}] {}s",
        "#".repeat(filled),
        "-".repeat(CLOCK_WIDTH - filled.min(CLOCK_WIDTH)),
        time_left
    )
}

pub fn render(session: &ClientSession) -> String {
    let lang = session.language();
    let mut out = String::new();

    if let Some(notice) = session.notice() {
        let _ = writeln!(out, "! {}", notice);
    }

    match session.state() {
        ClientState::Connecting => {
            let _ = writeln!(
                out,
                "{} {} {}",
                session.avatar(),
                session.name(),
                tr(lang, "- Raumcode eingeben:", "- enter a room code:")
            );
        }
        ClientState::Joining => {
            let _ = writeln!(out, "{}", tr(lang, "Beitreten ...", "Joining ..."));
        }
        ClientState::Waiting => {
            let topic = session.topic().unwrap_or_default();
            if session.showing_leaderboard() {
                let _ = writeln!(
                    out,
                    "{} {} {}",
                    tr(lang, "Zwischenstand! Deine Punkte:", "Leaderboard! Your score:"),
                    session.score(),
                    tr(lang, "- gleich geht's weiter.", "- next question soon.")
                );
            } else if session.game_started() {
                let _ = writeln!(out, "{}", tr(lang, "Mach dich bereit!", "Get ready!"));
            } else {
                let _ = writeln!(
                    out,
                    "{} \"{}\". {}",
                    tr(lang, "Du bist dabei! Thema:", "You're in! Topic:"),
                    topic,
                    tr(lang, "Warte auf den Host ...", "Waiting for the host ...")
                );
            }
        }
        ClientState::Playing | ClientState::Answered => {
            let (round, total) = session.round();
            if let Some(question) = session.question() {
                let _ = writeln!(
                    out,
                    "{} {}/{}  {}",
                    tr(lang, "Frage", "Question"),
                    round,
                    total,
                    clock_bar(session.time_left(), question.time_limit_seconds)
                );
                let _ = writeln!(out, "{}", question.text);
                for (i, option) in question.options.iter().enumerate() {
                    let marker = if session.selected() == Some(i as i32) { ">" } else { " " };
                    let _ = writeln!(out, "{} {}) {}", marker, OPTION_LABELS[i], option);
                }
            }
            if session.state() == ClientState::Answered {
                let _ = writeln!(
                    out,
                    "{}",
                    tr(lang, "Antwort gesendet, warte auf Auflösung ...", "Answer sent, waiting for results ...")
                );
            }
        }
        ClientState::Feedback => {
            if let Some(result) = session.last_result() {
                let verdict = if result.was_correct {
                    tr(lang, "Richtig!", "Correct!")
                } else {
                    tr(lang, "Leider falsch.", "Not this time.")
                };
                let _ = writeln!(out, "{} +{}", verdict, result.points);

                if let Some(question) = session.question() {
                    let correct = result.correct_index as usize;
                    if let Some(option) = question.options.get(correct) {
                        let _ = writeln!(
                            out,
                            "{} {}) {}",
                            tr(lang, "Lösung:", "Answer:"),
                            OPTION_LABELS[correct],
                            option
                        );
                    }
                    if let Some(explanation) = &question.explanation {
                        let _ = writeln!(out, "{}", explanation);
                    }
                }
            }
            let _ = writeln!(
                out,
                "{} {}  {} {}",
                tr(lang, "Punkte:", "Score:"),
                session.score(),
                tr(lang, "Serie:", "Streak:"),
                session.streak()
            );
        }
        ClientState::GameOver => {
            let _ = writeln!(
                out,
                "{} #{}  ({} {})",
                tr(lang, "Spiel vorbei! Platz", "Game over! Rank"),
                session.rank().unwrap_or_default(),
                session.score(),
                tr(lang, "Punkte", "points")
            );
        }
    }

    let reactions = session.reactions().active();
    if !reactions.is_empty() {
        let line: Vec<&str> = reactions.iter().map(|r| r.emoji.as_str()).collect();
        let _ = writeln!(out, "{}", line.join(" "));
    }
    if let Some(last) = session.chat().last() {
        let _ = writeln!(out, "💬 {} {}: {}", last.sender_avatar, last.sender_name, last.text);
    }
    out
}

pub fn render_chat(log: &ChatLog, language: Language) -> String {
    if log.is_empty() {
        return format!("{}\n", tr(language, "Noch keine Nachrichten.", "No messages yet."));
    }

    let mut out = String::new();
    for message in log.iter() {
        let host = if message.is_host { " (Host)" } else { "" };
        let _ = writeln!(
            out,
            "{} {}{}: {}",
            message.sender_avatar, message.sender_name, host, message.text
        );
    }
    out
}

/// Shown when a command does not fit the current screen
pub fn not_now(language: Language) -> &'static str {
    tr(language, "Das geht gerade nicht.", "Not possible right now.")
}

pub fn name_required(language: Language) -> &'static str {
    tr(
        language,
        "Bitte zuerst einen Namen setzen: name <Name>",
        "Set a name first: name <name>",
    )
}

/// Numbered reaction palette for the `react` command
pub fn render_palette() -> String {
    REACTION_EMOJIS
        .iter()
        .enumerate()
        .map(|(i, emoji)| format!("{}:{}", i + 1, emoji))
        .collect::<Vec<_>>()
        .join("  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ChatMessage, NetworkMessage, Question};
    use std::time::Instant;

    fn joined(language: Language) -> ClientSession {
        let now = Instant::now();
        let mut session = ClientSession::new("Ava", "🐶", language);
        session.connected(now);
        session.apply(
            NetworkMessage::Welcome {
                player_id: "p-ava".to_string(),
                topic: "Space".to_string(),
                cover_ref: None,
                language,
            },
            now,
        );
        session
    }

    fn start_question(session: &mut ClientSession) {
        session.apply(
            NetworkMessage::QuestionStart {
                question: Question {
                    text: "Closest planet to the sun?".to_string(),
                    options: ["Venus".into(), "Mercury".into(), "Mars".into(), "Earth".into()],
                    correct_index: 1,
                    time_limit_seconds: 20,
                    explanation: Some("Mercury is the innermost planet.".to_string()),
                    image_ref: None,
                },
                round_index: 1,
                total_rounds: 3,
            },
            Instant::now(),
        );
    }

    #[test]
    fn test_clock_bar() {
        assert_eq!(clock_bar(20, 20), format!("[{}] 20s", "#".repeat(CLOCK_WIDTH)));
        assert_eq!(clock_bar(0, 20), format!("[{}] 0s", "-".repeat(CLOCK_WIDTH)));
        assert_eq!(clock_bar(10, 20), format!("[{}{}] 10s", "#".repeat(10), "-".repeat(10)));
    }

    #[test]
    fn test_lobby_is_localized() {
        assert!(render(&joined(Language::En)).contains("You're in! Topic: \"Space\""));
        assert!(render(&joined(Language::De)).contains("Du bist dabei!"));
    }

    #[test]
    fn test_question_marks_selection() {
        let mut session = joined(Language::En);
        start_question(&mut session);
        let screen = render(&session);
        assert!(screen.contains("Question 1/3"));
        assert!(screen.contains("  B) Mercury"));

        session.submit_answer(1);
        let screen = render(&session);
        assert!(screen.contains("> B) Mercury"));
        assert!(screen.contains("Answer sent"));
    }

    #[test]
    fn test_feedback_shows_host_result() {
        let mut session = joined(Language::En);
        start_question(&mut session);
        session.apply(
            NetworkMessage::RoundEnd {
                correct_index: 1,
                score: 0,
                streak: 0,
                points_this_round: 0,
                was_correct: false,
            },
            Instant::now(),
        );

        let screen = render(&session);
        assert!(screen.contains("Not this time. +0"));
        assert!(screen.contains("Answer: B) Mercury"));
        assert!(screen.contains("Mercury is the innermost planet."));
    }

    #[test]
    fn test_game_over_shows_rank() {
        let mut session = joined(Language::De);
        session.apply(NetworkMessage::GameOver { rank: 2 }, Instant::now());
        assert!(render(&session).contains("Platz #2"));
    }

    #[test]
    fn test_chat_rendering() {
        let mut log = ChatLog::default();
        assert_eq!(render_chat(&log, Language::En), "No messages yet.\n");

        log.push(ChatMessage {
            id: "1".to_string(),
            sender_id: "host".to_string(),
            sender_name: "Quizmaster".to_string(),
            sender_avatar: "🎤".to_string(),
            text: "Welcome".to_string(),
            timestamp: 0,
            is_host: true,
        });
        assert_eq!(render_chat(&log, Language::En), "🎤 Quizmaster (Host): Welcome\n");
    }

    #[test]
    fn test_palette_lists_all_reactions() {
        let palette = render_palette();
        assert!(palette.starts_with("1:❤️"));
        assert!(palette.contains("6:💩"));
    }
}
