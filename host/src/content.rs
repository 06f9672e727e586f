//! Quiz content providers
//!
//! The host asks a [`ContentProvider`] for a question set while it sits in
//! LOADING. Generation runs off the event loop; the result comes back as a
//! message tagged with the request ticket so a late answer for an aborted
//! request can be recognised and dropped.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use shared::{Difficulty, Language, Question, SessionError};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Time limit the bank uses for Hard and Extreme quizzes
pub const HARD_TIME_LIMIT_SECONDS: u32 = 45;

/// What the host asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub topic: String,
    pub difficulty: Difficulty,
    pub count: usize,
    pub language: Language,
}

/// A generated quiz, ready to open a lobby with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBundle {
    pub topic: String,
    pub cover_ref: Option<String>,
    pub difficulty: Difficulty,
    pub questions: Vec<Question>,
}

pub trait ContentProvider: Send + Sync + 'static {
    fn generate(
        &self,
        request: ContentRequest,
    ) -> impl Future<Output = Result<ContentBundle, SessionError>> + Send;
}

struct BankEntry {
    text: &'static str,
    options: [&'static str; 4],
    correct_index: u8,
    explanation: &'static str,
}

const BANK_TIME_LIMIT_SECONDS: u32 = 60;

const BANK_EN: &[BankEntry] = &[
    BankEntry {
        text: "Which planet is closest to the sun?",
        options: ["Venus", "Mercury", "Mars", "Earth"],
        correct_index: 1,
        explanation: "Mercury orbits at roughly 58 million km from the sun.",
    },
    BankEntry {
        text: "How many sides does a hexagon have?",
        options: ["Five", "Seven", "Six", "Eight"],
        correct_index: 2,
        explanation: "Hexa means six.",
    },
    BankEntry {
        text: "What is the chemical symbol for gold?",
        options: ["Au", "Ag", "Go", "Gd"],
        correct_index: 0,
        explanation: "Au comes from the Latin word aurum.",
    },
    BankEntry {
        text: "Which is the largest ocean on Earth?",
        options: ["Atlantic", "Indian", "Arctic", "Pacific"],
        correct_index: 3,
        explanation: "The Pacific covers about a third of the planet's surface.",
    },
    BankEntry {
        text: "What do bees collect from flowers to make honey?",
        options: ["Pollen", "Nectar", "Resin", "Water"],
        correct_index: 1,
        explanation: "Nectar is turned into honey; pollen is food for the brood.",
    },
    BankEntry {
        text: "Which instrument has 88 keys?",
        options: ["Piano", "Accordion", "Organ", "Harpsichord"],
        correct_index: 0,
        explanation: "A standard modern piano has 52 white and 36 black keys.",
    },
    BankEntry {
        text: "How many minutes are in a full day?",
        options: ["1200", "1440", "1680", "960"],
        correct_index: 1,
        explanation: "24 hours times 60 minutes.",
    },
    BankEntry {
        text: "Which gas do plants mainly take in for photosynthesis?",
        options: ["Oxygen", "Nitrogen", "Carbon dioxide", "Helium"],
        correct_index: 2,
        explanation: "Plants turn carbon dioxide and water into sugar and oxygen.",
    },
];

const BANK_DE: &[BankEntry] = &[
    BankEntry {
        text: "Welcher Planet ist der Sonne am nächsten?",
        options: ["Venus", "Merkur", "Mars", "Erde"],
        correct_index: 1,
        explanation: "Merkur umkreist die Sonne in etwa 58 Millionen km Abstand.",
    },
    BankEntry {
        text: "Wie viele Seiten hat ein Sechseck?",
        options: ["Fünf", "Sieben", "Sechs", "Acht"],
        correct_index: 2,
        explanation: "Der Name verrät es schon.",
    },
    BankEntry {
        text: "Was ist das chemische Symbol für Gold?",
        options: ["Au", "Ag", "Go", "Gd"],
        correct_index: 0,
        explanation: "Au kommt vom lateinischen Wort aurum.",
    },
    BankEntry {
        text: "Welcher ist der größte Ozean der Erde?",
        options: ["Atlantik", "Indischer Ozean", "Arktischer Ozean", "Pazifik"],
        correct_index: 3,
        explanation: "Der Pazifik bedeckt etwa ein Drittel der Erdoberfläche.",
    },
    BankEntry {
        text: "Was sammeln Bienen aus Blüten, um Honig herzustellen?",
        options: ["Pollen", "Nektar", "Harz", "Wasser"],
        correct_index: 1,
        explanation: "Aus Nektar wird Honig; Pollen dient als Futter für die Brut.",
    },
    BankEntry {
        text: "Welches Instrument hat 88 Tasten?",
        options: ["Klavier", "Akkordeon", "Orgel", "Cembalo"],
        correct_index: 0,
        explanation: "Ein modernes Klavier hat 52 weiße und 36 schwarze Tasten.",
    },
    BankEntry {
        text: "Wie viele Minuten hat ein ganzer Tag?",
        options: ["1200", "1440", "1680", "960"],
        correct_index: 1,
        explanation: "24 Stunden mal 60 Minuten.",
    },
    BankEntry {
        text: "Welches Gas nehmen Pflanzen für die Photosynthese hauptsächlich auf?",
        options: ["Sauerstoff", "Stickstoff", "Kohlendioxid", "Helium"],
        correct_index: 2,
        explanation: "Pflanzen machen aus Kohlendioxid und Wasser Zucker und Sauerstoff.",
    },
];

/// Built-in offline question bank
///
/// Every prompt is prefixed with the requested topic. When more questions
/// are requested than the bank holds, it starts over from the beginning.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank;

impl QuestionBank {
    pub fn new() -> Self {
        Self
    }

    pub fn questions(&self, request: &ContentRequest) -> Vec<Question> {
        let (bank, prefix) = match request.language {
            Language::De => (BANK_DE, "Thema"),
            Language::En => (BANK_EN, "Topic"),
        };
        let time_limit = match request.difficulty {
            Difficulty::Hard | Difficulty::Extreme => HARD_TIME_LIMIT_SECONDS,
            Difficulty::Easy | Difficulty::Medium => BANK_TIME_LIMIT_SECONDS,
        };

        bank.iter()
            .cycle()
            .take(request.count)
            .map(|entry| Question {
                text: format!("{} \"{}\": {}", prefix, request.topic, entry.text),
                options: entry.options.map(str::to_string),
                correct_index: entry.correct_index,
                time_limit_seconds: time_limit,
                explanation: Some(entry.explanation.to_string()),
                image_ref: None,
            })
            .collect()
    }
}

impl ContentProvider for QuestionBank {
    fn generate(
        &self,
        request: ContentRequest,
    ) -> impl Future<Output = Result<ContentBundle, SessionError>> + Send {
        let questions = self.questions(&request);
        debug!(
            "Question bank produced {} questions for '{}'",
            questions.len(),
            request.topic
        );

        let result = if questions.is_empty() {
            Err(SessionError::ContentGeneration(
                "no questions requested".to_string(),
            ))
        } else {
            Ok(ContentBundle {
                topic: request.topic,
                cover_ref: None,
                difficulty: request.difficulty,
                questions,
            })
        };
        std::future::ready(result)
    }
}

/// Quiz file layout: either a bare question list or a full quiz object
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum QuizDocument {
    Full(QuizFile),
    Questions(Vec<Question>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizFile {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    cover_ref: Option<String>,
    questions: Vec<Question>,
}

/// Questions loaded from a JSON file
///
/// Fields use camelCase (`correctIndex`, `timeLimitSeconds`). Unplayable
/// questions are dropped with a warning; a file that leaves nothing to play
/// fails the generation.
#[derive(Debug, Clone)]
pub struct QuestionFile {
    path: PathBuf,
}

impl QuestionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses a quiz document and applies the request to it
    pub fn parse(contents: &str, request: &ContentRequest) -> Result<ContentBundle, SessionError> {
        let document: QuizDocument = serde_json::from_str(contents)
            .map_err(|e| SessionError::ContentGeneration(format!("invalid quiz file: {}", e)))?;

        let (topic, cover_ref, questions) = match document {
            QuizDocument::Full(file) => (file.topic, file.cover_ref, file.questions),
            QuizDocument::Questions(questions) => (None, None, questions),
        };

        let total = questions.len();
        let mut questions: Vec<Question> = questions
            .into_iter()
            .filter(Question::is_playable)
            .collect();

        if questions.len() < total {
            warn!(
                "Dropped {} unplayable questions from quiz file",
                total - questions.len()
            );
        }
        if request.count > 0 {
            questions.truncate(request.count);
        }
        if questions.is_empty() {
            return Err(SessionError::ContentGeneration(
                "quiz file contains no playable question".to_string(),
            ));
        }

        Ok(ContentBundle {
            topic: topic
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| request.topic.clone()),
            cover_ref,
            difficulty: request.difficulty,
            questions,
        })
    }
}

impl ContentProvider for QuestionFile {
    fn generate(
        &self,
        request: ContentRequest,
    ) -> impl Future<Output = Result<ContentBundle, SessionError>> + Send {
        let path = self.path.clone();
        async move {
            info!("Loading questions from {}", path.display());
            let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
                SessionError::ContentGeneration(format!("cannot read {}: {}", path.display(), e))
            })?;
            Self::parse(&contents, &request)
        }
    }
}

/// The providers selectable from the command line
#[derive(Debug, Clone)]
pub enum Provider {
    Bank(QuestionBank),
    File(QuestionFile),
}

impl ContentProvider for Provider {
    fn generate(
        &self,
        request: ContentRequest,
    ) -> impl Future<Output = Result<ContentBundle, SessionError>> + Send {
        let provider = self.clone();
        async move {
            match provider {
                Provider::Bank(bank) => bank.generate(request).await,
                Provider::File(file) => file.generate(request).await,
            }
        }
    }
}
