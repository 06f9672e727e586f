use clap::Parser;
use host::content::{Provider, QuestionBank, QuestionFile};
use host::network::{HostConfig, OperatorHandle, Server};
use host::operator::{parse_command, OperatorCommand, HELP};
use log::{info, warn};
use shared::{DirRendezvous, Difficulty, Language};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Host a live quiz session", long_about = None)]
struct Args {
    /// Address to accept participants on
    #[arg(short = 'b', long, default_value = "127.0.0.1:0")]
    bind: SocketAddr,

    /// Directory shared with clients for room lookup
    #[arg(short = 'r', long)]
    rendezvous_dir: Option<PathBuf>,

    /// Base URL used for shareable join links
    #[arg(long, default_value = "http://localhost:3000/")]
    join_url: String,

    /// Maximum simultaneous participants
    #[arg(short = 'm', long, default_value = "50")]
    max_players: usize,

    /// Session language (DE or EN)
    #[arg(short = 'l', long, default_value = "DE")]
    language: Language,

    /// Default quiz topic
    #[arg(short = 't', long, default_value = "Allgemeinwissen")]
    topic: String,

    /// Easy, Medium, Hard or Extreme
    #[arg(short = 'd', long, default_value = "medium")]
    difficulty: Difficulty,

    /// Number of questions per quiz
    #[arg(short = 'q', long, default_value = "5")]
    questions: usize,

    /// Load questions from a JSON file instead of the built-in bank
    #[arg(short = 'f', long)]
    question_file: Option<PathBuf>,

    /// Start with reactions disabled
    #[arg(long)]
    no_reactions: bool,

    /// Keep rounds running until the timer expires
    #[arg(long)]
    no_auto_end: bool,
}

impl Args {
    fn config(&self) -> HostConfig {
        HostConfig {
            bind: self.bind,
            join_url: self.join_url.clone(),
            max_players: self.max_players,
            language: self.language,
            topic: self.topic.clone(),
            difficulty: self.difficulty,
            questions: self.questions,
            reactions: !self.no_reactions,
            auto_end_round: !self.no_auto_end,
            ..HostConfig::default()
        }
    }
}

/// Feeds console lines to the host loop until stdin closes
async fn run_console(operator: OperatorHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        };

        match parse_command(&line) {
            Ok(Some(command)) => {
                let quit = matches!(command, OperatorCommand::Quit);
                if operator.send(command).is_err() || quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let rendezvous_dir = args
        .rendezvous_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("quiz-party-rooms"));
    let rendezvous = Arc::new(DirRendezvous::new(&rendezvous_dir)?);
    info!("Rendezvous directory: {}", rendezvous_dir.display());

    let provider = match &args.question_file {
        Some(path) => Provider::File(QuestionFile::new(path)),
        None => Provider::Bank(QuestionBank::new()),
    };

    let mut server = Server::bind(args.config(), rendezvous, provider).await?;
    let operator = server.operator();

    println!("Quiz host on {}", server.local_addr());
    println!("{}", HELP);

    tokio::spawn(run_console(operator.clone()));

    // Quit through the loop so the room is unregistered on the way out
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Received Ctrl+C, shutting down...");
            let _ = operator.send(OperatorCommand::Quit);
        }
    });

    server.run().await?;
    Ok(())
}
