use clap::Parser;
use client::input::{parse_line, ClientCommand, HELP};
use client::network::{Client, ClientConfig};
use client::profile::ProfileStore;
use client::session::ClientSession;
use log::{info, warn};
use shared::{DirRendezvous, Language, RoomCode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Join a live quiz session", long_about = None)]
struct Args {
    /// Room code or join link to enter right away
    #[arg(short = 'r', long)]
    room: Option<String>,

    /// Directory shared with the host for room lookup
    #[arg(short = 'd', long)]
    rendezvous_dir: Option<PathBuf>,

    /// Profile file (defaults to ~/.quiz-party-profile.json)
    #[arg(short = 'p', long)]
    profile: Option<PathBuf>,

    /// Display name, overrides the saved profile
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Avatar emoji, overrides the saved profile
    #[arg(short = 'a', long)]
    avatar: Option<String>,

    /// Language (DE or EN), overrides the saved profile
    #[arg(short = 'l', long)]
    language: Option<Language>,

    /// Seconds to wait for the host to accept the connection
    #[arg(long, default_value = "8")]
    connect_timeout: u64,
}

/// Feeds console lines to the client loop until stdin closes
async fn run_console(commands: mpsc::UnboundedSender<ClientCommand>) {
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

        match parse_line(&line) {
            Ok(Some(command)) => {
                let quit = command == ClientCommand::Quit;
                if commands.send(command).is_err() || quit {
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

    let store = ProfileStore::new(args.profile.clone().unwrap_or_else(ProfileStore::default_path));
    let profile = store.load();
    let name = args.name.as_deref().unwrap_or(&profile.name);
    let avatar = args.avatar.as_deref().unwrap_or(&profile.avatar);
    let language = args.language.unwrap_or(profile.language);
    let session = ClientSession::new(name, avatar, language);

    let config = ClientConfig {
        connect_timeout: Duration::from_secs(args.connect_timeout),
        ..ClientConfig::default()
    };
    let mut client = Client::new(config, rendezvous, store, session);

    println!("{}", HELP);

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_console(tx.clone()));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(ClientCommand::Quit);
        }
    });

    if let Some(room) = &args.room {
        match RoomCode::parse(room) {
            Some(room) => client.join(room).await,
            None => println!("Invalid room code: {}", room),
        }
    }

    client.run(rx).await?;
    Ok(())
}
