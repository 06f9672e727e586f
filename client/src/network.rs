//! Client network layer: the channel to the host and the participant loop

use crate::input::{ClientCommand, HELP};
use crate::profile::{Profile, ProfileStore};
use crate::session::{ClientSession, ClientState, SKIP_ANSWER};
use crate::view;
use log::{debug, info, warn};
use shared::protocol::{decode, read_frame, write_frame};
use shared::{Decoded, Language, NetworkMessage, ProtocolError, Rendezvous, RoomCode, SessionError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::BufReader;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// How long to wait for the host's channel to open
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// Local clock resolution
    pub tick_duration: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            tick_duration: Duration::from_secs(1),
        }
    }
}

/// What the reader task reports from the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Message(NetworkMessage),
    /// A message kind this build does not know
    Unknown(u32),
    Closed,
}

/// Open channel to one host
#[derive(Debug)]
pub struct HostLink {
    room: RoomCode,
    writer: OwnedWriteHalf,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    reader: AbortHandle,
}

impl HostLink {
    /// Resolves the room and opens the channel.
    ///
    /// An unknown room or a refused connection is `PeerUnavailable`; a host
    /// that does not answer within `connect_timeout` is `ConnectionTimeout`.
    pub async fn connect(
        rendezvous: &dyn Rendezvous,
        room: &RoomCode,
        connect_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let unavailable = || SessionError::PeerUnavailable {
            room: room.to_string(),
        };

        let addr = rendezvous
            .resolve(&room.rendezvous_id())
            .ok_or_else(unavailable)?;
        info!("Connecting to room {} at {}", room, addr);

        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(Self::from_stream(room.clone(), stream)),
            Ok(Err(e)) => {
                warn!("Room {} refused the connection: {}", room, e);
                Err(unavailable())
            }
            Err(_) => Err(SessionError::ConnectionTimeout {
                room: room.to_string(),
            }),
        }
    }

    /// Wraps an established stream and spawns its reader task
    pub fn from_stream(room: RoomCode, stream: TcpStream) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        let (read_half, writer) = stream.into_split();
        let (tx, events) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            loop {
                let payload = match read_frame(&mut reader).await {
                    Ok(Some(payload)) => payload,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Host channel read failed: {}", e);
                        break;
                    }
                };

                let event = match decode(&payload) {
                    Ok(Decoded::Message(message)) => ClientEvent::Message(message),
                    Ok(Decoded::Unknown { tag }) => ClientEvent::Unknown(tag),
                    Err(ProtocolError::Malformed(e)) => {
                        warn!("Skipping malformed frame from host: {}", e);
                        continue;
                    }
                    Err(e) => {
                        warn!("Host channel decode failed: {}", e);
                        break;
                    }
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            let _ = tx.send(ClientEvent::Closed);
        });

        Self {
            room,
            writer,
            events,
            reader: reader.abort_handle(),
        }
    }

    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    pub async fn send(&mut self, message: &NetworkMessage) -> Result<(), SessionError> {
        write_frame(&mut self.writer, message).await.map_err(|e| {
            warn!("Failed to send {} to room {}: {}", message.kind(), self.room, e);
            SessionError::SendFailure {
                peer: self.room.to_string(),
                kind: message.kind(),
            }
        })
    }

    /// Next event from the host; `Closed` once the channel is gone
    pub async fn recv(&mut self) -> ClientEvent {
        self.events.recv().await.unwrap_or(ClientEvent::Closed)
    }
}

impl Drop for HostLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn next_event(link: &mut Option<HostLink>) -> ClientEvent {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

/// Participant client driving one [`ClientSession`]
pub struct Client {
    config: ClientConfig,
    rendezvous: Arc<dyn Rendezvous>,
    profile: ProfileStore,
    session: ClientSession,
    link: Option<HostLink>,
    last_screen: String,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        rendezvous: Arc<dyn Rendezvous>,
        profile: ProfileStore,
        session: ClientSession,
    ) -> Self {
        Client {
            config,
            rendezvous,
            profile,
            session,
            link: None,
            last_screen: String::new(),
        }
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Connects to a room and sends JOIN. Asking for the room we are already
    /// joining only repeats the JOIN.
    pub async fn join(&mut self, room: RoomCode) {
        if self.session.name().is_empty() {
            println!("{}", view::name_required(self.session.language()));
            return;
        }

        let joining_same_room = self.session.state() == ClientState::Joining
            && self.link.as_ref().is_some_and(|link| link.room() == &room);
        if joining_same_room {
            let join = self.session.request_join(Instant::now());
            self.send(join).await;
            return;
        }

        if self.link.take().is_some() {
            self.session.leave();
        }

        match HostLink::connect(self.rendezvous.as_ref(), &room, self.config.connect_timeout).await
        {
            Ok(link) => {
                self.link = Some(link);
                let join = self.session.connected(Instant::now());
                self.send(join).await;
            }
            Err(e) => {
                warn!("Could not join room {}: {}", room, e);
                self.session.connection_lost(&e);
            }
        }
    }

    /// Drops the channel and returns to room entry
    pub fn leave(&mut self) {
        if let Some(link) = self.link.take() {
            info!("Leaving room {}", link.room());
        }
        self.session.leave();
    }

    fn disconnect(&mut self, error: SessionError) {
        self.link = None;
        self.session.connection_lost(&error);
    }

    async fn send(&mut self, message: NetworkMessage) {
        let Some(link) = self.link.as_mut() else {
            debug!("Not connected, dropping {}", message.kind());
            return;
        };
        if let Err(e) = link.send(&message).await {
            self.disconnect(e);
        }
    }

    fn save_profile(&self, language: Language) {
        let profile = Profile {
            name: self.session.name().to_string(),
            avatar: self.session.avatar().to_string(),
            language,
        };
        match self.profile.save(&profile) {
            Ok(()) => debug!("Profile saved to {}", self.profile.path().display()),
            Err(e) => warn!("Could not save profile {}: {}", self.profile.path().display(), e),
        }
    }

    pub async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Message(message) => {
                let first_welcome = matches!(message, NetworkMessage::Welcome { .. })
                    && self.session.state() == ClientState::Joining;
                // The participant's own choice, before the host's language applies
                let language = self.session.language();

                self.session.apply(message, Instant::now());
                if first_welcome {
                    self.save_profile(language);
                }
            }
            ClientEvent::Unknown(tag) => debug!("Skipping unknown message kind {}", tag),
            ClientEvent::Closed => {
                info!("Host closed the channel");
                self.disconnect(SessionError::ConnectionLost);
            }
        }
    }

    /// Applies one console command. Returns false once the participant quits.
    pub async fn handle_command(&mut self, command: ClientCommand) -> bool {
        let language = self.session.language();
        match command {
            ClientCommand::Join(room) => self.join(room).await,
            ClientCommand::Answer(index) => match self.session.submit_answer(index) {
                Some(answer) => self.send(answer).await,
                None => println!("{}", view::not_now(language)),
            },
            ClientCommand::Skip => match self.session.submit_answer(SKIP_ANSWER) {
                Some(answer) => self.send(answer).await,
                None => println!("{}", view::not_now(language)),
            },
            ClientCommand::Say(text) => match self.session.compose_chat(&text) {
                Some(chat) => self.send(chat).await,
                None => println!("{}", view::not_now(language)),
            },
            ClientCommand::React(emoji) => {
                match self.session.send_reaction(&emoji, Instant::now()) {
                    Some(reaction) => self.send(reaction).await,
                    None => println!("{}", view::not_now(language)),
                }
            }
            ClientCommand::Chat => print!("{}", view::render_chat(self.session.chat(), language)),
            ClientCommand::Name(name) => {
                let avatar = self.session.avatar().to_string();
                self.change_identity(&name, &avatar);
            }
            ClientCommand::Avatar(avatar) => {
                let name = self.session.name().to_string();
                self.change_identity(&name, &avatar);
            }
            ClientCommand::Language(language) => {
                self.session.set_language(language);
                self.save_profile(language);
            }
            ClientCommand::Leave => self.leave(),
            ClientCommand::Quit => return false,
            ClientCommand::Help => println!("{}\n{}", HELP, view::render_palette()),
        }
        true
    }

    fn change_identity(&mut self, name: &str, avatar: &str) {
        if self.session.set_identity(name, avatar) {
            self.save_profile(self.session.language());
        } else {
            println!("{}", view::not_now(self.session.language()));
        }
    }

    /// One local clock tick: join timeout, countdown and reaction expiry
    pub async fn tick(&mut self) {
        let now = Instant::now();
        if self.session.join_timed_out(now) {
            debug!("Still waiting for WELCOME, re-enter the room code to retry");
        }
        if let Some(answer) = self.session.tick(now) {
            self.send(answer).await;
        }
    }

    /// Prints the screen when it changed
    fn refresh(&mut self) {
        let screen = view::render(&self.session);
        if screen != self.last_screen {
            print!("{}", screen);
            self.last_screen = screen;
        }
        self.session.take_notice();
    }

    /// Runs until the participant quits or the command channel closes
    pub async fn run(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Result<(), SessionError> {
        let mut clock = interval(self.config.tick_duration);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Client started");
        self.refresh();

        loop {
            tokio::select! {
                event = next_event(&mut self.link) => self.handle_event(event).await,

                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                },

                _ = clock.tick() => self.tick().await,
            }

            if self.session.take_round_started() {
                clock.reset();
            }
            self.refresh();
        }

        info!("Client shutting down");
        self.link = None;
        Ok(())
    }
}
