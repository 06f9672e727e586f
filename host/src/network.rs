//! Host network layer: TCP channels, rendezvous registration and the event loop

use crate::connection_manager::{ConnectionId, ConnectionManager};
use crate::content::{ContentBundle, ContentProvider, ContentRequest};
use crate::operator::{render_chat, render_status, OperatorCommand, HELP};
use crate::relay::Relay;
use crate::session::{AnswerOutcome, HostMachine, HostSnapshot, JoinOutcome, Outbound};
use log::{debug, error, info, warn};
use shared::protocol::{decode, read_frame, write_frame};
use shared::{
    create_room, Decoded, Difficulty, Language, NetworkMessage, ProtocolError, Rendezvous,
    RoomCode, SessionError,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Everything the host needs to know before it opens a room
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub bind: SocketAddr,
    /// Base URL for shareable join links
    pub join_url: String,
    pub max_players: usize,
    pub language: Language,
    pub topic: String,
    pub difficulty: Difficulty,
    pub questions: usize,
    pub reactions: bool,
    /// End a round as soon as every player has answered
    pub auto_end_round: bool,
    pub host_name: String,
    pub host_avatar: String,
    /// Round clock resolution
    pub tick_duration: Duration,
    /// How long an accepted connection may stay silent before its JOIN
    pub join_deadline: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            join_url: "http://localhost:3000/".to_string(),
            max_players: 50,
            language: Language::default(),
            topic: "General Knowledge".to_string(),
            difficulty: Difficulty::default(),
            questions: 5,
            reactions: true,
            auto_end_round: true,
            host_name: "Host".to_string(),
            host_avatar: "🎤".to_string(),
            tick_duration: Duration::from_secs(1),
            join_deadline: Duration::from_secs(30),
        }
    }
}

/// Messages sent from network tasks and the console to the main loop
#[derive(Debug)]
pub enum ServerMessage {
    Accepted {
        stream: TcpStream,
        addr: SocketAddr,
    },
    MessageReceived {
        conn: ConnectionId,
        message: NetworkMessage,
    },
    UnknownMessage {
        conn: ConnectionId,
        tag: u32,
    },
    Disconnected {
        conn: ConnectionId,
    },
    Operator(OperatorCommand),
    ContentReady {
        ticket: u64,
        result: Result<ContentBundle, SessionError>,
    },
}

/// Cloneable handle for queueing operator commands
#[derive(Debug, Clone)]
pub struct OperatorHandle {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl OperatorHandle {
    pub fn send(&self, command: OperatorCommand) -> Result<(), SessionError> {
        self.tx
            .send(ServerMessage::Operator(command))
            .map_err(|_| SessionError::ConnectionLost)
    }

    /// Reads the host state without touching the session
    pub async fn snapshot(&self) -> Result<HostSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(OperatorCommand::Snapshot(tx))?;
        rx.await.map_err(|_| SessionError::ConnectionLost)
    }
}

/// Main host coordinating transport, session and relay
pub struct Server<P: ContentProvider> {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    acceptor: Option<AbortHandle>,
    config: HostConfig,
    rendezvous: Arc<dyn Rendezvous>,
    provider: Arc<P>,

    connections: ConnectionManager,
    machine: HostMachine,
    relay: Relay,
    shutdown: bool,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl<P: ContentProvider> Server<P> {
    pub async fn bind(
        config: HostConfig,
        rendezvous: Arc<dyn Rendezvous>,
        provider: P,
    ) -> Result<Self, SessionError> {
        let listener = TcpListener::bind(config.bind).await?;
        let local_addr = listener.local_addr()?;
        info!("Host listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            acceptor: None,
            connections: ConnectionManager::new(config.max_players),
            machine: HostMachine::new(config.language, config.auto_end_round),
            relay: Relay::new(config.reactions, &config.host_name, &config.host_avatar),
            shutdown: false,
            config,
            rendezvous,
            provider: Arc::new(provider),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn operator(&self) -> OperatorHandle {
        OperatorHandle {
            tx: self.server_tx.clone(),
        }
    }

    /// Address published in the rendezvous. A wildcard bind is published as
    /// loopback.
    fn advertised_addr(&self) -> SocketAddr {
        if self.local_addr.ip().is_unspecified() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.local_addr.port())
        } else {
            self.local_addr
        }
    }

    /// Spawns task that accepts incoming participant connections
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let server_tx = self.server_tx.clone();

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if server_tx
                            .send(ServerMessage::Accepted { stream, addr })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        });
        self.acceptor = Some(handle.abort_handle());
    }

    /// Registers a new connection and spawns its reader and writer tasks
    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<NetworkMessage>();
        let Some(conn) = self.connections.add_connection(addr, tx) else {
            // Dropping the stream closes it
            return;
        };

        let (read_half, mut write_half) = stream.into_split();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = write_frame(&mut write_half, &message).await {
                    warn!("Failed to write {} to connection {}: {}", message.kind(), conn, e);
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });

        let server_tx = self.server_tx.clone();
        let reader = tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            loop {
                let payload = match read_frame(&mut reader).await {
                    Ok(Some(payload)) => payload,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Connection {} read failed: {}", conn, e);
                        break;
                    }
                };

                let message = match decode(&payload) {
                    Ok(Decoded::Message(message)) => ServerMessage::MessageReceived { conn, message },
                    Ok(Decoded::Unknown { tag }) => ServerMessage::UnknownMessage { conn, tag },
                    Err(ProtocolError::Malformed(e)) => {
                        warn!("Skipping malformed frame from connection {}: {}", conn, e);
                        continue;
                    }
                    Err(e) => {
                        warn!("Connection {} decode failed: {}", conn, e);
                        break;
                    }
                };
                if server_tx.send(message).is_err() {
                    return;
                }
            }
            let _ = server_tx.send(ServerMessage::Disconnected { conn });
        });
        self.connections.attach_reader(conn, reader.abort_handle());
    }

    /// Delivers the effects of a state transition
    fn dispatch(&self, outbound: Vec<Outbound>) {
        for effect in outbound {
            match effect {
                Outbound::To { conn, message } => {
                    // send_to logs failures; one dead channel never stops the rest
                    let _ = self.connections.send_to(conn, message);
                }
                Outbound::Broadcast { message, exclude } => {
                    let delivered = self.connections.broadcast(&message, exclude);
                    debug!("{} broadcast to {} connections", message.kind(), delivered);
                }
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Accepted { stream, addr } => self.accept(stream, addr),
            ServerMessage::MessageReceived { conn, message } => {
                self.handle_network_message(conn, message)
            }
            ServerMessage::UnknownMessage { conn, tag } => {
                warn!("Ignoring unknown message kind {} from connection {}", tag, conn);
            }
            ServerMessage::Disconnected { conn } => self.disconnect(conn),
            ServerMessage::Operator(command) => self.handle_command(command),
            ServerMessage::ContentReady { ticket, result } => self.content_ready(ticket, result),
        }
    }

    fn handle_network_message(&mut self, conn: ConnectionId, message: NetworkMessage) {
        if !message.is_client_originated() {
            warn!("Unexpected {} from connection {}", message.kind(), conn);
            return;
        }
        let Some(peer_id) = self.connections.peer_id(conn).map(str::to_string) else {
            return;
        };

        match message {
            NetworkMessage::Join { name, avatar } => {
                let (outcome, outbound) = self.machine.join(conn, &peer_id, &name, &avatar);
                match outcome {
                    JoinOutcome::Admitted => {
                        self.connections.mark_joined(conn);
                    }
                    JoinOutcome::Rejoined => debug!("Repeated JOIN from {}", peer_id),
                    JoinOutcome::Ignored => debug!("JOIN from {} ignored", peer_id),
                }
                self.dispatch(outbound);
            }
            NetworkMessage::Answer { answer_index } => {
                let (outcome, outbound) = self.machine.answer(conn, answer_index);
                if outcome != AnswerOutcome::Accepted {
                    debug!("Answer from {} not recorded: {:?}", peer_id, outcome);
                }
                self.dispatch(outbound);
            }
            NetworkMessage::ChatMessage { message } => {
                if !self.connections.is_joined(conn) {
                    debug!("Chat from {} before JOIN dropped", peer_id);
                    return;
                }
                let sender = self
                    .machine
                    .session()
                    .and_then(|s| s.player_by_conn(conn))
                    .map(|p| (p.name.clone(), p.avatar.clone()));
                let outbound = self.relay.inbound_chat(
                    &peer_id,
                    sender.as_ref().map(|(n, a)| (n.as_str(), a.as_str())),
                    message,
                );
                self.dispatch(outbound.into_iter().collect());
            }
            NetworkMessage::Reaction { emoji, .. } => {
                if !self.connections.is_joined(conn) {
                    debug!("Reaction from {} before JOIN dropped", peer_id);
                    return;
                }
                let outbound = self
                    .relay
                    .inbound_reaction(conn, &peer_id, &emoji, Instant::now());
                self.dispatch(outbound.into_iter().collect());
            }
            other => warn!("Unhandled {} from connection {}", other.kind(), conn),
        }
    }

    /// Closes connections that never sent a JOIN in time
    fn reap_unjoined(&mut self, now: Instant) {
        for conn in self.connections.unjoined_past(now, self.config.join_deadline) {
            info!("Connection {} never joined, closing it", conn);
            self.disconnect(conn);
        }
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        self.connections.remove_connection(conn);
        let (_, outbound) = self.machine.leave(conn);
        self.dispatch(outbound);
    }

    /// Starts content generation off the event loop
    fn generate(&mut self, topic: Option<String>) {
        let ticket = match self.machine.begin_loading() {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        let request = ContentRequest {
            topic: topic.unwrap_or_else(|| self.config.topic.clone()),
            difficulty: self.config.difficulty,
            count: self.config.questions,
            language: self.config.language,
        };
        let provider = Arc::clone(&self.provider);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let result = provider.generate(request).await;
            let _ = server_tx.send(ServerMessage::ContentReady { ticket, result });
        });
    }

    fn content_ready(&mut self, ticket: u64, result: Result<ContentBundle, SessionError>) {
        if !self.machine.is_pending(ticket) {
            debug!("Discarding content for stale request {}", ticket);
            return;
        }

        let bundle = match result {
            Ok(bundle) => bundle,
            Err(e) => {
                error!("{}", e);
                println!("{}", e.user_message(self.config.language));
                self.machine.content_failed(ticket);
                return;
            }
        };

        let room = match create_room(self.rendezvous.as_ref(), self.advertised_addr(), RoomCode::generate) {
            Ok(room) => room,
            Err(e) => {
                error!("{}", e);
                println!("{}", e.user_message(self.config.language));
                self.machine.content_failed(ticket);
                return;
            }
        };

        match self.machine.open_lobby(ticket, room.clone(), bundle) {
            Ok(()) => {
                println!("Room {} is open: {}", room, room.join_link(&self.config.join_url));
            }
            Err(e) => {
                warn!("Could not open lobby: {}", e);
                self.rendezvous.unregister(&room.rendezvous_id());
            }
        }
    }

    fn snapshot(&self) -> HostSnapshot {
        self.machine.snapshot(self.relay.status())
    }

    /// Discards the session and every connection, unregistering the room
    fn close_session(&mut self) {
        if let Some(room) = self.machine.restart() {
            self.rendezvous.unregister(&room.rendezvous_id());
        }
        self.connections.clear();
        self.relay.clear();
    }

    fn handle_command(&mut self, command: OperatorCommand) {
        let result = match command {
            OperatorCommand::Generate(topic) => {
                self.generate(topic);
                Ok(Vec::new())
            }
            OperatorCommand::Abort => self.machine.abort_loading().map(|()| Vec::new()),
            OperatorCommand::Start => self.machine.start(),
            OperatorCommand::Skip => self.machine.skip(),
            OperatorCommand::Leaderboard => self.machine.show_leaderboard(),
            OperatorCommand::Next => self.machine.next(),
            OperatorCommand::Kick(query) => {
                let conn = self
                    .machine
                    .find_player(&query)
                    .or_else(|| query.parse::<ConnectionId>().ok());
                match conn {
                    Some(conn) => {
                        info!("Kicking connection {}", conn);
                        self.disconnect(conn);
                    }
                    None => println!("No player '{}'", query),
                }
                Ok(Vec::new())
            }
            OperatorCommand::Say(text) => Ok(self.relay.host_chat(&text).into_iter().collect()),
            OperatorCommand::Delete(id) => Ok(vec![self.relay.delete(&id)]),
            OperatorCommand::Reactions(allowed) => {
                self.relay.set_reactions_allowed(allowed);
                Ok(Vec::new())
            }
            OperatorCommand::Status => {
                print!("{}", render_status(&self.snapshot(), &self.config.join_url));
                Ok(Vec::new())
            }
            OperatorCommand::Chat => {
                print!("{}", render_chat(self.relay.log()));
                Ok(Vec::new())
            }
            OperatorCommand::Restart => {
                self.close_session();
                Ok(Vec::new())
            }
            OperatorCommand::Quit => {
                self.shutdown = true;
                Ok(Vec::new())
            }
            OperatorCommand::Help => {
                println!("{}", HELP);
                Ok(Vec::new())
            }
            OperatorCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
                Ok(Vec::new())
            }
        };

        match result {
            Ok(outbound) => self.dispatch(outbound),
            Err(e) => {
                warn!("Operator command rejected: {}", e);
                println!("{}", e);
            }
        }
    }

    /// Main host loop
    ///
    /// Runs until the operator quits. The round clock is realigned every
    /// time a round starts so each round gets its full first second.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        self.spawn_acceptor();

        let mut round_clock = interval(self.config.tick_duration);
        round_clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Host started");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message),
                        None => break,
                    }
                },

                _ = round_clock.tick() => {
                    let outbound = self.machine.tick();
                    self.dispatch(outbound);
                    let now = Instant::now();
                    self.relay.expire_reactions(now);
                    self.reap_unjoined(now);
                },
            }

            if self.machine.take_round_started() {
                round_clock.reset();
            }
            if self.shutdown {
                break;
            }
        }

        info!("Host shutting down");
        self.close_session();
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        Ok(())
    }
}
