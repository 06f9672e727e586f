//! Connection bookkeeping for the quiz host
//!
//! This module tracks every open participant channel on the host side:
//! - Connection lifecycle (accept, join, close, kick)
//! - The outbound queue feeding each connection's writer task
//! - Capacity limits enforced at accept time
//! - Fan-out of broadcasts to joined participants
//!
//! The manager never blocks. Each connection owns an unbounded queue that a
//! dedicated writer task drains onto the socket, so a slow participant can
//! only ever delay its own messages.

use log::{debug, info, warn};
use rand::Rng;
use shared::{NetworkMessage, PeerId, SessionError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Host-local handle for one transport connection
pub type ConnectionId = u32;

/// One open channel to a participant
///
/// Each connection carries:
/// - Its host-local id and the peer id announced to the participant
/// - The queue its writer task drains
/// - Whether the participant has completed a JOIN
#[derive(Debug)]
pub struct Connection {
    /// Host-local identifier, never reused within a process
    pub id: ConnectionId,
    /// Peer identity sent back in WELCOME
    pub peer_id: PeerId,
    /// Remote socket address, for logging
    pub addr: SocketAddr,
    /// When the transport was accepted
    pub connected_at: Instant,
    /// Set once a JOIN has been accepted on this connection
    pub joined: bool,
    sender: mpsc::UnboundedSender<NetworkMessage>,
    reader: Option<AbortHandle>,
}

impl Connection {
    /// Creates a connection record around an outbound queue
    pub fn new(
        id: ConnectionId,
        peer_id: PeerId,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<NetworkMessage>,
    ) -> Self {
        Self {
            id,
            peer_id,
            addr,
            connected_at: Instant::now(),
            joined: false,
            sender,
            reader: None,
        }
    }

    /// Queues a message for this connection's writer task
    ///
    /// Fails only when the writer has already shut down, which means the
    /// transport is gone and the connection is about to be reaped.
    pub fn send(&self, message: NetworkMessage) -> Result<(), SessionError> {
        let kind = message.kind();
        self.sender.send(message).map_err(|_| SessionError::SendFailure {
            peer: self.peer_id.clone(),
            kind,
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Makes a short random peer identity, e.g. `p-3f9a0c12`
pub fn new_peer_id() -> PeerId {
    let suffix: u32 = rand::thread_rng().gen();
    format!("p-{:08x}", suffix)
}

/// Manages every open participant connection
///
/// The ConnectionManager owns the outbound side of each channel, enforces
/// the participant limit and decides who receives a broadcast. Removing a
/// connection drops its queue, which lets the writer flush and close the
/// socket, and aborts its reader task.
pub struct ConnectionManager {
    /// Open connections indexed by id
    connections: HashMap<ConnectionId, Connection>,
    /// Next id handed out at accept
    next_connection_id: ConnectionId,
    /// Maximum concurrent connections
    max_connections: usize,
}

impl ConnectionManager {
    /// Creates an empty manager with the given capacity
    ///
    /// Connection ids start from 1 and increase for every accepted socket.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
            max_connections,
        }
    }

    /// Registers a freshly accepted transport
    ///
    /// Returns the new id, or None when the host is full. The caller owns
    /// the receiving half of `sender` and must spawn the writer for it.
    pub fn add_connection(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<NetworkMessage>,
    ) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            warn!(
                "Refusing connection from {}: {} connections open",
                addr,
                self.connections.len()
            );
            return None;
        }

        let id = self.next_connection_id;
        self.next_connection_id += 1;

        let mut peer_id = new_peer_id();
        while self.connections.values().any(|c| c.peer_id == peer_id) {
            peer_id = new_peer_id();
        }

        info!("Connection {} ({}) opened from {}", id, peer_id, addr);
        self.connections
            .insert(id, Connection::new(id, peer_id, addr, sender));
        Some(id)
    }

    /// Attaches the reader task so removal can stop it
    pub fn attach_reader(&mut self, id: ConnectionId, reader: AbortHandle) {
        match self.connections.get_mut(&id) {
            Some(connection) => connection.reader = Some(reader),
            None => reader.abort(),
        }
    }

    /// Marks a connection as a joined participant, making it eligible for
    /// broadcasts
    pub fn mark_joined(&mut self, id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => {
                connection.joined = true;
                true
            }
            None => false,
        }
    }

    pub fn is_joined(&self, id: ConnectionId) -> bool {
        self.connections.get(&id).is_some_and(|c| c.joined)
    }

    /// Forgets a connection, closing its channel
    ///
    /// Returns false if it was already gone. Used for transport closes and
    /// for operator kicks alike.
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        match self.connections.remove(&id) {
            Some(connection) => {
                info!(
                    "Connection {} ({}) closed after {:.1}s",
                    id,
                    connection.peer_id,
                    connection.connected_at.elapsed().as_secs_f32()
                );
                true
            }
            None => false,
        }
    }

    /// Closes every connection, e.g. on restart or shutdown
    pub fn clear(&mut self) {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            self.remove_connection(id);
        }
    }

    pub fn peer_id(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).map(|c| c.peer_id.as_str())
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Delivers to one connection
    ///
    /// Failures are logged and returned but never affect other connections.
    pub fn send_to(&self, id: ConnectionId, message: NetworkMessage) -> Result<(), SessionError> {
        let Some(connection) = self.connections.get(&id) else {
            debug!("Dropping {} for closed connection {}", message.kind(), id);
            return Err(SessionError::ConnectionLost);
        };

        connection.send(message).map_err(|e| {
            warn!("Send to connection {} failed: {}", id, e);
            e
        })
    }

    /// Delivers to every joined connection except `exclude`
    ///
    /// Returns how many queues accepted the message. A failed queue is
    /// logged and skipped.
    pub fn broadcast(&self, message: &NetworkMessage, exclude: Option<ConnectionId>) -> usize {
        let mut delivered = 0;
        for connection in self.connections.values() {
            if !connection.joined || Some(connection.id) == exclude {
                continue;
            }
            match connection.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Broadcast to connection {} failed: {}", connection.id, e),
            }
        }
        delivered
    }

    /// Connections that were accepted more than `max_wait` before `now`
    /// and still have not sent a JOIN
    pub fn unjoined_past(&self, now: Instant, max_wait: Duration) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| !c.joined && now.saturating_duration_since(c.connected_at) > max_wait)
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of open connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connection is open
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
