//! Room identity and rendezvous
//!
//! A room is identified by a six digit code. Prefixed with a fixed namespace
//! it becomes the rendezvous id under which the host registers its listening
//! address, and which clients resolve to find it. Registration is the only
//! place a collision can occur, so room creation retries with a fresh code a
//! bounded number of times.

use crate::error::SessionError;
use log::{info, warn};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Namespace every rendezvous id starts with
pub const RENDEZVOUS_PREFIX: &str = "quiz-party-room-";

/// Query parameter carrying the rendezvous id in a join link
pub const JOIN_LINK_PARAM: &str = "gameId";

/// Registration attempts before room creation gives up
pub const MAX_ROOM_ATTEMPTS: u32 = 3;

const CODE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Draws a random code in 100000..=999999
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        RoomCode(rng.gen_range(100_000..=999_999u32).to_string())
    }

    /// Accepts a bare code (`123456`), a grouped code (`123 456`), a full
    /// rendezvous id or a join link
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();

        let candidate = match input.find(&format!("{}=", JOIN_LINK_PARAM)) {
            Some(pos) => {
                let value = &input[pos + JOIN_LINK_PARAM.len() + 1..];
                value.split('&').next().unwrap_or_default()
            }
            None => input,
        };
        let candidate = candidate.strip_prefix(RENDEZVOUS_PREFIX).unwrap_or(candidate);

        let digits: String = candidate.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.len() == CODE_LEN && digits.chars().all(|c| c.is_ascii_digit()) {
            Some(RoomCode(digits))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn rendezvous_id(&self) -> String {
        format!("{}{}", RENDEZVOUS_PREFIX, self.0)
    }

    /// Shareable link: base URL (any existing query dropped) with the
    /// rendezvous id as its single query parameter
    pub fn join_link(&self, base_url: &str) -> String {
        let base = base_url.split('?').next().unwrap_or(base_url);
        format!("{}?{}={}", base, JOIN_LINK_PARAM, self.rendezvous_id())
    }
}

/// Displays the code as two groups of three digits
impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = self.0.split_at(CODE_LEN / 2);
        write!(f, "{} {}", head, tail)
    }
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("rendezvous id is already taken")]
    Taken,
    #[error("rendezvous registry unavailable: {0}")]
    Io(#[from] io::Error),
}

/// Directory of live rooms shared by hosts and clients
pub trait Rendezvous: Send + Sync {
    fn register(&self, rendezvous_id: &str, addr: SocketAddr) -> Result<(), RegisterError>;
    fn resolve(&self, rendezvous_id: &str) -> Option<SocketAddr>;
    fn unregister(&self, rendezvous_id: &str);
}

/// Registers the host under a fresh room code, retrying on collision.
///
/// `next_code` supplies candidate codes so callers can control generation;
/// production passes [`RoomCode::generate`].
pub fn create_room<F>(
    rendezvous: &dyn Rendezvous,
    addr: SocketAddr,
    mut next_code: F,
) -> Result<RoomCode, SessionError>
where
    F: FnMut() -> RoomCode,
{
    for attempt in 1..=MAX_ROOM_ATTEMPTS {
        let code = next_code();
        match rendezvous.register(&code.rendezvous_id(), addr) {
            Ok(()) => {
                info!("Room {} registered for {} (attempt {})", code, addr, attempt);
                return Ok(code);
            }
            Err(RegisterError::Taken) => {
                warn!("Room code {} already taken (attempt {})", code, attempt);
            }
            Err(RegisterError::Io(e)) => return Err(SessionError::Io(e)),
        }
    }

    Err(SessionError::RoomCreationFailure {
        attempts: MAX_ROOM_ATTEMPTS,
    })
}

/// In-process registry, cloned handles share the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryRendezvous {
    rooms: Arc<Mutex<HashMap<String, SocketAddr>>>,
}

impl MemoryRendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().map(|rooms| rooms.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Rendezvous for MemoryRendezvous {
    fn register(&self, rendezvous_id: &str, addr: SocketAddr) -> Result<(), RegisterError> {
        let mut rooms = self
            .rooms
            .lock()
            .map_err(|_| io::Error::other("rendezvous lock poisoned"))?;
        if rooms.contains_key(rendezvous_id) {
            return Err(RegisterError::Taken);
        }
        rooms.insert(rendezvous_id.to_string(), addr);
        Ok(())
    }

    fn resolve(&self, rendezvous_id: &str) -> Option<SocketAddr> {
        self.rooms.lock().ok()?.get(rendezvous_id).copied()
    }

    fn unregister(&self, rendezvous_id: &str) {
        if let Ok(mut rooms) = self.rooms.lock() {
            rooms.remove(rendezvous_id);
        }
    }
}

/// File-per-room registry in a directory shared by processes on one machine
#[derive(Debug, Clone)]
pub struct DirRendezvous {
    dir: PathBuf,
}

impl DirRendezvous {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry(&self, rendezvous_id: &str) -> Option<PathBuf> {
        let valid = !rendezvous_id.is_empty()
            && rendezvous_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        valid.then(|| self.dir.join(rendezvous_id))
    }
}

impl Rendezvous for DirRendezvous {
    fn register(&self, rendezvous_id: &str, addr: SocketAddr) -> Result<(), RegisterError> {
        let path = self.entry(rendezvous_id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "invalid rendezvous id")
        })?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(RegisterError::Taken),
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", addr)?;
        Ok(())
    }

    fn resolve(&self, rendezvous_id: &str) -> Option<SocketAddr> {
        let path = self.entry(rendezvous_id)?;
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    fn unregister(&self, rendezvous_id: &str) {
        if let Some(path) = self.entry(rendezvous_id) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove rendezvous entry {:?}: {}", path, e);
                }
            }
        }
    }
}
