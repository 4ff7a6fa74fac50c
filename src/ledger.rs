use crate::reconcile::PeerId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::warn;

/// The durable connectivity state: which peers counted as connected at the
/// end of the previous cycle, and when each peer was last seen. Replaced
/// wholesale every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ledger {
    pub connected: BTreeSet<PeerId>,
    pub last_handshake: BTreeMap<PeerId, u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Loads and persists the ledger as newline-delimited `kind:peer:value`
/// records. Saves go through a temp file renamed into place so a crash
/// mid-write never exposes a truncated ledger.
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing file is a cold start, not an error.
    pub fn load(&self) -> Result<Ledger, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Ledger::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_ledger(&content))
    }

    pub fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let mut tmp: OsString = self.path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serialize_ledger(ledger))?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn parse_ledger(content: &str) -> Ledger {
    let mut ledger = Ledger::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(3, ':');
        match (fields.next(), fields.next(), fields.next()) {
            (Some("connected"), Some(peer), Some("1")) if !peer.is_empty() => {
                ledger.connected.insert(PeerId::from(peer));
            }
            (Some("handshake"), Some(peer), Some(value)) if !peer.is_empty() => {
                match value.parse::<u64>() {
                    Ok(ts) => {
                        ledger.last_handshake.insert(PeerId::from(peer), ts);
                    }
                    Err(_) => warn!("Skipping ledger record with bad timestamp: {}", line),
                }
            }
            _ => warn!("Skipping malformed ledger record: {}", line),
        }
    }
    ledger
}

fn serialize_ledger(ledger: &Ledger) -> String {
    let mut out = String::new();
    for peer in &ledger.connected {
        out.push_str(&format!("connected:{}:1\n", peer));
    }
    for (peer, ts) in &ledger.last_handshake {
        out.push_str(&format!("handshake:{}:{}\n", peer, ts));
    }
    out
}
