use crate::reconcile::{HandshakeRecord, PeerId};
use std::process::Command;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to execute backend command: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend command exited with {status}: {stderr}")]
    CommandFailed {
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Lists peers with their last-handshake unix timestamps. An empty snapshot
/// is a valid result and distinct from failure.
pub trait HandshakeSource {
    fn snapshot(&self) -> Result<Vec<HandshakeRecord>, BackendError>;
}

/// Queries the gateway container through the hypervisor CLI:
/// `pct exec <ctid> -- wg show all latest-handshakes`.
pub struct PctSource {
    container: String,
}

impl PctSource {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }
}

impl HandshakeSource for PctSource {
    fn snapshot(&self) -> Result<Vec<HandshakeRecord>, BackendError> {
        let output = Command::new("pct")
            .args(["exec", &self.container, "--"])
            .args(["wg", "show", "all", "latest-handshakes"])
            .output()?;

        if !output.status.success() {
            return Err(BackendError::CommandFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_snapshot(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Each line is `<interface> <peerId> <unixSeconds>`; anything else is
/// discarded here so the reconciler only ever sees well-formed records.
pub fn parse_snapshot(text: &str) -> Vec<HandshakeRecord> {
    let mut records = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(_iface), Some(peer), Some(ts), None) => match ts.parse::<u64>() {
                Ok(last_handshake) => records.push(HandshakeRecord {
                    peer: PeerId::from(peer),
                    last_handshake,
                }),
                Err(_) => warn!("Discarding poll line with bad timestamp: {}", line),
            },
            _ => warn!("Discarding malformed poll line: {}", line),
        }
    }
    records
}
