use crate::reconcile::PeerId;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Maps a peer id to a human-friendly label. Never fails: an unknown peer
/// resolves to its raw id.
pub trait NameResolver {
    fn label_for(&self, peer: &PeerId) -> String;
}

/// Friendly names read out of a wg-quick configuration file: the nearest
/// non-empty `#` comment above a `PublicKey =` assignment labels that key.
/// Blank lines clear the pending comment; section headers do not, so both
///
/// ```text
/// # Alice's laptop
/// [Peer]
/// PublicKey = abc...
/// ```
///
/// and the comment-inside-section layout work.
pub struct WgConfNames {
    labels: HashMap<PeerId, String>,
}

impl WgConfNames {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self {
                labels: parse_names(&content),
            },
            Err(e) => {
                warn!("Cannot read names file {}: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    pub fn empty() -> Self {
        Self {
            labels: HashMap::new(),
        }
    }
}

impl NameResolver for WgConfNames {
    fn label_for(&self, peer: &PeerId) -> String {
        self.labels
            .get(peer)
            .cloned()
            .unwrap_or_else(|| peer.as_str().to_string())
    }
}

fn parse_names(content: &str) -> HashMap<PeerId, String> {
    let mut labels = HashMap::new();
    let mut pending: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            pending = None;
            continue;
        }
        if line.starts_with('[') {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            let comment = comment.trim();
            if !comment.is_empty() {
                pending = Some(comment.to_string());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim().eq_ignore_ascii_case("publickey") {
                if let Some(label) = pending.take() {
                    labels.insert(PeerId::from(value.trim()), label);
                }
            }
        }
    }

    labels
}
