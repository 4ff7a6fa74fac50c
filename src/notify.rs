use crate::reconcile::{Transition, TransitionEvent};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Pushover truncates long titles; keep the label well under the limit.
pub const MAX_LABEL_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("push endpoint returned {0}")]
    Rejected(reqwest::StatusCode),
}

/// Delivers a titled message, retrying a bounded number of times. Delivery
/// is best-effort; callers log failures and carry on.
#[async_trait]
pub trait Notifier {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

pub struct PushoverNotifier {
    client: reqwest::Client,
    token: String,
    user: String,
}

impl PushoverNotifier {
    pub fn new(token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            user: user.into(),
        }
    }

    async fn post(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(PUSHOVER_URL)
            .form(&[
                ("token", self.token.as_str()),
                ("user", self.user.as_str()),
                ("title", title),
                ("message", body),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.post(title, body).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "Push delivery attempt {}/{} failed: {}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Builds the (title, body) pair for one transition. The title carries a
/// directional glyph and the system label, the body the display name and a
/// human-formatted elapsed duration.
pub fn event_message(event: &TransitionEvent, display_name: &str, label: &str) -> (String, String) {
    let (glyph, verb, since) = match event.kind {
        Transition::Connected => ("🟢", "connected", "handshake"),
        Transition::Disconnected => ("🔴", "disconnected", "last seen"),
    };

    let label = truncate_label(label);
    let title = if label.is_empty() {
        format!("{} VPN {}", glyph, verb)
    } else {
        format!("{} VPN {} [{}]", glyph, verb, label)
    };
    let body = format!(
        "{} {} ({} {} ago)",
        display_name,
        verb,
        since,
        format_elapsed(event.elapsed_secs)
    );
    (title, body)
}

pub fn truncate_label(label: &str) -> String {
    label.chars().take(MAX_LABEL_LEN).collect()
}

pub fn format_elapsed(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    }
}
