use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub pushover: PushoverConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Hypervisor container id of the VPN gateway.
    pub container: String,
    /// wg-quick conf to read friendly peer names from.
    pub names_path: Option<String>,
    /// A peer counts as connected while its last handshake is strictly
    /// younger than this.
    #[serde(default = "default_threshold")]
    pub threshold_secs: u64,
}

fn default_threshold() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PushoverConfig {
    pub token: Option<String>,
    pub user: Option<String>,
    /// Short system label shown in notification titles.
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> String {
    "/var/lib/wgwatch/ledger".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut cfg: Config = toml::from_str(&content)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Credentials may come from the environment instead of the file.
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("WGWATCH_PUSHOVER_TOKEN") {
            self.pushover.token = Some(token);
        }
        if let Ok(user) = std::env::var("WGWATCH_PUSHOVER_USER") {
            self.pushover.user = Some(user);
        }
    }

    pub fn credentials(&self) -> Result<(String, String), ConfigError> {
        match (&self.pushover.token, &self.pushover.user) {
            (Some(token), Some(user)) => Ok((token.clone(), user.clone())),
            _ => Err(ConfigError::MissingCredentials),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("pushover credentials missing (set [pushover] token/user or WGWATCH_PUSHOVER_TOKEN/_USER)")]
    MissingCredentials,
}
