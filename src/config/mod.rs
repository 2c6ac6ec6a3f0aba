use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub riot: RiotConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DiscordConfig {
    /// Bot token - loaded from env DISCORD_TOKEN, never from file
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiotConfig {
    /// API key - loaded from env RIOT_API_KEY, never from file
    #[serde(default)]
    pub api_key: String,
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Path of the persisted tracking database
    #[serde(default = "default_db_file")]
    pub db_file: String,
    /// How often to poll tracked players for newly started matches
    #[serde(default = "default_new_game_poll")]
    pub new_game_poll_secs: u64,
    /// How often to poll in-flight matches for results
    #[serde(default = "default_finished_poll")]
    pub finished_poll_secs: u64,
    /// How often to drain one queued command
    #[serde(default = "default_command_drain")]
    pub command_drain_secs: u64,
    /// Pause between per-player API calls inside a new-game cycle
    #[serde(default = "default_new_game_pause")]
    pub new_game_call_pause_secs: u64,
    /// Pause between per-match API calls inside a finished-game cycle
    #[serde(default = "default_finished_pause")]
    pub finished_call_pause_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_request_timeout() -> u64 {
    10
}
fn default_db_file() -> String {
    "db.json".to_string()
}
fn default_new_game_poll() -> u64 {
    60
}
fn default_finished_poll() -> u64 {
    180
}
fn default_command_drain() -> u64 {
    1
}
fn default_new_game_pause() -> u64 {
    2
}
fn default_finished_pause() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RiotConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            db_file: default_db_file(),
            new_game_poll_secs: default_new_game_poll(),
            finished_poll_secs: default_finished_poll(),
            command_drain_secs: default_command_drain(),
            new_game_call_pause_secs: default_new_game_pause(),
            finished_call_pause_secs: default_finished_pause(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.overlay_env();
        Ok(config)
    }

    /// Default config with env-only secrets (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config {
            discord: DiscordConfig::default(),
            riot: RiotConfig::default(),
            tracker: TrackerConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.overlay_env();
        config
    }

    // Secrets never live in the config file.
    fn overlay_env(&mut self) {
        if let Ok(token) = std::env::var("DISCORD_TOKEN") {
            self.discord.token = token;
        }
        if let Ok(key) = std::env::var("RIOT_API_KEY") {
            self.riot.api_key = key;
        }
    }

    /// Both secrets are required; the process refuses to start without them.
    pub fn ensure_secrets(&self) -> Result<(), ConfigError> {
        if self.discord.token.is_empty() {
            return Err(ConfigError::MissingEnv("DISCORD_TOKEN".to_string()));
        }
        if self.riot.api_key.is_empty() {
            return Err(ConfigError::MissingEnv("RIOT_API_KEY".to_string()));
        }
        Ok(())
    }
}
