//! Configuration management
//!
//! The settings file is read once at startup, overridden from the
//! environment, validated, and then shared read-only behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default settings file name
pub const DEFAULT_CONFIG_PATH: &str = "settings.json";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Inconsistent settings: {}", .0.join("; "))]
    Inconsistent(Vec<String>),
}

/// Account authentication mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Offline,
    Microsoft,
    Mojang,
}

/// Account the agent logs in as
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,
    #[serde(rename = "type")]
    pub auth: AuthMode,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: "afkbot".to_string(),
            password: String::new(),
            auth: AuthMode::Offline,
        }
    }
}

/// Server address and protocol version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(rename = "ip")]
    pub host: String,
    pub port: u16,
    /// Protocol version string, empty for auto-detect
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25565,
            version: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoAuthConfig {
    pub enabled: bool,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChatMessagesConfig {
    pub enabled: bool,
    pub repeat: bool,
    /// Seconds between repeated messages
    pub repeat_delay: f64,
    pub messages: Vec<String>,
}

impl Default for ChatMessagesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repeat: false,
            repeat_delay: 60.0,
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HitConfig {
    pub enabled: bool,
    /// Milliseconds between hits, required when enabled
    pub delay: Option<f64>,
    pub attack_mobs: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleWalkConfig {
    pub enabled: bool,
    /// Required when enabled
    pub radius: Option<f64>,
}

/// Anti-idle behaviors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AntiAfkConfig {
    pub enabled: bool,
    pub sneak: bool,
    pub jump: bool,
    pub rotate: bool,
    pub hit: HitConfig,
    pub circle_walk: CircleWalkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UtilsConfig {
    pub auto_auth: AutoAuthConfig,
    pub chat_messages: ChatMessagesConfig,
    pub anti_afk: AntiAfkConfig,
    pub auto_reconnect: bool,
    /// Milliseconds to wait before reconnecting
    pub auto_reconnect_delay: f64,
}

impl Default for UtilsConfig {
    fn default() -> Self {
        Self {
            auto_auth: AutoAuthConfig::default(),
            chat_messages: ChatMessagesConfig::default(),
            anti_afk: AntiAfkConfig::default(),
            auto_reconnect: true,
            auto_reconnect_delay: 5000.0,
        }
    }
}

/// Where to walk after spawning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub enabled: bool,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl PositionConfig {
    /// Target block, if all three coordinates are set
    pub fn target(&self) -> Option<(f64, f64, f64)> {
        Some((self.x?, self.y?, self.z?))
    }
}

/// Bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "bot-account")]
    pub account: AccountConfig,
    pub server: ServerConfig,
    pub utils: UtilsConfig,
    pub position: PositionConfig,
}

impl Config {
    /// Read, override from the environment, and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a settings file without validating it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `AFKBOT_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = lookup("AFKBOT_USERNAME") {
            self.account.username = username;
        }

        if let Some(password) = lookup("AFKBOT_PASSWORD") {
            self.account.password = password;
        }

        if let Some(password) = lookup("AFKBOT_AUTH_PASSWORD") {
            self.utils.auto_auth.password = password;
        }

        if let Some(host) = lookup("AFKBOT_SERVER_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("AFKBOT_SERVER_PORT") {
            match port.parse() {
                Ok(parsed) => self.server.port = parsed,
                Err(_) => tracing::warn!("Ignoring invalid AFKBOT_SERVER_PORT: {}", port),
            }
        }
    }

    /// Reject behaviors that are enabled without what they need
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.account.username.trim().is_empty() {
            problems.push("bot-account.username is empty".to_string());
        }
        if self.server.host.trim().is_empty() {
            problems.push("server.ip is empty".to_string());
        }
        if self.server.port == 0 {
            problems.push("server.port must be non-zero".to_string());
        }

        let utils = &self.utils;
        if utils.auto_auth.enabled && utils.auto_auth.password.is_empty() {
            problems.push("auto-auth is enabled without a password".to_string());
        }

        let chat = &utils.chat_messages;
        if chat.enabled && chat.messages.is_empty() {
            problems.push("chat-messages is enabled without messages".to_string());
        }
        if chat.enabled && chat.repeat && !is_positive(chat.repeat_delay) {
            problems.push(
                "chat-messages.repeat-delay must be a positive number of seconds".to_string(),
            );
        }

        if utils.auto_reconnect
            && !(utils.auto_reconnect_delay.is_finite() && utils.auto_reconnect_delay >= 0.0)
        {
            problems.push(
                "auto-reconnect-delay must be a non-negative number of milliseconds".to_string(),
            );
        }

        let afk = &utils.anti_afk;
        if afk.enabled && afk.hit.enabled {
            match afk.hit.delay {
                None => problems.push("anti-afk.hit is enabled without a delay".to_string()),
                Some(delay) if !is_positive(delay) => problems
                    .push("anti-afk.hit.delay must be a positive number of milliseconds".to_string()),
                Some(_) => {}
            }
        }
        if afk.enabled && afk.circle_walk.enabled {
            match afk.circle_walk.radius {
                None => problems.push("anti-afk.circle-walk is enabled without a radius".to_string()),
                Some(radius) if !is_positive(radius) => problems
                    .push("anti-afk.circle-walk.radius must be a positive number".to_string()),
                Some(_) => {}
            }
        }

        let pos = &self.position;
        if pos.enabled {
            for (axis, value) in [("x", pos.x), ("y", pos.y), ("z", pos.z)] {
                match value {
                    None => problems.push(format!("position is enabled without {}", axis)),
                    Some(v) if !v.is_finite() => {
                        problems.push(format!("position.{} must be finite", axis))
                    }
                    Some(_) => {}
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Inconsistent(problems))
        }
    }

    /// Zero when the configured delay is unusable; `validate` rejects that
    pub fn reconnect_delay(&self) -> Duration {
        from_millis(self.utils.auto_reconnect_delay).unwrap_or_default()
    }

    pub fn chat_repeat_interval(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.utils.chat_messages.repeat_delay)
            .ok()
            .filter(|d| !d.is_zero())
    }

    pub fn hit_interval(&self) -> Option<Duration> {
        self.utils
            .anti_afk
            .hit
            .delay
            .and_then(from_millis)
            .filter(|d| !d.is_zero())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn from_millis(ms: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "bot-account": { "username": "Steve", "password": "", "type": "offline" },
        "server": { "ip": "play.example.net", "port": 25565, "version": "1.20.1" },
        "utils": {
            "auto-auth": { "enabled": true, "password": "hunter2" },
            "anti-afk": {
                "enabled": true,
                "sneak": true,
                "hit": { "enabled": true, "delay": 3000, "attack-mobs": true },
                "circle-walk": { "enabled": true, "radius": 3 }
            },
            "chat-messages": {
                "enabled": true,
                "repeat": true,
                "repeat-delay": 60,
                "messages": ["hello", "world"]
            },
            "auto-reconnect": true,
            "auto-reconnect-delay": 5000
        },
        "position": { "enabled": false, "x": 0, "y": 0, "z": 0 }
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.account.username, "Steve");
        assert_eq!(config.account.auth, AuthMode::Offline);
        assert_eq!(config.server.host, "play.example.net");
        assert_eq!(config.server.version, "1.20.1");
        assert!(config.utils.anti_afk.hit.attack_mobs);
        assert_eq!(config.utils.anti_afk.circle_walk.radius, Some(3.0));
        assert_eq!(config.hit_interval(), Some(Duration::from_secs(3)));
        assert_eq!(config.utils.chat_messages.messages, vec!["hello", "world"]);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(5000));
        assert_eq!(config.chat_repeat_interval(), Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = Config::from_json(r#"{ "server": { "ip": "mc.local" } }"#).unwrap();
        assert_eq!(config.server.port, 25565);
        assert!(!config.utils.anti_afk.enabled);
        assert!(config.utils.auto_reconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inconsistent_settings_report_every_problem() {
        let mut config = Config::default();
        config.utils.auto_auth.enabled = true;
        config.utils.chat_messages.enabled = true;
        config.utils.anti_afk.enabled = true;
        config.utils.anti_afk.circle_walk.enabled = true;
        config.utils.anti_afk.circle_walk.radius = Some(0.0);

        match config.validate() {
            Err(ConfigError::Inconsistent(problems)) => {
                assert_eq!(problems.len(), 3);
                assert!(problems.iter().any(|p| p.contains("auto-auth")));
                assert!(problems.iter().any(|p| p.contains("radius")));
            }
            other => panic!("expected inconsistency, got {:?}", other),
        }
    }

    #[test]
    fn test_disabled_behaviors_are_not_checked() {
        let mut config = Config::default();
        config.utils.anti_afk.circle_walk.enabled = true;
        config.utils.anti_afk.circle_walk.radius = Some(-1.0);
        config.utils.anti_afk.hit.enabled = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_behaviors_need_their_parameters() {
        let config = Config::from_json(
            r#"{
                "utils": {
                    "anti-afk": {
                        "enabled": true,
                        "hit": { "enabled": true },
                        "circle-walk": { "enabled": true }
                    }
                },
                "position": { "enabled": true }
            }"#,
        )
        .unwrap();
        assert_eq!(config.position.target(), None);
        assert_eq!(config.hit_interval(), None);

        match config.validate() {
            Err(ConfigError::Inconsistent(problems)) => {
                assert_eq!(problems.len(), 5, "{:?}", problems);
                assert!(problems.iter().any(|p| p.contains("without x")));
                assert!(problems.iter().any(|p| p.contains("without y")));
                assert!(problems.iter().any(|p| p.contains("without z")));
                assert!(problems.iter().any(|p| p.contains("without a delay")));
                assert!(problems.iter().any(|p| p.contains("without a radius")));
            }
            other => panic!("expected inconsistency, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_position_is_rejected() {
        let config =
            Config::from_json(r#"{ "position": { "enabled": true, "x": 4, "z": -2.5 } }"#).unwrap();
        match config.validate() {
            Err(ConfigError::Inconsistent(problems)) => {
                assert_eq!(problems, vec!["position is enabled without y".to_string()]);
            }
            other => panic!("expected inconsistency, got {:?}", other),
        }
    }

    #[test]
    fn test_fractional_delays() {
        let config = Config::from_json(
            r#"{
                "utils": {
                    "chat-messages": {
                        "enabled": true,
                        "repeat": true,
                        "repeat-delay": 1.5,
                        "messages": ["hi"]
                    },
                    "anti-afk": { "enabled": true, "hit": { "enabled": true, "delay": 312.5 } },
                    "auto-reconnect-delay": 2562.5
                }
            }"#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.chat_repeat_interval(), Some(Duration::from_millis(1500)));
        assert_eq!(config.hit_interval(), Some(Duration::from_micros(312_500)));
        assert_eq!(config.reconnect_delay(), Duration::from_micros(2_562_500));
    }

    #[test]
    fn test_unusable_delays_are_rejected() {
        let mut config = Config::default();
        config.utils.chat_messages.enabled = true;
        config.utils.chat_messages.repeat = true;
        config.utils.chat_messages.repeat_delay = 0.0;
        config.utils.chat_messages.messages = vec!["hi".into()];
        config.utils.auto_reconnect_delay = -5.0;
        config.utils.anti_afk.enabled = true;
        config.utils.anti_afk.hit.enabled = true;
        config.utils.anti_afk.hit.delay = Some(f64::NAN);

        match config.validate() {
            Err(ConfigError::Inconsistent(problems)) => {
                assert_eq!(problems.len(), 3, "{:?}", problems);
                assert!(problems.iter().any(|p| p.contains("repeat-delay")));
                assert!(problems.iter().any(|p| p.contains("auto-reconnect-delay")));
                assert!(problems.iter().any(|p| p.contains("hit.delay")));
            }
            other => panic!("expected inconsistency, got {:?}", other),
        }
        assert_eq!(config.chat_repeat_interval(), None);
        assert_eq!(config.hit_interval(), None);
        assert_eq!(config.reconnect_delay(), Duration::ZERO);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AFKBOT_USERNAME", "Alex"),
            ("AFKBOT_AUTH_PASSWORD", "s3cret"),
            ("AFKBOT_SERVER_PORT", "not-a-port"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.account.username, "Alex");
        assert_eq!(config.utils.auto_auth.password, "s3cret");
        assert_eq!(config.server.port, 25565);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.account.username, "Steve");

        let missing = Config::from_file("/nonexistent/settings.json");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
