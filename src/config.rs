use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{AuthMode, Credentials};

const CONFIG_FILE: &str = "jiffy_config.json";
const APP_DIR: &str = "jiffy_client_rs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_username")]
    pub username: String,

    /// Only checked by the loopback backend.
    #[serde(default = "default_password")]
    pub password: String,

    /// Create the account on next start instead of logging in. Cleared once
    /// registration succeeds.
    #[serde(default)]
    pub register: bool,

    /// Profile text sent with a registration.
    #[serde(default)]
    pub bio: String,

    #[serde(default)]
    pub settings: Settings,

    #[serde(skip)]
    pub config_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,

    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    #[serde(default = "default_pending_echo_timeout_secs")]
    pub pending_echo_timeout_secs: u64,

    #[serde(default = "default_near_bottom_rows")]
    pub near_bottom_rows: usize,

    #[serde(default = "default_loopback_latency_ms")]
    pub loopback_latency_ms: u64,

    #[serde(default = "default_true")]
    pub show_timestamps: bool,

    #[serde(default = "default_true")]
    pub show_borders: bool,

    #[serde(default = "default_true")]
    pub show_chat_list: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retention_cap: default_retention_cap(),
            frame_interval_ms: default_frame_interval_ms(),
            pending_echo_timeout_secs: default_pending_echo_timeout_secs(),
            near_bottom_rows: default_near_bottom_rows(),
            loopback_latency_ms: default_loopback_latency_ms(),
            show_timestamps: true,
            show_borders: true,
            show_chat_list: true,
        }
    }
}

impl Settings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn loopback_latency(&self) -> Duration {
        Duration::from_millis(self.loopback_latency_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_username() -> String {
    "@me".to_string()
}

fn default_password() -> String {
    "loopback".to_string()
}

fn default_retention_cap() -> usize {
    500
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_pending_echo_timeout_secs() -> u64 {
    30
}

fn default_near_bottom_rows() -> usize {
    2
}

fn default_loopback_latency_ms() -> u64 {
    120
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Self::get_config_dir())
    }

    /// Read `jiffy_config.json` from `config_dir`, creating it with defaults
    /// when absent.
    pub fn load_from(config_dir: PathBuf) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let mut config: Config = serde_json::from_str(&content)?;
            config.config_dir = config_dir;
            Ok(config)
        } else {
            crate::info_log!("config: creating {}", config_path.display());
            Self::create_new(config_dir)
        }
    }

    pub fn auth_mode(&self) -> AuthMode {
        if self.register {
            AuthMode::Register
        } else {
            AuthMode::Login
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            bio: self.bio.clone(),
        }
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self)?;
        fs::write(self.config_path(), content)?;
        Ok(())
    }

    fn create_new(config_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&config_dir)?;
        let config = Config {
            username: default_username(),
            password: default_password(),
            register: false,
            bio: String::new(),
            settings: Settings::default(),
            config_dir,
        };
        config.save()?;
        Ok(config)
    }

    fn get_config_dir() -> PathBuf {
        // First check current directory
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        if current_dir.join(CONFIG_FILE).exists() {
            return current_dir;
        }

        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir).join(APP_DIR)
        } else {
            Self::default_app_dir()
        }
    }

    /// `~/.config/jiffy_client_rs`, also home of the debug log.
    pub fn default_app_dir() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(".config").join(APP_DIR),
            None => PathBuf::from(format!(".{}", APP_DIR)),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn log_path(dir: &Path) -> PathBuf {
        dir.join("debug.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "jiffy_config_test_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"username": "@dana"}"#).unwrap();
        assert_eq!(config.username, "@dana");
        assert_eq!(config.password, "loopback");
        assert_eq!(config.settings.retention_cap, 500);
        assert_eq!(config.settings.frame_interval(), Duration::from_millis(16));
        assert_eq!(config.settings.pending_echo_timeout_secs, 30);
        assert!(config.settings.show_chat_list);
        assert_eq!(config.auth_mode(), AuthMode::Login);
        assert!(config.credentials().bio.is_empty());
    }

    #[test]
    fn test_register_flag_selects_registration() {
        let config: Config = serde_json::from_str(
            r#"{"username": "@dana", "password": "pw", "register": true, "bio": "hi there"}"#,
        )
        .unwrap();
        assert_eq!(config.auth_mode(), AuthMode::Register);
        let credentials = config.credentials();
        assert_eq!(credentials.username, "@dana");
        assert_eq!(credentials.bio, "hi there");
    }

    #[test]
    fn test_partial_settings() {
        let config: Config =
            serde_json::from_str(r#"{"settings": {"retention_cap": 50, "show_borders": false}}"#)
                .unwrap();
        assert_eq!(config.settings.retention_cap, 50);
        assert!(!config.settings.show_borders);
        assert_eq!(config.settings.near_bottom_rows, 2);
    }

    #[test]
    fn test_load_creates_then_reads_back() {
        let dir = scratch_dir("roundtrip");
        let mut config = Config::load_from(dir.clone()).unwrap();
        assert!(dir.join(CONFIG_FILE).exists());

        config.settings.loopback_latency_ms = 5;
        config.save().unwrap();

        let reloaded = Config::load_from(dir.clone()).unwrap();
        assert_eq!(reloaded.settings.loopback_latency(), Duration::from_millis(5));
        assert_eq!(reloaded.config_dir, dir);
        let _ = fs::remove_dir_all(&dir);
    }
}
