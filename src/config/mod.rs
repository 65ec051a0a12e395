pub mod cli;

pub use cli::Cli;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::confirmation::{ConfirmationPolicy, MatchMode};
use crate::serial::interface::DEFAULT_BAUD_RATE;
use crate::serial::lines::DEFAULT_MAX_LINE_LEN;
use crate::telemetry::DEFAULT_WINDOW_SECONDS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub session: SessionConfig,
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// None picks the first USB serial port found
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// The controller resets when the port opens
    pub settle_delay_ms: u64,
    pub max_line_len: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            settle_delay_ms: 2000,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tick_interval_ms: u64,
    pub window_seconds: f64,
    pub stop_retry_limit: u32,
    pub max_reads_per_tick: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            window_seconds: DEFAULT_WINDOW_SECONDS,
            stop_retry_limit: 20,
            max_reads_per_tick: 32,
        }
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub confirmation_policy: ConfirmationPolicy,
    pub affirmative_words: Vec<String>,
    pub affirmative_match: MatchMode,
    pub trigger_word: Option<String>,
    pub trigger_scan_words: usize,
    pub capture_attempts: u32,
    /// Program and arguments that record one utterance and print its text
    pub transcribe_command: Vec<String>,
    /// Program and arguments that speak the text appended as last argument
    pub speak_command: Vec<String>,
    pub extractor: ExtractorConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            confirmation_policy: ConfirmationPolicy::default(),
            affirmative_words: vec!["yes".to_string()],
            affirmative_match: MatchMode::default(),
            trigger_word: None,
            trigger_scan_words: 20,
            capture_attempts: 3,
            transcribe_command: Vec::new(),
            speak_command: Vec::new(),
            extractor: ExtractorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub enabled: bool,
    pub program: String,
    pub model: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "ollama".to_string(),
            model: "phi4".to_string(),
        }
    }
}

impl AppConfig {
    /// Load a JSON config file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be positive".into()));
        }
        if self.session.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("session.tick_interval_ms must be positive".into()));
        }
        if !(self.session.window_seconds > 0.0 && self.session.window_seconds.is_finite()) {
            return Err(ConfigError::Invalid("session.window_seconds must be a positive number".into()));
        }
        if self.voice.affirmative_words.iter().all(|w| w.trim().is_empty()) {
            return Err(ConfigError::Invalid("voice.affirmative_words must not be empty".into()));
        }
        if self.voice.enabled && self.voice.transcribe_command.is_empty() {
            return Err(ConfigError::Invalid(
                "voice.transcribe_command is required when voice is enabled".into(),
            ));
        }
        Ok(())
    }
}
