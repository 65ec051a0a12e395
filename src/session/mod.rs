pub mod controller;
pub mod display;
pub mod runner;

pub use controller::{Outcome, SessionController, TickReport};
pub use display::ConsoleDisplay;
pub use runner::{run_session, spawn_console_reader, OperatorInput};

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::command::{Command, CommandError, CommandSource};
use crate::confirmation::{AffirmativeMatcher, ConfirmationPolicy};
use crate::config::AppConfig;
use crate::serial::SerialError;
use crate::telemetry::TelemetryFrame;
use crate::voice::VoiceError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] SerialError),

    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] CommandError),

    #[error("Voice error: {0}")]
    Voice(#[from] VoiceError),

    #[error("A confirmation is already pending")]
    ConfirmationPending,

    #[error("Session closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Something the operator should be told about
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionNotice {
    pub at: DateTime<Utc>,
    pub kind: NoticeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoticeKind {
    CommandSent { command: Command, source: CommandSource },
    InvalidCommand { text: String, reason: String },
    TransportError { error: String },
    CountdownExpired,
    StopSent,
    StopFailed { attempt: u32, error: String },
    StopAbandoned { attempts: u32 },
    AwaitingConfirmation { command: Command },
    ConfirmationCancelled,
    Listening,
    VoiceBusy,
    NoVoiceCommand,
    VoiceFailed { error: String },
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeKind::CommandSent { command, source } => write!(f, "Sent {} ({:?})", command, source),
            NoticeKind::InvalidCommand { text, reason } => write!(f, "Invalid command {:?}: {}", text, reason),
            NoticeKind::TransportError { error } => write!(f, "Serial error: {}", error),
            NoticeKind::CountdownExpired => write!(f, "Countdown finished, stopping"),
            NoticeKind::StopSent => write!(f, "Stop command sent"),
            NoticeKind::StopFailed { attempt, error } => {
                write!(f, "Stop attempt {} failed: {} (retrying)", attempt, error)
            }
            NoticeKind::StopAbandoned { attempts } => {
                write!(f, "STOP NOT DELIVERED after {} attempts; stop the rotor manually", attempts)
            }
            NoticeKind::AwaitingConfirmation { command } => write!(f, "Awaiting confirmation for {}", command),
            NoticeKind::ConfirmationCancelled => write!(f, "Command aborted"),
            NoticeKind::Listening => write!(f, "Listening for a voice command"),
            NoticeKind::VoiceBusy => write!(f, "Voice input is busy"),
            NoticeKind::NoVoiceCommand => write!(f, "No voice command detected"),
            NoticeKind::VoiceFailed { error } => write!(f, "Voice input failed: {}", error),
        }
    }
}

/// Read-only consumer of session state, called from the control loop.
pub trait DisplaySink: Send {
    /// Called once per tick with the current window and countdown
    fn render(&mut self, frames: &[TelemetryFrame], remaining: Option<Duration>);

    fn notify(&mut self, notice: &SessionNotice);
}

/// What is left of a session once it is closed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub commands_sent: u64,
    pub stops_sent: u64,
    pub stops_abandoned: u64,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub window_seconds: f64,
    pub stop_retry_limit: u32,
    pub max_reads_per_tick: usize,
    pub confirmation_policy: ConfirmationPolicy,
    pub affirmative: AffirmativeMatcher,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            window_seconds: config.session.window_seconds,
            stop_retry_limit: config.session.stop_retry_limit,
            max_reads_per_tick: config.session.max_reads_per_tick,
            confirmation_policy: config.voice.confirmation_policy,
            affirmative: AffirmativeMatcher::new(&config.voice.affirmative_words, config.voice.affirmative_match),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            window_seconds: crate::telemetry::DEFAULT_WINDOW_SECONDS,
            stop_retry_limit: 20,
            max_reads_per_tick: 32,
            confirmation_policy: ConfirmationPolicy::default(),
            affirmative: AffirmativeMatcher::default(),
        }
    }
}
