pub mod parser;

pub use parser::CommandParser;

use std::fmt;

use serde::{Deserialize, Serialize};

/// A validated instruction for the controller.
///
/// `duration_seconds == None` means run until the next command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    pub rpm: u32,
    pub duration_seconds: Option<u32>,
}

impl Command {
    pub fn new(rpm: u32, duration_seconds: Option<u32>) -> Self {
        Self { rpm, duration_seconds }
    }

    /// The degenerate command that halts the rotor
    pub fn stop() -> Self {
        Self::new(0, None)
    }

    pub fn is_stop(&self) -> bool {
        self.rpm == 0 && self.duration_seconds.is_none()
    }

    /// Build a command from the two fields of the manual entry form.
    /// A blank duration field means no countdown.
    pub fn from_fields(rpm_text: &str, duration_text: &str) -> Result<Self> {
        let rpm_text = rpm_text.trim();
        let duration_text = duration_text.trim();

        if rpm_text.is_empty() {
            return Err(CommandError::Empty);
        }
        let rpm = rpm_text.parse::<u32>().map_err(|_| CommandError::Field {
            field: "rpm",
            value: rpm_text.to_string(),
        })?;

        let duration_seconds = if duration_text.is_empty() {
            None
        } else {
            Some(duration_text.parse::<u32>().map_err(|_| CommandError::Field {
                field: "duration",
                value: duration_text.to_string(),
            })?)
        };

        Ok(Self::new(rpm, duration_seconds))
    }
}

/// Wire body without the line terminator: `<rpm>` or `<rpm>,<duration>`
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration_seconds {
            Some(duration) => write!(f, "{},{}", self.rpm, duration),
            None => write!(f, "{}", self.rpm),
        }
    }
}

/// Where a command's text came from. Only voice input is subject to spoken confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandSource {
    Typed,
    Manual,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("No RPM value found in {0:?}")]
    NoRpm(String),

    #[error("Invalid {field} value: {value:?}")]
    Field { field: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, CommandError>;
