pub mod decoder;
pub mod types;
pub mod window;

pub use decoder::FrameDecoder;
pub use types::TelemetryFrame;
pub use window::{TelemetryWindow, DEFAULT_WINDOW_SECONDS};

/// Why a serial line was not accepted as a frame. Both reasons mean the same
/// thing to callers (skip the line); the split exists for diagnostics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Structure(String),

    #[error("Malformed frame: {field} value {value:?} is not a number")]
    Numeric { field: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
