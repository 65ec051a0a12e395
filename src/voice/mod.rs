//! Voice input: speech capture, spoken prompts and natural-language command
//! extraction, all run off the control loop.

pub mod process;
pub mod worker;

pub use process::{ExtractorProcess, RecognizerProcess, SpeakerProcess};
pub use worker::{VoiceEvent, VoiceJob, VoiceSettings, VoiceWorker};

use crate::confirmation::normalize_words;

/// Records one utterance and returns its transcription. Blocking; may return
/// an empty string when nothing was said.
pub trait SpeechRecognizer: Send {
    fn capture_and_transcribe(&mut self) -> anyhow::Result<String>;
    fn name(&self) -> &str;
}

/// Speaks a prompt aloud. Blocking until playback ends.
pub trait Speaker: Send {
    fn speak(&mut self, text: &str) -> anyhow::Result<()>;
    fn name(&self) -> &str;
}

/// Rewrites free speech into `<RPM> <TIME>` text. The output is only ever
/// re-parsed as text, never trusted as a command.
pub trait CommandExtractor: Send + Sync {
    fn extract_command(&self, free_text: &str) -> anyhow::Result<String>;
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("Voice input is not configured")]
    Disabled,

    #[error("A voice job is already running")]
    Busy,

    #[error("Session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, VoiceError>;

/// True if `trigger` occurs as a word among the first `scan_words` words of
/// `text`, ignoring case and surrounding punctuation
pub fn contains_trigger(text: &str, trigger: &str, scan_words: usize) -> bool {
    let trigger = trigger.trim().to_lowercase();
    if trigger.is_empty() {
        return true;
    }
    normalize_words(text)
        .iter()
        .take(scan_words)
        .any(|word| *word == trigger)
}
