//! Single-flight background worker for blocking voice work.
//!
//! Each job runs on tokio's blocking pool and reports back exactly one
//! [`VoiceEvent`] tagged with the owning session id. Only one job may run at a
//! time; a second request is rejected with [`VoiceError::Busy`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{contains_trigger, CommandExtractor, Result, Speaker, SpeechRecognizer, VoiceError};

#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub trigger_word: Option<String>,
    pub trigger_scan_words: usize,
    pub capture_attempts: u32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            trigger_word: None,
            trigger_scan_words: 20,
            capture_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceJob {
    /// Listen for a spoken command and extract its settings
    Command,
    /// Speak `prompt`, then capture the yes/no answer
    Confirm { prompt: String },
    /// Speak a status line; nothing is reported back
    Announce { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// `text` is the extractor output, or the transcript when extraction was
    /// unavailable
    CommandText {
        session_id: Uuid,
        transcript: String,
        text: String,
    },
    NoCommand {
        session_id: Uuid,
    },
    /// `None` when no answer could be captured
    ConfirmationResponse {
        session_id: Uuid,
        response: Option<String>,
    },
    Failed {
        session_id: Uuid,
        message: String,
    },
}

impl VoiceEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            VoiceEvent::CommandText { session_id, .. }
            | VoiceEvent::NoCommand { session_id }
            | VoiceEvent::ConfirmationResponse { session_id, .. }
            | VoiceEvent::Failed { session_id, .. } => *session_id,
        }
    }
}

fn lock_or_recover<'a, T: ?Sized>(lock: &'a Mutex<Box<T>>, context: &str) -> MutexGuard<'a, Box<T>> {
    lock.lock().unwrap_or_else(|poisoned| {
        log::warn!("Mutex poisoned in {}; recovering", context);
        poisoned.into_inner()
    })
}

/// Clears the in-flight flag when the job ends, however it ends
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
struct JobContext {
    session_id: Uuid,
    recognizer: Arc<Mutex<Box<dyn SpeechRecognizer>>>,
    speaker: Option<Arc<Mutex<Box<dyn Speaker>>>>,
    extractor: Option<Arc<dyn CommandExtractor>>,
    settings: VoiceSettings,
    closed: Arc<AtomicBool>,
}

pub struct VoiceWorker {
    ctx: JobContext,
    in_flight: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<VoiceEvent>,
}

impl VoiceWorker {
    /// Create a worker for one session together with the receiver the
    /// session's control loop drains
    pub fn new(
        session_id: Uuid,
        recognizer: Box<dyn SpeechRecognizer>,
        speaker: Option<Box<dyn Speaker>>,
        extractor: Option<Arc<dyn CommandExtractor>>,
        settings: VoiceSettings,
    ) -> (Self, mpsc::UnboundedReceiver<VoiceEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let worker = Self {
            ctx: JobContext {
                session_id,
                recognizer: Arc::new(Mutex::new(recognizer)),
                speaker: speaker.map(|s| Arc::new(Mutex::new(s))),
                extractor,
                settings,
                closed: Arc::new(AtomicBool::new(false)),
            },
            in_flight: Arc::new(AtomicBool::new(false)),
            events,
        };
        (worker, rx)
    }

    pub fn session_id(&self) -> Uuid {
        self.ctx.session_id
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Mark the session closed. A job still running finishes its blocking call
    /// but performs no further side effects and reports nothing.
    pub fn close(&self) {
        self.ctx.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.ctx.closed.load(Ordering::Acquire)
    }

    /// Start `job` on the blocking pool. Must be called from within a tokio runtime.
    pub fn start(&self, job: VoiceJob) -> Result<()> {
        if self.is_closed() {
            return Err(VoiceError::SessionClosed);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VoiceError::Busy);
        }

        let guard = InFlightGuard(self.in_flight.clone());
        let ctx = self.ctx.clone();
        let events = self.events.clone();

        tokio::task::spawn_blocking(move || {
            let event = run_job(&ctx, job);
            // release before reporting so the receiver may start a follow-up job
            drop(guard);

            let Some(event) = event else { return };
            if ctx.closed.load(Ordering::Acquire) {
                log::debug!("Discarding voice result after session close: {:?}", event);
                return;
            }
            if events.send(event).is_err() {
                log::debug!("Voice result dropped; session receiver gone");
            }
        });
        Ok(())
    }
}

fn run_job(ctx: &JobContext, job: VoiceJob) -> Option<VoiceEvent> {
    match job {
        VoiceJob::Command => Some(listen_for_command(ctx)),
        VoiceJob::Confirm { prompt } => Some(ask_confirmation(ctx, &prompt)),
        VoiceJob::Announce { text } => {
            speak(ctx, &text);
            None
        }
    }
}

fn speak(ctx: &JobContext, text: &str) {
    if ctx.closed.load(Ordering::Acquire) {
        return;
    }
    log::info!("{}", text);
    if let Some(speaker) = &ctx.speaker {
        let mut speaker = lock_or_recover(speaker, "speaker");
        if let Err(e) = speaker.speak(text) {
            log::warn!("Speaker {} failed: {:#}", speaker.name(), e);
        }
    }
}

fn listen_for_command(ctx: &JobContext) -> VoiceEvent {
    let session_id = ctx.session_id;
    let attempts = ctx.settings.capture_attempts.max(1);

    let mut accepted = None;
    for attempt in 1..=attempts {
        if ctx.closed.load(Ordering::Acquire) {
            break;
        }
        let transcript = {
            let mut recognizer = lock_or_recover(&ctx.recognizer, "recognizer");
            match recognizer.capture_and_transcribe() {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    return VoiceEvent::Failed {
                        session_id,
                        message: format!("speech capture failed: {:#}", e),
                    }
                }
            }
        };

        if transcript.is_empty() {
            log::debug!("Capture attempt {}/{}: no speech", attempt, attempts);
            continue;
        }
        match &ctx.settings.trigger_word {
            Some(trigger) if !contains_trigger(&transcript, trigger, ctx.settings.trigger_scan_words) => {
                log::info!("No trigger phrase detected in {:?} ({}/{})", transcript, attempt, attempts);
            }
            _ => {
                accepted = Some(transcript);
                break;
            }
        }
    }

    let Some(transcript) = accepted else {
        return VoiceEvent::NoCommand { session_id };
    };
    log::info!("Voice command recognized: {}", transcript);

    let text = match &ctx.extractor {
        Some(extractor) => match extractor.extract_command(&transcript) {
            Ok(output) if !output.trim().is_empty() => output.trim().to_string(),
            Ok(_) => {
                log::warn!("Extractor {} returned nothing; parsing transcript", extractor.name());
                transcript.clone()
            }
            Err(e) => {
                log::warn!("Extractor {} failed: {:#}; parsing transcript", extractor.name(), e);
                transcript.clone()
            }
        },
        None => transcript.clone(),
    };

    VoiceEvent::CommandText {
        session_id,
        transcript,
        text,
    }
}

fn ask_confirmation(ctx: &JobContext, prompt: &str) -> VoiceEvent {
    speak(ctx, prompt);

    let response = if ctx.closed.load(Ordering::Acquire) {
        None
    } else {
        let mut recognizer = lock_or_recover(&ctx.recognizer, "recognizer");
        match recognizer.capture_and_transcribe() {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("Confirmation capture failed: {:#}", e);
                None
            }
        }
    };

    VoiceEvent::ConfirmationResponse {
        session_id: ctx.session_id,
        response,
    }
}
