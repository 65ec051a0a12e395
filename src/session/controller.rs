use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::command::{Command, CommandParser, CommandSource};
use crate::confirmation::{confirmation_prompt, ConfirmationFlow, Resolution};
use crate::countdown::{CountdownStatus, CountdownTimer, StopRetry};
use crate::serial::{ControllerProtocol, SerialPortIO};
use crate::telemetry::{FrameDecoder, TelemetryWindow};
use crate::voice::{VoiceError, VoiceEvent, VoiceJob, VoiceWorker};

use super::{DisplaySink, NoticeKind, Result, SessionError, SessionNotice, SessionSettings, SessionSummary};

const CONFIRMED_ANNOUNCEMENT: &str = "Command confirmed. Sending command.";
const ABORTED_ANNOUNCEMENT: &str = "Command aborted.";

/// Result of one pass of the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub frames_decoded: usize,
    pub frames_rejected: usize,
    pub frames_evicted: usize,
    pub countdown: CountdownStatus,
    pub stop_sent: bool,
}

impl Default for TickReport {
    fn default() -> Self {
        Self {
            frames_decoded: 0,
            frames_rejected: 0,
            frames_evicted: 0,
            countdown: CountdownStatus::Idle,
            stop_sent: false,
        }
    }
}

/// What became of an operator or voice input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Sent(Command),
    AwaitingConfirmation(Command),
    Cancelled,
    /// Nothing to act on (stale voice result, no command heard, ...)
    Ignored,
}

#[derive(Debug, Default)]
struct SessionStats {
    frames_decoded: u64,
    frames_rejected: u64,
    commands_sent: u64,
    stops_sent: u64,
    stops_abandoned: u64,
}

/// Owns all state of one run: the telemetry window, the countdown, the
/// pending confirmation and the only write handle to the controller.
pub struct SessionController<T: SerialPortIO> {
    id: Uuid,
    started: Instant,
    started_at: DateTime<Utc>,
    protocol: ControllerProtocol<T>,
    window: TelemetryWindow,
    timer: CountdownTimer,
    pending_stop: Option<StopRetry>,
    confirmation: ConfirmationFlow,
    settings: SessionSettings,
    display: Box<dyn DisplaySink>,
    voice: Option<VoiceWorker>,
    read_fault: bool,
    stats: SessionStats,
}

impl<T: SerialPortIO> SessionController<T> {
    pub fn new(
        protocol: ControllerProtocol<T>,
        settings: SessionSettings,
        display: Box<dyn DisplaySink>,
        now: Instant,
    ) -> Self {
        let id = Uuid::new_v4();
        log::info!("Session {} created", id);
        Self {
            id,
            started: now,
            started_at: Utc::now(),
            protocol,
            window: TelemetryWindow::new(settings.window_seconds),
            timer: CountdownTimer::new(),
            pending_stop: None,
            confirmation: ConfirmationFlow::new(settings.affirmative.clone()),
            settings,
            display,
            voice: None,
            read_fault: false,
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Attach the voice worker built for this session's id
    pub fn attach_voice(&mut self, worker: VoiceWorker) {
        if worker.session_id() != self.id {
            log::warn!(
                "Voice worker belongs to session {}, not {}; its results will be discarded",
                worker.session_id(),
                self.id
            );
        }
        self.voice = Some(worker);
    }

    pub fn window(&self) -> &TelemetryWindow {
        &self.window
    }

    pub fn timer(&self) -> &CountdownTimer {
        &self.timer
    }

    pub fn confirmation(&self) -> &ConfirmationFlow {
        &self.confirmation
    }

    pub fn stop_pending(&self) -> bool {
        self.pending_stop.is_some()
    }

    /// True from the first failed read until bytes arrive again
    pub fn read_fault(&self) -> bool {
        self.read_fault
    }

    /// Seconds since the session started; the time base of every frame
    pub fn session_time(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.started).as_secs_f64()
    }

    /// Read, decode, evict, advance the countdown, then render
    pub async fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        let t = self.session_time(now);

        let poll = self.protocol.poll_lines(self.settings.max_reads_per_tick).await;
        for line in &poll.lines {
            match FrameDecoder::decode(line, t) {
                Ok(frame) => {
                    if self.window.push(frame) {
                        report.frames_decoded += 1;
                    }
                }
                Err(e) => {
                    log::debug!("Skipping line {:?}: {}", line, e);
                    report.frames_rejected += 1;
                }
            }
        }
        match poll.error {
            Some(e) if !self.read_fault => {
                self.read_fault = true;
                log::error!("Serial read failed: {}", e);
                self.notify(NoticeKind::TransportError { error: e.to_string() });
            }
            Some(e) => log::debug!("Serial read still failing: {}", e),
            None if self.read_fault && poll.bytes_read > 0 => {
                self.read_fault = false;
                log::info!("Serial reads recovered");
            }
            None => {}
        }
        self.stats.frames_decoded += report.frames_decoded as u64;
        self.stats.frames_rejected += report.frames_rejected as u64;

        report.frames_evicted = self.window.evict(t);

        report.countdown = self.timer.tick(now);
        if report.countdown == CountdownStatus::Expired {
            log::info!("Countdown expired, sending stop");
            self.notify(NoticeKind::CountdownExpired);
            self.pending_stop = Some(StopRetry::new(self.settings.stop_retry_limit));
        }
        report.stop_sent = self.flush_pending_stop().await;

        let frames = self.window.snapshot();
        self.display.render(&frames, self.timer.remaining(now));
        report
    }

    /// One attempt at delivering an owed stop. Returns true once it went out.
    async fn flush_pending_stop(&mut self) -> bool {
        let Some(retry) = self.pending_stop.as_mut() else {
            return false;
        };
        if !retry.begin_attempt() {
            self.pending_stop = None;
            return false;
        }
        let attempt = retry.attempts();
        let exhausted = retry.exhausted();

        match self.protocol.send_command(&Command::stop()).await {
            Ok(()) => {
                self.pending_stop = None;
                self.stats.commands_sent += 1;
                self.stats.stops_sent += 1;
                self.notify(NoticeKind::StopSent);
                true
            }
            Err(e) => {
                log::error!("Stop attempt {} failed: {}", attempt, e);
                self.notify(NoticeKind::StopFailed {
                    attempt,
                    error: e.to_string(),
                });
                if exhausted {
                    log::error!("Giving up on stop after {} attempts", attempt);
                    self.pending_stop = None;
                    self.stats.stops_abandoned += 1;
                    self.notify(NoticeKind::StopAbandoned { attempts: attempt });
                }
                false
            }
        }
    }

    /// Write `command` and, once written, arm or clear the countdown to match.
    /// On a failed write the countdown is left as it was.
    pub async fn submit(&mut self, command: Command, source: CommandSource, now: Instant) -> Result<()> {
        if let Err(e) = self.protocol.send_command(&command).await {
            log::error!("Failed to send {}: {}", command, e);
            self.notify(NoticeKind::TransportError { error: e.to_string() });
            return Err(e.into());
        }

        self.stats.commands_sent += 1;
        if command.is_stop() {
            self.stats.stops_sent += 1;
        }
        // a newer command supersedes a stop still owed from an expiry
        self.pending_stop = None;
        match command.duration_seconds {
            Some(seconds) => self.timer.arm(seconds, now),
            None => self.timer.disarm(),
        }
        self.notify(NoticeKind::CommandSent { command, source });
        Ok(())
    }

    /// Parse free text and send it, or hold it for confirmation when it came
    /// from voice and the policy asks for one
    pub async fn handle_text(&mut self, text: &str, source: CommandSource, now: Instant) -> Result<Outcome> {
        let command = match CommandParser::parse(text) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("Rejected command text {:?}: {}", text, e);
                self.notify(NoticeKind::InvalidCommand {
                    text: text.to_string(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        if source == CommandSource::Voice && self.settings.confirmation_policy.requires_confirmation(&command) {
            return self.request_confirmation(command);
        }

        self.submit(command, source, now).await?;
        Ok(Outcome::Sent(command))
    }

    /// Manual form entry: separate RPM and duration fields
    pub async fn handle_manual(&mut self, rpm_text: &str, duration_text: &str, now: Instant) -> Result<Outcome> {
        let command = match Command::from_fields(rpm_text, duration_text) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("Rejected manual entry {:?}/{:?}: {}", rpm_text, duration_text, e);
                self.notify(NoticeKind::InvalidCommand {
                    text: format!("{} {}", rpm_text.trim(), duration_text.trim()),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };
        self.submit(command, CommandSource::Manual, now).await?;
        Ok(Outcome::Sent(command))
    }

    fn request_confirmation(&mut self, command: Command) -> Result<Outcome> {
        if !self.confirmation.begin_confirmation(command) {
            return Err(SessionError::ConfirmationPending);
        }

        let started = match &self.voice {
            Some(worker) => worker.start(VoiceJob::Confirm {
                prompt: confirmation_prompt(&command),
            }),
            None => Err(VoiceError::Disabled),
        };
        if let Err(e) = started {
            log::warn!("Cannot ask for confirmation of {}: {}", command, e);
            self.confirmation.cancel();
            self.notify(NoticeKind::ConfirmationCancelled);
            return Err(e.into());
        }

        self.notify(NoticeKind::AwaitingConfirmation { command });
        Ok(Outcome::AwaitingConfirmation(command))
    }

    /// Start listening for a spoken command in the background
    pub fn request_voice_command(&mut self) -> Result<()> {
        if self.confirmation.is_awaiting() {
            return Err(SessionError::ConfirmationPending);
        }
        let Some(worker) = &self.voice else {
            return Err(VoiceError::Disabled.into());
        };

        match worker.start(VoiceJob::Command) {
            Ok(()) => {
                self.notify(NoticeKind::Listening);
                Ok(())
            }
            Err(VoiceError::Busy) => {
                self.notify(NoticeKind::VoiceBusy);
                Err(VoiceError::Busy.into())
            }
            Err(VoiceError::SessionClosed) => Err(SessionError::Closed),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply the result of a background voice job
    pub async fn handle_voice_event(&mut self, event: VoiceEvent, now: Instant) -> Result<Outcome> {
        if event.session_id() != self.id {
            log::warn!("Discarding voice result from session {}", event.session_id());
            return Ok(Outcome::Ignored);
        }

        match event {
            VoiceEvent::CommandText { transcript, text, .. } => {
                log::info!("Voice command {:?} -> {:?}", transcript, text);
                self.handle_text(&text, CommandSource::Voice, now).await
            }
            VoiceEvent::NoCommand { .. } => {
                self.notify(NoticeKind::NoVoiceCommand);
                Ok(Outcome::Ignored)
            }
            VoiceEvent::Failed { message, .. } => {
                log::error!("Voice job failed: {}", message);
                self.notify(NoticeKind::VoiceFailed { error: message });
                Ok(Outcome::Ignored)
            }
            VoiceEvent::ConfirmationResponse { response, .. } => {
                let resolution = match response {
                    Some(text) => {
                        log::info!("Confirmation response: {:?}", text);
                        self.confirmation.resolve(&text)
                    }
                    None => match self.confirmation.cancel() {
                        Some(_) => Resolution::Cancelled,
                        None => Resolution::NotAwaiting,
                    },
                };

                match resolution {
                    Resolution::Dispatch(command) => {
                        self.announce(CONFIRMED_ANNOUNCEMENT);
                        self.submit(command, CommandSource::Voice, now).await?;
                        Ok(Outcome::Sent(command))
                    }
                    Resolution::Cancelled => {
                        self.announce(ABORTED_ANNOUNCEMENT);
                        self.notify(NoticeKind::ConfirmationCancelled);
                        Ok(Outcome::Cancelled)
                    }
                    Resolution::NotAwaiting => Ok(Outcome::Ignored),
                }
            }
        }
    }

    fn announce(&self, text: &str) {
        if let Some(worker) = &self.voice {
            if let Err(e) = worker.start(VoiceJob::Announce { text: text.to_string() }) {
                log::debug!("Skipped announcement {:?}: {}", text, e);
            }
        }
    }

    fn notify(&mut self, kind: NoticeKind) {
        let notice = SessionNotice { at: Utc::now(), kind };
        self.display.notify(&notice);
    }

    /// End the run. A countdown still armed, or a stop still owed, gets one
    /// last stop write so the rotor is not left running unsupervised.
    pub async fn close(mut self, now: Instant) -> SessionSummary {
        if let Some(worker) = &self.voice {
            worker.close();
        }
        if self.confirmation.cancel().is_some() {
            log::info!("Dropping unconfirmed command at session close");
        }

        if self.timer.is_armed() || self.pending_stop.is_some() {
            self.timer.disarm();
            match self.protocol.send_command(&Command::stop()).await {
                Ok(()) => {
                    self.pending_stop = None;
                    self.stats.commands_sent += 1;
                    self.stats.stops_sent += 1;
                }
                Err(e) => {
                    log::error!("Final stop at session close failed: {}", e);
                    self.stats.stops_abandoned += 1;
                }
            }
        }

        let stats = self.protocol.assembler_stats();
        if stats.utf8_decode_errors > 0 || stats.partial_buffer_trims > 0 {
            log::info!(
                "Line assembly: {} lines, {} UTF-8 errors, {} overlong lines trimmed",
                stats.lines,
                stats.utf8_decode_errors,
                stats.partial_buffer_trims
            );
        }

        let summary = SessionSummary {
            session_id: self.id,
            started_at: self.started_at,
            duration_secs: self.session_time(now),
            frames_decoded: self.stats.frames_decoded,
            frames_rejected: self.stats.frames_rejected,
            commands_sent: self.stats.commands_sent,
            stops_sent: self.stats.stops_sent,
            stops_abandoned: self.stats.stops_abandoned,
        };
        log::info!(
            "Session {} closed after {:.1}s: {} frames, {} commands, {} stops",
            summary.session_id,
            summary.duration_secs,
            summary.frames_decoded,
            summary.commands_sent,
            summary.stops_sent
        );
        summary
    }
}
