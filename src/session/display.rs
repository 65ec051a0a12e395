use std::io::{self, Write};
use std::time::{Duration, Instant};

use super::{DisplaySink, NoticeKind, SessionNotice};
use crate::telemetry::TelemetryFrame;

/// Operator console on stdout. Telemetry is redrawn at most once per
/// `interval`; notices are printed as they happen.
pub struct ConsoleDisplay<W: Write + Send = io::Stdout> {
    out: W,
    interval: Duration,
    last_render: Option<Instant>,
}

impl ConsoleDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), Duration::from_secs(1))
    }
}

impl<W: Write + Send> ConsoleDisplay<W> {
    pub fn new(out: W, interval: Duration) -> Self {
        Self {
            out,
            interval,
            last_render: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            log::warn!("Console write failed: {}", e);
        }
    }
}

fn remaining_line(remaining: Option<Duration>) -> String {
    match remaining {
        Some(left) => format!("Remaining Time: {} s", left.as_secs_f64().ceil() as u64),
        None => "Remaining Time: -".to_string(),
    }
}

fn frame_line(frame: &TelemetryFrame, window_len: usize) -> String {
    format!(
        "RPM: {:.0}  MA: {:.0}  Set: {:.0}  PWM: {}  Err: {:.1}%  ({} samples)",
        frame.rpm, frame.moving_average_rpm, frame.setpoint_rpm, frame.pwm, frame.percent_error, window_len
    )
}

impl<W: Write + Send> DisplaySink for ConsoleDisplay<W> {
    fn render(&mut self, frames: &[TelemetryFrame], remaining: Option<Duration>) {
        let now = Instant::now();
        if let Some(last) = self.last_render {
            if now.duration_since(last) < self.interval {
                return;
            }
        }
        self.last_render = Some(now);

        let line = match frames.last() {
            Some(frame) => format!("{} | {}", frame_line(frame, frames.len()), remaining_line(remaining)),
            None => format!("No telemetry | {}", remaining_line(remaining)),
        };
        self.write_line(&line);
    }

    fn notify(&mut self, notice: &SessionNotice) {
        let prefix = match notice.kind {
            NoticeKind::StopAbandoned { .. } => "!!",
            NoticeKind::TransportError { .. } | NoticeKind::StopFailed { .. } | NoticeKind::VoiceFailed { .. } => "!",
            _ => ">",
        };
        let line = format!("[{}] {} {}", notice.at.format("%H:%M:%S"), prefix, notice.kind);
        self.write_line(&line);
    }
}
