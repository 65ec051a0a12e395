#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use centrifuge_control_lib::serial::{SerialError, SerialPortIO};
use centrifuge_control_lib::session::{DisplaySink, NoticeKind, SessionNotice};
use centrifuge_control_lib::telemetry::TelemetryFrame;

#[derive(Default)]
struct PortState {
    incoming: VecDeque<Vec<u8>>,
    written: Vec<String>,
    failing_writes: u32,
    failing_reads: u32,
}

/// In-memory stand-in for the controller's serial port. Clones share state so
/// a test can keep a handle after the port moves into a session.
#[derive(Clone, Default)]
pub struct ScriptedPort {
    state: Arc<Mutex<PortState>>,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as one read chunk
    pub fn feed(&self, bytes: &[u8]) {
        self.state.lock().unwrap().incoming.push_back(bytes.to_vec());
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().unwrap().failing_writes = count;
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.state.lock().unwrap().failing_reads = count;
    }

    pub fn written(&self) -> Vec<String> {
        self.state.lock().unwrap().written.clone()
    }
}

#[async_trait]
impl SerialPortIO for ScriptedPort {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize, SerialError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        state.written.push(String::from_utf8_lossy(data).into_owned());
        Ok(data.len())
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "scripted read failure",
            )));
        }
        let Some(mut chunk) = state.incoming.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            state.incoming.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    async fn flush(&mut self) -> Result<(), SerialError> {
        Ok(())
    }
}

#[derive(Default)]
struct DisplayState {
    notices: Vec<NoticeKind>,
    renders: usize,
    last_frames: usize,
    last_remaining: Option<Duration>,
}

/// Display sink that remembers everything it was shown
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    state: Arc<Mutex<DisplayState>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<NoticeKind> {
        self.state.lock().unwrap().notices.clone()
    }

    pub fn renders(&self) -> usize {
        self.state.lock().unwrap().renders
    }

    pub fn last_frames(&self) -> usize {
        self.state.lock().unwrap().last_frames
    }

    pub fn last_remaining(&self) -> Option<Duration> {
        self.state.lock().unwrap().last_remaining
    }
}

impl DisplaySink for RecordingDisplay {
    fn render(&mut self, frames: &[TelemetryFrame], remaining: Option<Duration>) {
        let mut state = self.state.lock().unwrap();
        state.renders += 1;
        state.last_frames = frames.len();
        state.last_remaining = remaining;
    }

    fn notify(&mut self, notice: &SessionNotice) {
        self.state.lock().unwrap().notices.push(notice.kind.clone());
    }
}

pub const FRAME_LINE: &str = "RPM: 1498.6 MA: 1500.2 Set: 1500.0 PWM: 128 %Err: -0.09\n";
