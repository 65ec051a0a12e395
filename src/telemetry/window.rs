use std::collections::VecDeque;

use super::types::TelemetryFrame;

pub const DEFAULT_WINDOW_SECONDS: f64 = 60.0;

/// Time-ordered buffer holding the most recent `span` seconds of frames.
///
/// Frames must arrive with non-decreasing `t`; a frame older than the newest
/// one is dropped so that eviction stays a prefix removal.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    frames: VecDeque<TelemetryFrame>,
    span: f64,
}

impl TelemetryWindow {
    pub fn new(span: f64) -> Self {
        Self {
            frames: VecDeque::new(),
            span,
        }
    }

    /// Append a frame. Returns false if it was out of order and dropped.
    pub fn push(&mut self, frame: TelemetryFrame) -> bool {
        if let Some(last) = self.frames.back() {
            if frame.t < last.t {
                log::warn!("Dropping out-of-order frame t={} (newest t={})", frame.t, last.t);
                return false;
            }
        }
        self.frames.push_back(frame);
        true
    }

    /// Remove every frame with `t < now - span` from the front; returns how many
    pub fn evict(&mut self, now: f64) -> usize {
        let cutoff = now - self.span;
        let mut removed = 0;
        while self.frames.front().is_some_and(|f| f.t < cutoff) {
            self.frames.pop_front();
            removed += 1;
        }
        removed
    }

    /// Current contents, oldest first
    pub fn snapshot(&self) -> Vec<TelemetryFrame> {
        self.frames.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&TelemetryFrame> {
        self.frames.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetryFrame> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for TelemetryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECONDS)
    }
}
