//! Turns an arbitrary chunked byte stream into complete text lines.

pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub lines: u64,
    pub utf8_decode_errors: u64,
    pub partial_buffer_trims: u64,
}

/// Buffers raw serial bytes and yields whole lines.
///
/// Any of `\n`, `\r` or `\r\n` ends a line and blank lines are skipped. Bytes
/// that are not valid UTF-8 are dropped rather than replaced. An unterminated
/// line longer than `max_line_len` is discarded up to the next terminator.
pub struct LineAssembler {
    partial: Vec<u8>,
    max_line_len: usize,
    overflowed: bool,
    stats: AssemblerStats,
}

impl LineAssembler {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line_len: max_line_len.max(1),
            overflowed: false,
            stats: AssemblerStats::default(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if self.overflowed {
                    self.overflowed = false;
                    self.partial.clear();
                    continue;
                }
                if let Some(line) = self.take_line() {
                    lines.push(line);
                }
                continue;
            }

            if self.overflowed {
                continue;
            }

            if self.partial.len() >= self.max_line_len {
                log::warn!("Discarding unterminated serial line over {} bytes", self.max_line_len);
                self.partial.clear();
                self.overflowed = true;
                self.stats.partial_buffer_trims += 1;
                continue;
            }

            self.partial.push(byte);
        }

        lines
    }

    /// Bytes of the current unterminated line
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    pub fn stats(&self) -> &AssemblerStats {
        &self.stats
    }

    fn take_line(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.partial);
        let text = match String::from_utf8(raw) {
            Ok(text) => text,
            Err(err) => {
                self.stats.utf8_decode_errors += 1;
                strip_invalid_utf8(err.as_bytes())
            }
        };

        let line = text.trim();
        if line.is_empty() {
            return None;
        }
        self.stats.lines += 1;
        Some(line.to_string())
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

fn strip_invalid_utf8(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(err) => {
                let (valid, rest) = bytes.split_at(err.valid_up_to());
                // valid_up_to guarantees this prefix decodes
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = err.error_len().unwrap_or(rest.len());
                bytes = &rest[skip..];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_split_across_chunks() {
        let mut assembler = LineAssembler::default();
        assert!(assembler.push(b"RPM: 10").is_empty());
        assert_eq!(assembler.pending(), 7);
        let lines = assembler.push(b"0.0 MA: 1\nnext");
        assert_eq!(lines, vec!["RPM: 100.0 MA: 1".to_string()]);
        assert_eq!(assembler.pending(), 4);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut assembler = LineAssembler::default();
        let lines = assembler.push(b"a\r\n\r\n\nb\r");
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(assembler.stats().lines, 2);
    }

    #[test]
    fn test_invalid_utf8_dropped() {
        let mut assembler = LineAssembler::default();
        let lines = assembler.push(b"RPM:\xff 12\xc3\n");
        assert_eq!(lines, vec!["RPM: 12".to_string()]);
        assert_eq!(assembler.stats().utf8_decode_errors, 1);
    }

    #[test]
    fn test_overlong_line_discarded_until_terminator() {
        let mut assembler = LineAssembler::new(4);
        assert!(assembler.push(b"abcdefgh").is_empty());
        let lines = assembler.push(b"ij\nok\n");
        assert_eq!(lines, vec!["ok".to_string()]);
        assert_eq!(assembler.stats().partial_buffer_trims, 1);
    }
}
