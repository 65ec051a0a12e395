use crate::command::Command;

use super::lines::{AssemblerStats, LineAssembler};
use super::{SerialError, SerialPortIO};

const READ_CHUNK: usize = 512;

/// Outbound wire form: `"<rpm>\n"` or `"<rpm>,<duration>\n"`
pub fn encode_command(command: &Command) -> String {
    format!("{}\n", command)
}

/// Lines gathered by one poll, plus the transport error that cut it short, if any.
#[derive(Debug, Default)]
pub struct PollResult {
    pub lines: Vec<String>,
    pub bytes_read: usize,
    pub error: Option<SerialError>,
}

/// Text protocol spoken by the centrifuge controller.
///
/// The controller streams one telemetry line per control cycle and accepts a
/// single newline-terminated command line. There is no acknowledgement, so a
/// successful write is the only delivery signal available.
pub struct ControllerProtocol<T: SerialPortIO> {
    interface: T,
    assembler: LineAssembler,
}

impl<T: SerialPortIO> ControllerProtocol<T> {
    pub fn new(interface: T, max_line_len: usize) -> Self {
        Self {
            interface,
            assembler: LineAssembler::new(max_line_len),
        }
    }

    /// Write one command line and flush it out of the OS buffer
    pub async fn send_command(&mut self, command: &Command) -> super::Result<()> {
        let line = encode_command(command);
        self.interface.send_data(line.as_bytes()).await?;
        self.interface.flush().await?;
        log::info!("Sent command: {}", command);
        Ok(())
    }

    /// Drain whatever the port has buffered, up to `max_reads` chunks, and
    /// return the complete lines. Never waits for data that has not arrived.
    pub async fn poll_lines(&mut self, max_reads: usize) -> PollResult {
        let mut result = PollResult::default();
        let mut buf = [0u8; READ_CHUNK];

        for _ in 0..max_reads.max(1) {
            match self.interface.read_available(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    result.bytes_read += n;
                    result.lines.extend(self.assembler.push(&buf[..n]));
                }
                Err(e) => {
                    result.error = Some(e);
                    break;
                }
            }
        }

        result
    }

    pub fn assembler_stats(&self) -> &AssemblerStats {
        self.assembler.stats()
    }
}
