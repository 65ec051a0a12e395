use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{SerialPort, SerialPortType};

use super::{Result, SerialDeviceInfo, SerialError};

// Arduino SA / Arduino LLC vendor ids; boards carrying these sort first in discovery
pub const ARDUINO_VIDS: [u16; 2] = [0x2341, 0x2A03];
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Byte-level transport to the centrifuge controller.
///
/// `read_available` must never wait for data: it returns `Ok(0)` when nothing
/// is pending so the control loop keeps its tick cadence.
#[async_trait]
pub trait SerialPortIO: Send {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize>;
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;
    async fn flush(&mut self) -> Result<()>;
}

pub struct SerialInterface {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self { port: None }
    }

    /// Discover USB serial ports, Arduino boards first
    pub fn discover_devices() -> Result<Vec<SerialDeviceInfo>> {
        let ports = serialport::available_ports()?;
        let mut devices: Vec<SerialDeviceInfo> = ports
            .into_iter()
            .filter_map(|port| match port.port_type {
                SerialPortType::UsbPort(usb_info) => Some(SerialDeviceInfo {
                    port_name: port.port_name,
                    vid: usb_info.vid,
                    pid: usb_info.pid,
                    serial_number: usb_info.serial_number,
                    manufacturer: usb_info.manufacturer,
                    product: usb_info.product,
                }),
                _ => None,
            })
            .collect();

        devices.sort_by_key(|d| !ARDUINO_VIDS.contains(&d.vid));
        Ok(devices)
    }

    /// Open `port_name` at `baud_rate`. The read timeout bounds a single read
    /// call and is the only blocking wait on the inbound path.
    pub fn connect(&mut self, port_name: &str, baud_rate: u32, read_timeout: Duration) -> Result<()> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", port_name, e)))?;

        self.port = Some(port);

        log::info!("Connected to controller on {} at {} baud", port_name, baud_rate);
        Ok(())
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(SerialError::NotConnected)
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SerialPortIO for SerialInterface {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(data.len())
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port_mut()?;
        let pending = port.bytes_to_read()? as usize;
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = pending.min(buf.len());
        match port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(SerialError::IoError(e)),
        }
    }

    async fn flush(&mut self) -> Result<()> {
        self.port_mut()?.flush()?;
        Ok(())
    }
}
