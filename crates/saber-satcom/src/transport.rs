use std::io::{self, Read, Write};
use std::time::Duration;

use tokio_serial::SerialPort;
use tracing::info;

/// Byte channel to the modem plus its handshake (wake) line.
pub trait Transport {
    /// Returns `Ok(None)` when nothing is waiting; never blocks for long.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn set_handshake(&mut self, high: bool) -> io::Result<()>;
}

/// Serial port transport. The handshake line is wired to DTR.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(dev: &str, baud: u32) -> io::Result<Self> {
        let mut port = tokio_serial::new(dev, baud)
            .timeout(Duration::from_millis(1))
            .open()?;
        // idle state of the wake line is high
        port.write_data_terminal_ready(true)?;
        info!("sat: serial {} @ {} open", dev, baud);
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if self.port.bytes_to_read()? == 0 {
            return Ok(None);
        }
        let mut b = [0u8; 1];
        match self.port.read(&mut b) {
            Ok(1) => Ok(Some(b[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.port)
    }

    fn set_handshake(&mut self, high: bool) -> io::Result<()> {
        self.port.write_data_terminal_ready(high)?;
        Ok(())
    }
}
