use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::Error;
use crate::transport::Transport;

/// Blocking serial transport. One outstanding request at a time, no
/// pipelining — the port is owned for the duration of a session and no
/// other component touches it concurrently.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens `path` at `baud`, 8-N-1, no hardware flow control. `byte_timeout`
    /// bounds every individual `read_byte` call, not the whole frame.
    pub fn open(path: &str, baud: u32, byte_timeout: Duration) -> Result<Self, Error> {
        let port = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(byte_timeout)
            .open()?;

        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    /// Writes `bytes` and blocks until the underlying buffer is drained.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    /// Blocks up to the configured per-byte timeout for a single byte.
    /// Never consumes a partial byte: either the whole byte arrives in time
    /// or nothing is removed from the stream.
    fn read_byte(&mut self) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        match self.port.read_exact(&mut buf) {
            Ok(()) => Ok(buf[0]),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(Error::Timeout),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn reset_input(&mut self) -> Result<(), Error> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn reset_output(&mut self) -> Result<(), Error> {
        self.port.clear(ClearBuffer::Output)?;
        Ok(())
    }
}
