use crate::error::Error;

/// What the protocol engine needs from a byte-oriented link: per-byte
/// blocking reads, a flushing write, and the ability to discard whatever is
/// buffered in either direction before a fresh exchange.
///
/// `SerialTransport` is the only production implementor; the `host-tool`
/// test suite implements this trait over an in-memory byte queue to drive
/// `Engine` without a real port.
pub trait Transport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error>;
    fn read_byte(&mut self) -> Result<u8, Error>;
    fn reset_input(&mut self) -> Result<(), Error>;
    fn reset_output(&mut self) -> Result<(), Error>;

    /// Reads one full frame: id, length, `length` payload bytes, 4 CRC
    /// bytes. A timeout at any step aborts the read.
    fn read_frame(&mut self) -> Result<Vec<u8>, Error> {
        let id = self.read_byte()?;
        let length = self.read_byte()?;

        let mut frame = Vec::with_capacity(2 + length as usize + 4);
        frame.push(id);
        frame.push(length);

        for _ in 0..length {
            frame.push(self.read_byte()?);
        }
        for _ in 0..4 {
            frame.push(self.read_byte()?);
        }

        Ok(frame)
    }
}
