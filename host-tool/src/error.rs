use bootctl_protocol::DecodeError;
use thiserror::Error;

/// Errors the protocol engine, transport and signer can raise. Every
/// exchange-level failure stops the successor chain at the current node —
/// see `engine::Engine::run_chain`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("timed out waiting for a byte from the device")]
    Timeout,

    #[error("malformed frame: {0}")]
    Decode(#[from] DecodeError),

    #[error("ACK payload had the wrong length: expected {expected}, got {got}")]
    MalformedAckPayload { expected: usize, got: usize },

    #[error("device NACKed the command: {0}")]
    DeviceNack(NackCode),

    #[error("device requested a retransmit")]
    RetransmitRequested,

    #[error("unexpected response id 0x{0:02X}")]
    UnexpectedId(u8),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("firmware image error: {0}")]
    Image(#[from] ImageError),
}

/// First payload byte of a NACK reply. `0x01..0x05` is the authoritative set
/// used by the device; `0x11` (`INVALID_COMMAND`, seen in a parallel enum in
/// the original host tooling) is retained only as a possible `Unknown` value,
/// never promoted to its own variant, since its mapping was never confirmed
/// against device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NackCode {
    #[error("invalid command")]
    InvalidCmd,
    #[error("invalid parameters")]
    InvalidParams,
    #[error("execution failed")]
    ExecutionFailed,
    #[error("flash error")]
    FlashError,
    #[error("address error")]
    AddressError,
    #[error("unknown NACK code 0x{0:02X}")]
    Unknown(u8),
}

impl NackCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x01 => NackCode::InvalidCmd,
            0x02 => NackCode::InvalidParams,
            0x03 => NackCode::ExecutionFailed,
            0x04 => NackCode::FlashError,
            0x05 => NackCode::AddressError,
            other => NackCode::Unknown(other),
        }
    }
}

/// Errors raised while signing or padding a firmware image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image is only {0} bytes, shorter than the 0x800 header region")]
    TooShort(usize),

    #[error(
        "application region is {0} bytes, not a multiple of 16 — CBC-MAC requires block-aligned input"
    )]
    UnalignedApplication(usize),

    #[error("file at target size {target} would be truncated from {current} bytes")]
    WouldTruncate { current: usize, target: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
