//! Error types shared by the whole drive protocol stack.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, DriveError>;

/// Everything that can go wrong between the controller and the drive.
///
/// Nothing in this crate is fatal; callers decide whether an error aborts
/// their sequence. [`DriveError::ConnectionLost`] is deliberately distinct
/// from [`DriveError::Timeout`] so a caller can tell "drive refused" from
/// "link down".
#[derive(Error, Debug)]
pub enum DriveError {
    /// A codec was handed a buffer that does not match the declared word or
    /// telegram size. Never silently truncated or padded.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// The mailbox execute/status register reported ERROR or a code this
    /// stack does not know.
    #[error("mailbox protocol error: status 0x{0:02X}")]
    ProtocolStatus(u16),
    /// The drive is configured for a different telegram than the handler.
    #[error("drive reports telegram {actual}, handler expects telegram {expected}")]
    TelegramMismatch { expected: u16, actual: u16 },
    #[error("modbus protocol error: {0}")]
    Modbus(rmodbus::ErrorKind),
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation timed out")]
    Timeout,
    /// The drive signalled a fault while an operation was waiting.
    #[error("drive fault present")]
    FaultPresent,
    /// The cyclic exchange is no longer running.
    #[error("connection to the drive lost")]
    ConnectionLost,
}

impl From<rmodbus::ErrorKind> for DriveError {
    fn from(err: rmodbus::ErrorKind) -> Self {
        DriveError::Modbus(err)
    }
}
