//! Acyclic parameter access ("PNU mailbox") over the Modbus register window.
//!
//! The mailbox shares the register space with the cyclic process data but is
//! otherwise independent of it: a request writes the parameter address
//! registers, triggers execution, polls the trigger register until it turns
//! into a terminal status, and (for reads) collects the payload from the
//! data window. The poll is bounded; a drive that never answers is a
//! [`Timeout`](crate::error::DriveError::Timeout), not a hang.
//!
//! The bus is shared with the cyclic poll thread, so every register access
//! takes the bus mutex individually and the poll sleeps with the mutex
//! released.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use strum_macros::EnumIter;

use crate::error::{DriveError, Result};
use crate::transport::RegisterBus;

/// Holding-register window of the PNU mailbox.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum MailboxRegister {
    /// __R/W__ - Parameter number of the pending request.
    Pnu = 500,
    /// __R/W__ - Subindex of the pending request.
    Subindex = 501,
    /// __R/W__ - Number of array elements to transfer.
    NumElements = 502,
    /// __R/W__ - Execute trigger, polled back as the request status.
    ///
    /// See [`exec_code`] for the possible values.
    Exec = 503,
    /// __R/W__ - Payload length of the pending request, in bytes.
    DataLength = 504,
    /// __R/W__ - First register of the word-addressable payload window.
    Data = 510,
}

impl From<MailboxRegister> for u16 {
    fn from(value: MailboxRegister) -> Self {
        value as u16
    }
}

/// Codes observed in the execute/status register.
pub mod exec_code {
    /// Start a parameter read. Read back while the request is pending.
    pub const READ: u16 = 0x01;
    /// Start a parameter write. Read back while the request is pending.
    pub const WRITE: u16 = 0x02;
    /// Terminal failure status.
    pub const ERROR: u16 = 0x03;
    /// Terminal success status.
    pub const DONE: u16 = 0x10;
}

/// Size of the payload window in registers (two bytes each).
pub const DATA_WINDOW_REGS: u16 = 50;

// 250 ms worst case; the drive usually answers within one poll cycle.
const POLL_ATTEMPTS: u32 = 50;
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Transient state of one request/poll/response cycle.
///
/// Lives only for the duration of [`read_pnu`] or [`write_pnu`]; at most one
/// transaction may be outstanding per driver instance, concurrent callers
/// must serialize externally.
#[derive(Debug)]
pub struct MailboxTransaction {
    pub pnu: u16,
    pub subindex: u8,
    pub num_elements: u8,
    /// Code written to the trigger register.
    pub exec: u16,
    /// Last status read back from the trigger register.
    pub status: u16,
    /// Declared payload length in bytes.
    pub data_length: usize,
    pub payload: Vec<u8>,
}

impl MailboxTransaction {
    fn new(pnu: u16, subindex: u8, num_elements: u8, exec: u16) -> Self {
        Self {
            pnu,
            subindex,
            num_elements,
            exec,
            status: 0,
            data_length: 0,
            payload: Vec::new(),
        }
    }
}

/// Read a parameter through the mailbox.
///
/// Returns exactly the number of bytes the drive declares, regardless of
/// register padding. Any terminal status other than DONE fails the whole
/// read; there are no partial results.
pub fn read_pnu<B: RegisterBus>(
    bus: &Mutex<B>,
    pnu: u16,
    subindex: u8,
    num_elements: u8,
) -> Result<Vec<u8>> {
    let mut txn = MailboxTransaction::new(pnu, subindex, num_elements, exec_code::READ);

    submit_header(bus, &txn)?;
    write_register(bus, MailboxRegister::Exec, txn.exec)?;
    txn.status = poll_status(bus)?;

    let declared = usize::from(read_register(bus, MailboxRegister::DataLength)?);
    let window = usize::from(DATA_WINDOW_REGS) * 2;
    if declared > window {
        return Err(DriveError::LengthMismatch {
            expected: window,
            actual: declared,
        });
    }
    txn.data_length = declared;
    if declared == 0 {
        return Ok(txn.payload);
    }

    let words = {
        let mut bus = lock(bus)?;
        bus.read_holdings(MailboxRegister::Data.into(), declared.div_ceil(2) as u16)?
    };
    if words.len() * 2 < declared {
        return Err(DriveError::LengthMismatch {
            expected: declared,
            actual: words.len() * 2,
        });
    }

    for word in words {
        txn.payload.extend_from_slice(&word.to_le_bytes());
    }
    txn.payload.truncate(declared);
    log::debug!(
        "pnu {}.{}: read {} bytes",
        txn.pnu,
        txn.subindex,
        txn.data_length
    );
    Ok(txn.payload)
}

/// Write a parameter through the mailbox.
///
/// Fails unless the final status poll reports DONE.
pub fn write_pnu<B: RegisterBus>(
    bus: &Mutex<B>,
    pnu: u16,
    subindex: u8,
    num_elements: u8,
    payload: &[u8],
) -> Result<()> {
    let window = usize::from(DATA_WINDOW_REGS) * 2;
    if payload.is_empty() || payload.len() > window {
        return Err(DriveError::LengthMismatch {
            expected: window,
            actual: payload.len(),
        });
    }

    let mut txn = MailboxTransaction::new(pnu, subindex, num_elements, exec_code::WRITE);
    txn.data_length = payload.len();
    txn.payload = payload.to_vec();

    submit_header(bus, &txn)?;
    write_register(bus, MailboxRegister::DataLength, txn.data_length as u16)?;

    let words: Vec<u16> = txn
        .payload
        .chunks(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect();
    {
        let mut bus = lock(bus)?;
        bus.write_holdings(MailboxRegister::Data.into(), &words)?;
    }

    write_register(bus, MailboxRegister::Exec, txn.exec)?;
    txn.status = poll_status(bus)?;
    log::debug!(
        "pnu {}.{}: wrote {} bytes",
        txn.pnu,
        txn.subindex,
        txn.data_length
    );
    Ok(())
}

/// The address registers are contiguous, one bulk write covers all three.
fn submit_header<B: RegisterBus>(bus: &Mutex<B>, txn: &MailboxTransaction) -> Result<()> {
    let mut bus = lock(bus)?;
    bus.write_holdings(
        MailboxRegister::Pnu.into(),
        &[
            txn.pnu,
            u16::from(txn.subindex),
            u16::from(txn.num_elements),
        ],
    )
}

/// Poll the trigger register until a terminal status shows up.
fn poll_status<B: RegisterBus>(bus: &Mutex<B>) -> Result<u16> {
    for attempt in 0..POLL_ATTEMPTS {
        let status = read_register(bus, MailboxRegister::Exec)?;
        match status {
            exec_code::DONE => return Ok(status),
            // Still executing; the trigger code stays visible meanwhile.
            exec_code::READ | exec_code::WRITE => {}
            other => return Err(DriveError::ProtocolStatus(other)),
        }
        if attempt + 1 < POLL_ATTEMPTS {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
    Err(DriveError::Timeout)
}

fn read_register<B: RegisterBus>(bus: &Mutex<B>, register: MailboxRegister) -> Result<u16> {
    let mut bus = lock(bus)?;
    let values = bus.read_holdings(register.into(), 1)?;
    values.first().copied().ok_or(DriveError::LengthMismatch {
        expected: 2,
        actual: 0,
    })
}

fn write_register<B: RegisterBus>(
    bus: &Mutex<B>,
    register: MailboxRegister,
    value: u16,
) -> Result<()> {
    let mut bus = lock(bus)?;
    bus.write_holdings(register.into(), &[value])
}

// A poisoned bus mutex means the cyclic thread died; the link is gone.
fn lock<B: RegisterBus>(bus: &Mutex<B>) -> Result<MutexGuard<'_, B>> {
    bus.lock().map_err(|_| DriveError::ConnectionLost)
}
