//! Controller-side protocol stack for servo drives speaking the telegram
//! process-data profile over Modbus-TCP or EtherNet/IP.
//!
//! The stack is layered bottom-up:
//! * [`word`] / [`words`] - the fixed-size little-endian words and the named
//!   control/status bitfields.
//! * [`telegram`] - the four cyclic frame layouts (1, 102, 9, 111) with
//!   byte-exact (de)serialization.
//! * [`transport`] / [`mailbox`] - Modbus-TCP framing and the acyclic PNU
//!   mailbox protocol on top of the register map.
//! * [`modbus`] / [`eip`] - the two [`driver::CyclicDriver`]
//!   implementations. Modbus gets its cyclic exchange from a background
//!   poll thread; EtherNet/IP rides the scanner's assembly pair.
//! * [`motion`] - the fault-aware execution engine: power-up ladder,
//!   task staging, triggering and bounded waits.
//!
//! A typical session:
//!
//! ```no_run
//! use std::time::Duration;
//! use drivelink::modbus::{ModbusConfig, ModbusDriver};
//! use drivelink::motion::{DriveHandler, TaskRequest, TelegramSetup};
//! use drivelink::telegram::{Telegram, Telegram111};
//!
//! # fn main() -> drivelink::Result<()> {
//! let config = ModbusConfig::new(Telegram111::OUTPUT_LEN, Telegram111::INPUT_LEN);
//! let driver = ModbusDriver::connect("192.168.0.10:502", 0, config)?;
//! let mut drive: DriveHandler<Telegram111, _> =
//!     DriveHandler::new(driver, TelegramSetup::Write)?;
//!
//! drive.enable_powerstage(Duration::from_secs(5))?;
//! drive.run_task(
//!     &TaskRequest::Position { target: 10_000, velocity: 600_000, absolute: true },
//!     false,
//! )?;
//! drive.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod eip;
pub mod error;
pub mod mailbox;
pub mod modbus;
pub mod motion;
pub mod pnu;
pub mod status;
pub mod telegram;
pub mod transport;
pub mod word;
pub mod words;

#[cfg(test)]
mod mock_bus;

pub use error::{DriveError, Result};
