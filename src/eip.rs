//! Cyclic driver for EtherNet/IP scanners.
//!
//! Unlike the Modbus side there is no polling thread here: the scanner's
//! own I/O task exchanges the assemblies at its configured rate and the
//! [`CipBus`] hands us the images. Blocking semantics degrade to a fixed
//! delay of two cycle times, which is long enough for a staged frame to be
//! produced and the response to be consumed.
//!
//! Assembly sizes are not configured but queried from the drive's system
//! object during [`CyclicDriver::start_io`]; drives with the extended
//! process-data option expose a second assembly pair that wins over the
//! standard one.

use std::time::Duration;

use crate::driver::CyclicDriver;
use crate::error::{DriveError, Result};
use crate::transport::CipBus;

/// System object holding the assembly descriptors.
pub const SYSTEM_CLASS: u16 = 0x4;
/// Manufacturer object mapping PNUs to instances and subindices to
/// attributes.
pub const PARAMETER_CLASS: u16 = 0x401;

/// Byte size attribute of an assembly instance.
const SIZE_ATTRIBUTE: u16 = 4;

const STD_INPUT_INSTANCE: u16 = 100;
const STD_OUTPUT_INSTANCE: u16 = 101;
const EXT_INPUT_INSTANCE: u16 = 110;
const EXT_OUTPUT_INSTANCE: u16 = 111;

/// Settings of one EtherNet/IP connection.
#[derive(Debug, Clone)]
pub struct EipConfig {
    /// Requested packet interval of the scanner's I/O connection.
    pub cycle_time: Duration,
}

impl Default for EipConfig {
    fn default() -> Self {
        Self {
            cycle_time: Duration::from_millis(10),
        }
    }
}

/// Assembly-exchanging driver over any [`CipBus`].
pub struct EipDriver<B: CipBus> {
    bus: B,
    config: EipConfig,
    output_len: usize,
    input_len: usize,
    active: bool,
}

impl<B: CipBus> EipDriver<B> {
    pub fn new(bus: B, config: EipConfig) -> Self {
        Self {
            bus,
            config,
            output_len: 0,
            input_len: 0,
            active: false,
        }
    }

    /// Size of the preferred assembly, falling back to the standard one on
    /// drives without the extended pair.
    fn assembly_size(&mut self, extended: u16, standard: u16) -> Result<usize> {
        let raw = match self.bus.get_attribute(SYSTEM_CLASS, extended, SIZE_ATTRIBUTE) {
            Ok(raw) => raw,
            Err(err) => {
                log::debug!("no extended assembly {extended}, using {standard}: {err}");
                self.bus.get_attribute(SYSTEM_CLASS, standard, SIZE_ATTRIBUTE)?
            }
        };
        if raw.len() < 2 {
            return Err(DriveError::LengthMismatch {
                expected: 2,
                actual: raw.len(),
            });
        }
        Ok(usize::from(u16::from_le_bytes([raw[0], raw[1]])))
    }

    fn io_error(&mut self, err: DriveError) -> DriveError {
        // Losing the I/O connection is terminal for this session.
        self.active = false;
        log::warn!("assembly exchange failed, marking connection down: {err}");
        err
    }
}

impl<B: CipBus> CyclicDriver for EipDriver<B> {
    fn start_io(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }
        self.input_len = self.assembly_size(EXT_INPUT_INSTANCE, STD_INPUT_INSTANCE)?;
        self.output_len = self.assembly_size(EXT_OUTPUT_INSTANCE, STD_OUTPUT_INSTANCE)?;
        log::info!(
            "assembly exchange up, {} out / {} in bytes",
            self.output_len,
            self.input_len
        );
        self.active = true;
        Ok(())
    }

    fn stop_io(&mut self) {
        self.active = false;
    }

    fn send_io(&mut self, frame: &[u8], nonblocking: bool) -> Result<()> {
        if !self.io_active() {
            return Err(DriveError::ConnectionLost);
        }
        if frame.len() != self.output_len {
            return Err(DriveError::LengthMismatch {
                expected: self.output_len,
                actual: frame.len(),
            });
        }
        self.bus
            .write_io(frame)
            .map_err(|err| self.io_error(err))?;
        if !nonblocking {
            std::thread::sleep(self.config.cycle_time * 2);
        }
        Ok(())
    }

    fn recv_io(&mut self, nonblocking: bool) -> Result<Vec<u8>> {
        if !self.io_active() {
            return Err(DriveError::ConnectionLost);
        }
        if !nonblocking {
            std::thread::sleep(self.config.cycle_time * 2);
        }
        let frame = self.bus.read_io().map_err(|err| self.io_error(err))?;
        if frame.len() != self.input_len {
            return Err(DriveError::LengthMismatch {
                expected: self.input_len,
                actual: frame.len(),
            });
        }
        Ok(frame)
    }

    fn read_pnu_raw(&mut self, pnu: u16, subindex: u8, _num_elements: u8) -> Option<Vec<u8>> {
        match self
            .bus
            .get_attribute(PARAMETER_CLASS, pnu, u16::from(subindex))
        {
            Ok(payload) => Some(payload),
            Err(err) => {
                log::warn!("pnu {pnu}.{subindex} read failed: {err}");
                None
            }
        }
    }

    fn write_pnu_raw(&mut self, pnu: u16, subindex: u8, _num_elements: u8, payload: &[u8]) -> bool {
        match self
            .bus
            .set_attribute(PARAMETER_CLASS, pnu, u16::from(subindex), payload)
        {
            Ok(()) => true,
            Err(err) => {
                log::warn!("pnu {pnu}.{subindex} write failed: {err}");
                false
            }
        }
    }

    fn io_active(&self) -> bool {
        self.active && self.bus.connected()
    }

    fn cycle_time(&self) -> Duration {
        self.config.cycle_time
    }
}
