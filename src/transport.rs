//! Transport collaborator interfaces and the Modbus-TCP register bus.
//!
//! The rest of the stack never touches sockets directly: the Modbus side
//! consumes a [`RegisterBus`], the EtherNet/IP side a [`CipBus`]. The
//! [`TcpRegisterBus`] below frames register requests with `rmodbus` over
//! any byte stream, so production code hands it a `std::net::TcpStream`
//! and tests hand it an in-memory stream.

use std::io::{Read, Write};

use rmodbus::client::ModbusRequest;
use rmodbus::ModbusProto;

use crate::error::{DriveError, Result};

/// Register-level access to the drive. Function codes and framing are the
/// implementation's business; callers think in holding registers.
pub trait RegisterBus {
    /// Read `count` consecutive holding registers starting at `address`.
    fn read_holdings(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;
    /// Write consecutive holding registers starting at `address`.
    fn write_holdings(&mut self, address: u16, values: &[u16]) -> Result<()>;
    /// Whether the link is still usable. Once false, stays false.
    fn connected(&self) -> bool;
}

/// Explicit-messaging access to the drive's CIP object dictionary plus the
/// cyclic assembly pair owned by the external I/O task.
pub trait CipBus {
    /// One get-attribute-single request.
    fn get_attribute(&mut self, class: u16, instance: u16, attribute: u16) -> Result<Vec<u8>>;
    /// One set-attribute-single request.
    fn set_attribute(&mut self, class: u16, instance: u16, attribute: u16, data: &[u8])
        -> Result<()>;
    /// Latest cyclic input assembly published by the I/O task.
    fn read_io(&mut self) -> Result<Vec<u8>>;
    /// Replace the cyclic output assembly consumed by the I/O task.
    fn write_io(&mut self, data: &[u8]) -> Result<()>;
    /// Whether the underlying session is still up.
    fn connected(&self) -> bool;
}

/// Modbus-TCP register bus over any byte stream.
pub struct TcpRegisterBus<S: Read + Write> {
    stream: S,
    unit_id: u8,
    connected: bool,
}

impl<S: Read + Write> TcpRegisterBus<S> {
    /// Wrap an already-connected stream. The drives answer on unit id 0
    /// or 1 depending on the gateway setting.
    pub fn new(stream: S, unit_id: u8) -> Self {
        Self {
            stream,
            unit_id,
            connected: true,
        }
    }

    fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        match exchange(&mut self.stream, request) {
            Ok(frame) => Ok(frame),
            Err(err) => {
                // A broken stream never recovers mid-session.
                self.connected = false;
                log::warn!("modbus transaction failed, marking link down: {err}");
                Err(DriveError::Io(err))
            }
        }
    }
}

/// Write one request frame and read back the complete response frame, using
/// the MBAP length field to know how many bytes to expect.
fn exchange<S: Read + Write>(stream: &mut S, request: &[u8]) -> std::io::Result<Vec<u8>> {
    stream.write_all(request)?;
    stream.flush()?;

    let mut header = [0u8; 6];
    stream.read_exact(&mut header)?;
    let remainder = u16::from_be_bytes([header[4], header[5]]) as usize;

    let mut frame = vec![0u8; 6 + remainder];
    frame[..6].copy_from_slice(&header);
    stream.read_exact(&mut frame[6..])?;
    Ok(frame)
}

impl<S: Read + Write> RegisterBus for TcpRegisterBus<S> {
    fn read_holdings(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let mut req = ModbusRequest::new(self.unit_id, ModbusProto::TcpUdp);
        let mut request = Vec::new();
        req.generate_get_holdings(address, count, &mut request)?;

        let response = self.transact(&request)?;
        let mut values = Vec::new();
        req.parse_u16(&response, &mut values)?;
        Ok(values)
    }

    fn write_holdings(&mut self, address: u16, values: &[u16]) -> Result<()> {
        let mut req = ModbusRequest::new(self.unit_id, ModbusProto::TcpUdp);
        let mut request = Vec::new();
        if let [value] = values {
            req.generate_set_holding(address, *value, &mut request)?;
        } else {
            req.generate_set_holdings_bulk(address, values, &mut request)?;
        }

        let response = self.transact(&request)?;
        req.parse_ok(&response)?;
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_bus::MockStream;

    #[test]
    fn reads_holding_registers() {
        let mut stream = MockStream::new();
        stream.set_register(100, 0x1234);
        stream.set_register(101, 0xBEEF);

        let mut bus = TcpRegisterBus::new(stream, 1);
        let values = bus.read_holdings(100, 2).unwrap();
        assert_eq!(values, vec![0x1234, 0xBEEF]);
        assert!(bus.connected());
    }

    #[test]
    fn writes_single_and_bulk() {
        let stream = MockStream::new();
        let mut bus = TcpRegisterBus::new(stream, 1);

        bus.write_holdings(500, &[3490]).unwrap();
        bus.write_holdings(510, &[0x1111, 0x2222, 0x3333]).unwrap();

        assert_eq!(bus.stream.register(500), Some(3490));
        assert_eq!(bus.stream.register(510), Some(0x1111));
        assert_eq!(bus.stream.register(512), Some(0x3333));
    }

    #[test]
    fn write_then_read_round_trips() {
        let stream = MockStream::new();
        let mut bus = TcpRegisterBus::new(stream, 1);

        bus.write_holdings(0, &[0x0447, 0x8200]).unwrap();
        assert_eq!(bus.read_holdings(0, 2).unwrap(), vec![0x0447, 0x8200]);
    }

    #[test]
    fn stream_failure_marks_the_link_down() {
        let mut stream = MockStream::new();
        stream.fail_io(true);

        let mut bus = TcpRegisterBus::new(stream, 1);
        assert!(bus.read_holdings(0, 1).is_err());
        assert!(!bus.connected());
    }
}
