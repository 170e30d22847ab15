//! In-memory stand-ins for the transport seams, shared by the unit tests.
//!
//! [`MockStream`] answers raw Modbus-TCP frames so the codec in
//! [`transport`](crate::transport) is exercised byte for byte; the other
//! mocks sit one level up and script behavior in terms of registers,
//! attributes or whole frames.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::driver::CyclicDriver;
use crate::error::{DriveError, Result};
use crate::mailbox::MailboxRegister;
use crate::transport::{CipBus, RegisterBus};

fn broken_pipe() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "injected failure")
}

/// Byte stream that speaks the server side of Modbus-TCP over a register
/// map. Supports the three function codes the stack uses.
pub struct MockStream {
    registers: HashMap<u16, u16>,
    rx: Vec<u8>,
    tx: VecDeque<u8>,
    fail: bool,
}

impl MockStream {
    pub fn new() -> Self {
        Self {
            registers: HashMap::new(),
            rx: Vec::new(),
            tx: VecDeque::new(),
            fail: false,
        }
    }

    pub fn set_register(&mut self, address: u16, value: u16) {
        self.registers.insert(address, value);
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.registers.get(&address).copied()
    }

    pub fn fail_io(&mut self, fail: bool) {
        self.fail = fail;
    }

    fn respond(&mut self, tid: [u8; 2], pdu: &[u8]) {
        self.tx.extend([tid[0], tid[1], 0, 0]);
        self.tx.extend((pdu.len() as u16).to_be_bytes());
        self.tx.extend(pdu.iter());
    }

    fn process(&mut self) {
        loop {
            if self.rx.len() < 6 {
                return;
            }
            let total = 6 + u16::from_be_bytes([self.rx[4], self.rx[5]]) as usize;
            if self.rx.len() < total {
                return;
            }
            let frame: Vec<u8> = self.rx.drain(..total).collect();
            let tid = [frame[0], frame[1]];
            let unit = frame[6];
            let func = frame[7];
            let address = u16::from_be_bytes([frame[8], frame[9]]);
            match func {
                0x03 => {
                    let count = u16::from_be_bytes([frame[10], frame[11]]);
                    let mut pdu = vec![unit, 0x03, (count * 2) as u8];
                    for offset in 0..count {
                        let value = self.register(address + offset).unwrap_or(0);
                        pdu.extend_from_slice(&value.to_be_bytes());
                    }
                    self.respond(tid, &pdu);
                }
                0x06 => {
                    let value = u16::from_be_bytes([frame[10], frame[11]]);
                    self.registers.insert(address, value);
                    // The response to a single write is the request echoed.
                    self.tx.extend(frame.iter());
                }
                0x10 => {
                    let count = u16::from_be_bytes([frame[10], frame[11]]) as usize;
                    for offset in 0..count {
                        let value =
                            u16::from_be_bytes([frame[13 + 2 * offset], frame[14 + 2 * offset]]);
                        self.registers.insert(address + offset as u16, value);
                    }
                    let pdu = [unit, 0x10, frame[8], frame[9], frame[10], frame[11]];
                    self.respond(tid, &pdu);
                }
                other => panic!("unsupported function code 0x{other:02X}"),
            }
        }
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.fail {
            return Err(broken_pipe());
        }
        self.rx.extend_from_slice(buf);
        self.process();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.fail {
            return Err(broken_pipe());
        }
        Ok(())
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.fail {
            return Err(broken_pipe());
        }
        let mut copied = 0;
        while copied < buf.len() {
            match self.tx.pop_front() {
                Some(byte) => {
                    buf[copied] = byte;
                    copied += 1;
                }
                None => break,
            }
        }
        Ok(copied)
    }
}

/// Register-level mock with a scripted sequence of mailbox status reads.
pub struct MockRegisterBus {
    registers: HashMap<u16, u16>,
    exec_statuses: VecDeque<u16>,
    writes: Vec<(u16, Vec<u16>)>,
    fail: bool,
    connected: bool,
}

impl MockRegisterBus {
    pub fn new() -> Self {
        Self {
            registers: HashMap::new(),
            exec_statuses: VecDeque::new(),
            writes: Vec::new(),
            fail: false,
            connected: true,
        }
    }

    pub fn set_register(&mut self, address: u16, value: u16) {
        self.registers.insert(address, value);
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.registers.get(&address).copied()
    }

    /// Queue the value the next read of the execute register reports.
    pub fn push_exec_status(&mut self, status: u16) {
        self.exec_statuses.push_back(status);
    }

    pub fn writes(&self) -> &[(u16, Vec<u16>)] {
        &self.writes
    }

    /// Most recent value written to `address`, through any write shape.
    pub fn last_write_to(&self, address: u16) -> Option<u16> {
        self.writes.iter().rev().find_map(|(start, values)| {
            let offset = address.checked_sub(*start)?;
            values.get(usize::from(offset)).copied()
        })
    }

    pub fn fail_io(&mut self, fail: bool) {
        self.fail = fail;
    }
}

impl RegisterBus for MockRegisterBus {
    fn read_holdings(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        if self.fail {
            self.connected = false;
            return Err(DriveError::Io(broken_pipe()));
        }
        let mut values = Vec::with_capacity(usize::from(count));
        for offset in 0..count {
            let register = address + offset;
            let value = if register == u16::from(MailboxRegister::Exec) {
                match self.exec_statuses.pop_front() {
                    Some(status) => {
                        self.registers.insert(register, status);
                        status
                    }
                    None => self.register(register).unwrap_or(0),
                }
            } else {
                self.register(register).unwrap_or(0)
            };
            values.push(value);
        }
        Ok(values)
    }

    fn write_holdings(&mut self, address: u16, values: &[u16]) -> Result<()> {
        if self.fail {
            self.connected = false;
            return Err(DriveError::Io(broken_pipe()));
        }
        self.writes.push((address, values.to_vec()));
        for (offset, value) in values.iter().enumerate() {
            self.registers.insert(address + offset as u16, *value);
        }
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected
    }
}

/// Clonable handle around a [`MockRegisterBus`], so a test can keep poking
/// registers after the driver has taken ownership of the bus.
#[derive(Clone)]
pub struct SharedMockBus(Arc<Mutex<MockRegisterBus>>);

impl SharedMockBus {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(MockRegisterBus::new())))
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.0.lock().unwrap().set_register(address, value);
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.0.lock().unwrap().register(address)
    }

    pub fn push_exec_status(&self, status: u16) {
        self.0.lock().unwrap().push_exec_status(status);
    }

    pub fn fail_io(&self, fail: bool) {
        self.0.lock().unwrap().fail_io(fail);
    }
}

impl RegisterBus for SharedMockBus {
    fn read_holdings(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.0.lock().unwrap().read_holdings(address, count)
    }

    fn write_holdings(&mut self, address: u16, values: &[u16]) -> Result<()> {
        self.0.lock().unwrap().write_holdings(address, values)
    }

    fn connected(&self) -> bool {
        self.0.lock().unwrap().connected()
    }
}

/// Attribute-level CIP mock with an I/O assembly pair.
pub struct MockCipBus {
    attributes: HashMap<(u16, u16, u16), Vec<u8>>,
    input: Vec<u8>,
    pub written: Vec<Vec<u8>>,
    fail: bool,
    connected: bool,
}

impl MockCipBus {
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
            input: Vec::new(),
            written: Vec::new(),
            fail: false,
            connected: true,
        }
    }

    pub fn set_attribute_value(&mut self, class: u16, instance: u16, attribute: u16, data: Vec<u8>) {
        self.attributes.insert((class, instance, attribute), data);
    }

    pub fn set_input(&mut self, frame: Vec<u8>) {
        self.input = frame;
    }

    pub fn fail_io(&mut self, fail: bool) {
        self.fail = fail;
    }
}

impl CipBus for MockCipBus {
    fn get_attribute(&mut self, class: u16, instance: u16, attribute: u16) -> Result<Vec<u8>> {
        if self.fail {
            return Err(DriveError::Io(broken_pipe()));
        }
        self.attributes
            .get(&(class, instance, attribute))
            .cloned()
            // 0x16: object does not exist.
            .ok_or(DriveError::ProtocolStatus(0x16))
    }

    fn set_attribute(
        &mut self,
        class: u16,
        instance: u16,
        attribute: u16,
        data: &[u8],
    ) -> Result<()> {
        if self.fail {
            return Err(DriveError::Io(broken_pipe()));
        }
        self.attributes
            .insert((class, instance, attribute), data.to_vec());
        Ok(())
    }

    fn read_io(&mut self) -> Result<Vec<u8>> {
        if self.fail {
            self.connected = false;
            return Err(DriveError::Io(broken_pipe()));
        }
        Ok(self.input.clone())
    }

    fn write_io(&mut self, data: &[u8]) -> Result<()> {
        if self.fail {
            self.connected = false;
            return Err(DriveError::Io(broken_pipe()));
        }
        self.written.push(data.to_vec());
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected
    }
}

/// Scripted [`CyclicDriver`] for the engine tests. Queued input frames are
/// consumed one per exchange; the last one repeats.
pub struct MockDriver {
    output_len: usize,
    input_len: usize,
    active: bool,
    pub sent: Vec<Vec<u8>>,
    inputs: VecDeque<Vec<u8>>,
    last_input: Vec<u8>,
    pnus: HashMap<(u16, u8), Vec<u8>>,
    cycle: Duration,
}

impl MockDriver {
    pub fn new(output_len: usize, input_len: usize) -> Self {
        Self {
            output_len,
            input_len,
            active: false,
            sent: Vec::new(),
            inputs: VecDeque::new(),
            last_input: vec![0; input_len],
            pnus: HashMap::new(),
            cycle: Duration::from_micros(100),
        }
    }

    pub fn push_input(&mut self, frame: Vec<u8>) {
        assert_eq!(frame.len(), self.input_len);
        self.inputs.push_back(frame);
    }

    pub fn set_pnu(&mut self, pnu: u16, subindex: u8, payload: Vec<u8>) {
        self.pnus.insert((pnu, subindex), payload);
    }

    pub fn pnu(&self, pnu: u16, subindex: u8) -> Option<Vec<u8>> {
        self.pnus.get(&(pnu, subindex)).cloned()
    }
}

impl CyclicDriver for MockDriver {
    fn start_io(&mut self) -> Result<()> {
        self.active = true;
        Ok(())
    }

    fn stop_io(&mut self) {
        self.active = false;
    }

    fn send_io(&mut self, frame: &[u8], _nonblocking: bool) -> Result<()> {
        if !self.active {
            return Err(DriveError::ConnectionLost);
        }
        if frame.len() != self.output_len {
            return Err(DriveError::LengthMismatch {
                expected: self.output_len,
                actual: frame.len(),
            });
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn recv_io(&mut self, nonblocking: bool) -> Result<Vec<u8>> {
        if !self.active {
            return Err(DriveError::ConnectionLost);
        }
        if !nonblocking {
            std::thread::sleep(self.cycle);
        }
        if let Some(frame) = self.inputs.pop_front() {
            self.last_input = frame;
        }
        Ok(self.last_input.clone())
    }

    fn read_pnu_raw(&mut self, pnu: u16, subindex: u8, _num_elements: u8) -> Option<Vec<u8>> {
        self.pnus.get(&(pnu, subindex)).cloned()
    }

    fn write_pnu_raw(&mut self, pnu: u16, subindex: u8, _num_elements: u8, payload: &[u8]) -> bool {
        self.pnus.insert((pnu, subindex), payload.to_vec());
        true
    }

    fn io_active(&self) -> bool {
        self.active
    }

    fn cycle_time(&self) -> Duration {
        self.cycle
    }
}
