//! Cyclic process-data driver for Modbus gateways.
//!
//! Modbus has no cyclic transfer of its own, so a background thread
//! re-creates one: every cycle it writes the staged output frame to the
//! process-data output registers and reads the input registers back. The
//! latest input frame, a cycle counter and a health flag live in shared
//! state; blocking callers park on a condvar until the counter moves.
//!
//! A failed cycle is terminal. The thread logs the error, marks the
//! exchange inactive and exits, so callers get
//! [`ConnectionLost`](crate::error::DriveError::ConnectionLost) instead of
//! stale data.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::driver::CyclicDriver;
use crate::error::{DriveError, Result};
use crate::mailbox;
use crate::transport::{RegisterBus, TcpRegisterBus};

/// First holding register of the process-data output image.
pub const PD_OUTPUT_ADDRESS: u16 = 0;
/// First holding register of the process-data input image.
pub const PD_INPUT_ADDRESS: u16 = 100;

/// Settings of one cyclic Modbus connection.
#[derive(Debug, Clone)]
pub struct ModbusConfig {
    /// Nominal poll period of the background thread.
    pub cycle_time: Duration,
    /// Output frame length in bytes. Must be even.
    pub output_len: usize,
    /// Input frame length in bytes. Must be even.
    pub input_len: usize,
    /// Upper bound for blocking waits, in cycles.
    pub timeout_cycles: u32,
}

impl ModbusConfig {
    /// 10 ms cycle, 1 s blocking timeout.
    pub fn new(output_len: usize, input_len: usize) -> Self {
        Self {
            cycle_time: Duration::from_millis(10),
            output_len,
            input_len,
            timeout_cycles: 100,
        }
    }
}

struct IoState {
    output: Vec<u8>,
    input: Vec<u8>,
    /// Completed exchange cycles since [`CyclicDriver::start_io`].
    cycle: u64,
    active: bool,
    stop: bool,
}

struct IoShared {
    state: Mutex<IoState>,
    cycles: Condvar,
}

/// Register-polling driver over any [`RegisterBus`].
pub struct ModbusDriver<B: RegisterBus + Send + 'static> {
    bus: Arc<Mutex<B>>,
    config: ModbusConfig,
    shared: Arc<IoShared>,
    thread: Option<JoinHandle<()>>,
    /// Cycle counter value of the last frame handed out by `recv_io`.
    last_recv_cycle: u64,
}

impl ModbusDriver<TcpRegisterBus<TcpStream>> {
    /// Connect to a Modbus-TCP gateway.
    pub fn connect(addr: impl ToSocketAddrs, unit_id: u8, config: ModbusConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(TcpRegisterBus::new(stream, unit_id), config))
    }
}

impl<B: RegisterBus + Send + 'static> ModbusDriver<B> {
    pub fn new(bus: B, config: ModbusConfig) -> Self {
        let shared = IoShared {
            state: Mutex::new(IoState {
                output: Vec::new(),
                input: Vec::new(),
                cycle: 0,
                active: false,
                stop: false,
            }),
            cycles: Condvar::new(),
        };
        Self {
            bus: Arc::new(Mutex::new(bus)),
            config,
            shared: Arc::new(shared),
            thread: None,
            last_recv_cycle: 0,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, IoState>> {
        self.shared
            .state
            .lock()
            .map_err(|_| DriveError::ConnectionLost)
    }

    /// Park on the cycle condvar until `pending` clears, the exchange dies
    /// or the configured timeout elapses.
    fn wait_while<'a>(
        &'a self,
        mut state: MutexGuard<'a, IoState>,
        mut pending: impl FnMut(&IoState) -> bool,
    ) -> Result<MutexGuard<'a, IoState>> {
        let deadline = self.config.cycle_time * self.config.timeout_cycles;
        let started = Instant::now();
        while state.active && pending(&state) {
            let elapsed = started.elapsed();
            if elapsed >= deadline {
                return Err(DriveError::Timeout);
            }
            let (guard, _) = self
                .shared
                .cycles
                .wait_timeout(state, deadline - elapsed)
                .map_err(|_| DriveError::ConnectionLost)?;
            state = guard;
        }
        if !state.active {
            return Err(DriveError::ConnectionLost);
        }
        Ok(state)
    }
}

/// One write/read register exchange. Holds the bus lock only for the two
/// transactions so mailbox traffic can interleave between cycles.
fn exchange_cycle<B: RegisterBus>(bus: &Mutex<B>, shared: &IoShared) -> Result<()> {
    let (output_words, input_len) = {
        let state = shared
            .state
            .lock()
            .map_err(|_| DriveError::ConnectionLost)?;
        (pack_words(&state.output), state.input.len())
    };

    let input_words = {
        let mut bus = bus.lock().map_err(|_| DriveError::ConnectionLost)?;
        bus.write_holdings(PD_OUTPUT_ADDRESS, &output_words)?;
        bus.read_holdings(PD_INPUT_ADDRESS, (input_len / 2) as u16)?
    };
    if input_words.len() * 2 < input_len {
        return Err(DriveError::LengthMismatch {
            expected: input_len,
            actual: input_words.len() * 2,
        });
    }

    let mut state = shared
        .state
        .lock()
        .map_err(|_| DriveError::ConnectionLost)?;
    state.input = unpack_bytes(&input_words, input_len);
    state.cycle += 1;
    shared.cycles.notify_all();
    Ok(())
}

/// Registers carry the frame little-endian, low byte first.
fn pack_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}

fn unpack_bytes(words: &[u16], len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes.truncate(len);
    bytes
}

impl<B: RegisterBus + Send + 'static> CyclicDriver for ModbusDriver<B> {
    fn start_io(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }
        for len in [self.config.output_len, self.config.input_len] {
            if len % 2 != 0 {
                return Err(DriveError::LengthMismatch {
                    expected: len / 2 * 2,
                    actual: len,
                });
            }
        }

        {
            let mut state = self.state()?;
            state.output = vec![0; self.config.output_len];
            state.input = vec![0; self.config.input_len];
            state.cycle = 0;
            state.active = true;
            state.stop = false;
        }
        self.last_recv_cycle = 0;

        // One synchronous cycle before the thread starts, so a dead gateway
        // fails here and the first recv never sees an all-zero frame.
        exchange_cycle(&self.bus, &self.shared).inspect_err(|_| {
            if let Ok(mut state) = self.shared.state.lock() {
                state.active = false;
            }
        })?;

        let bus = Arc::clone(&self.bus);
        let shared = Arc::clone(&self.shared);
        let cycle_time = self.config.cycle_time;
        let handle = std::thread::Builder::new()
            .name("drivelink-cycle".into())
            .spawn(move || loop {
                match shared.state.lock() {
                    Ok(state) if !state.stop => {}
                    _ => break,
                }
                let started = Instant::now();
                if let Err(err) = exchange_cycle(&bus, &shared) {
                    log::error!("cyclic exchange failed, stopping process data: {err}");
                    if let Ok(mut state) = shared.state.lock() {
                        state.active = false;
                    }
                    shared.cycles.notify_all();
                    break;
                }
                let elapsed = started.elapsed();
                if elapsed < cycle_time {
                    std::thread::sleep(cycle_time - elapsed);
                }
            })?;
        self.thread = Some(handle);
        log::info!(
            "cyclic exchange started, {} out / {} in bytes every {:?}",
            self.config.output_len,
            self.config.input_len,
            self.config.cycle_time
        );
        Ok(())
    }

    fn stop_io(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        if let Ok(mut state) = self.shared.state.lock() {
            state.stop = true;
            state.active = false;
        }
        self.shared.cycles.notify_all();
        let _ = handle.join();
        log::info!("cyclic exchange stopped");
    }

    fn send_io(&mut self, frame: &[u8], nonblocking: bool) -> Result<()> {
        if frame.len() != self.config.output_len {
            return Err(DriveError::LengthMismatch {
                expected: self.config.output_len,
                actual: frame.len(),
            });
        }

        let mut state = self.state()?;
        if !state.active {
            return Err(DriveError::ConnectionLost);
        }
        state.output.copy_from_slice(frame);
        if nonblocking {
            return Ok(());
        }

        // The running cycle may already have sampled the old frame, so the
        // new one is only guaranteed on the wire two boundaries later.
        let target = state.cycle + 2;
        self.wait_while(state, |state| state.cycle < target)?;
        Ok(())
    }

    fn recv_io(&mut self, nonblocking: bool) -> Result<Vec<u8>> {
        let mut state = self.state()?;
        if !nonblocking {
            let previous = self.last_recv_cycle;
            state = self.wait_while(state, |state| state.cycle <= previous)?;
        }
        if !state.active {
            return Err(DriveError::ConnectionLost);
        }
        let (cycle, input) = (state.cycle, state.input.clone());
        drop(state);
        self.last_recv_cycle = cycle;
        Ok(input)
    }

    fn read_pnu_raw(&mut self, pnu: u16, subindex: u8, num_elements: u8) -> Option<Vec<u8>> {
        match mailbox::read_pnu(&self.bus, pnu, subindex, num_elements) {
            Ok(payload) => Some(payload),
            Err(err) => {
                log::warn!("pnu {pnu}.{subindex} read failed: {err}");
                None
            }
        }
    }

    fn write_pnu_raw(&mut self, pnu: u16, subindex: u8, num_elements: u8, payload: &[u8]) -> bool {
        match mailbox::write_pnu(&self.bus, pnu, subindex, num_elements, payload) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("pnu {pnu}.{subindex} write failed: {err}");
                false
            }
        }
    }

    fn io_active(&self) -> bool {
        self.thread.is_some()
            && self
                .shared
                .state
                .lock()
                .map(|state| state.active)
                .unwrap_or(false)
    }

    fn cycle_time(&self) -> Duration {
        self.config.cycle_time
    }
}

impl<B: RegisterBus + Send + 'static> Drop for ModbusDriver<B> {
    fn drop(&mut self) {
        self.stop_io();
    }
}
