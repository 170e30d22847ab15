//! Transport-independent driver interface for cyclic and acyclic exchange.
//!
//! The motion engine only ever talks to a [`CyclicDriver`]; whether the
//! frames travel over a polled Modbus gateway or an EtherNet/IP assembly
//! pair is the implementor's business.

use std::time::Duration;

use crate::error::Result;

/// Cyclic process-data exchange plus acyclic parameter access.
///
/// Frame lengths are fixed per connection: implementors learn the output
/// and input sizes at construction or during [`start_io`](Self::start_io)
/// and reject frames of any other length.
pub trait CyclicDriver {
    /// Bring up the cyclic exchange. Must be called before any I/O.
    fn start_io(&mut self) -> Result<()>;

    /// Tear down the cyclic exchange. Idempotent.
    fn stop_io(&mut self);

    /// Publish an output frame.
    ///
    /// Blocking mode returns once the frame is guaranteed to have reached
    /// the drive at least once; nonblocking mode returns as soon as the
    /// frame is staged for the next cycle.
    fn send_io(&mut self, frame: &[u8], nonblocking: bool) -> Result<()>;

    /// Fetch an input frame.
    ///
    /// Blocking mode waits for a frame fresher than the previous call;
    /// nonblocking mode returns whatever arrived most recently.
    fn recv_io(&mut self, nonblocking: bool) -> Result<Vec<u8>>;

    /// Acyclic parameter read. `None` on any failure; the error detail goes
    /// to the log, the caller only branches on success.
    fn read_pnu_raw(&mut self, pnu: u16, subindex: u8, num_elements: u8) -> Option<Vec<u8>>;

    /// Acyclic parameter write. `false` on any failure.
    fn write_pnu_raw(&mut self, pnu: u16, subindex: u8, num_elements: u8, payload: &[u8]) -> bool;

    /// Whether cyclic exchange is currently running and healthy.
    fn io_active(&self) -> bool;

    /// Nominal cycle time of the exchange, used to pace blocking waits.
    fn cycle_time(&self) -> Duration;
}
