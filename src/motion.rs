//! Fault-aware motion execution on top of a cyclic driver.
//!
//! [`DriveHandler`] owns one telegram and one driver and walks the drive
//! through the power-up ladder: request PLC control, clear faults, enable
//! the powerstage, then run tasks. Every wait observes the fault bit first,
//! so a faulting drive turns a blocking motion call into
//! [`FaultPresent`](crate::error::DriveError::FaultPresent) instead of a
//! hang.
//!
//! Which tasks a layout can express, and which bits carry them, lives in
//! the [`TaskBits`] impl of each telegram; the handler itself is layout
//! independent.

use std::time::{Duration, Instant};

use strum_macros::Display;

use crate::driver::CyclicDriver;
use crate::error::{DriveError, Result};
use crate::pnu::{self, TELEGRAM_SELECTOR};
use crate::status::{DriveStatus, DriveTelegram};
use crate::telegram::{Telegram, Telegram1, Telegram102, Telegram111, Telegram9};
use crate::word::{IntDoubleWord, IntWord};

/// 100 % in the normalized scaling of override, acceleration and
/// deceleration words.
pub const FULL_SCALE: i16 = 0x4000;

// Bounded wait for the drive to acknowledge a staged task.
const ACK_TIMEOUT_CYCLES: u32 = 100;

/// One executable motion request with its setpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TaskRequest {
    /// Move to `target` with the given profile velocity. Relative unless
    /// `absolute`.
    Position {
        target: i32,
        velocity: i32,
        absolute: bool,
    },
    /// Run a preset traversing block stored on the drive.
    Record { number: u8 },
    /// Turn at a constant speed setpoint.
    Velocity { speed: i32 },
    /// Move while the jog bits are held. Level-triggered, never finishes
    /// on its own; pair with [`DriveHandler::jog_for`]. `incremental`
    /// moves in fixed steps where the layout supports it (telegram 111).
    Jog {
        positive: bool,
        negative: bool,
        incremental: bool,
    },
    /// Start the homing procedure.
    Referencing,
}

/// Task-related bit access of one telegram layout.
///
/// `stage_task` must not touch any output word when it rejects the task.
pub trait TaskBits: DriveTelegram {
    /// Stage the task setpoints into the output words. `false` when this
    /// layout cannot express the task.
    fn stage_task(&mut self, task: &TaskRequest) -> bool;
    /// Drive the start trigger of a staged task.
    fn set_task_trigger(&mut self, task: &TaskRequest, value: bool);
    /// Whether the trigger must return to zero once the drive has
    /// acknowledged the task.
    fn trigger_needs_edge(&self, task: &TaskRequest) -> bool;
    /// Whether the drive has accepted the staged task.
    fn task_acknowledged(&self, task: &TaskRequest) -> bool;
    /// Whether the task has run to completion.
    fn task_finished(&self, task: &TaskRequest) -> bool;
    /// Remove the task setpoints from the output words.
    fn clear_task(&mut self, task: &TaskRequest);
}

impl TaskBits for Telegram111 {
    fn stage_task(&mut self, task: &TaskRequest) -> bool {
        match *task {
            TaskRequest::Position {
                target,
                velocity,
                absolute,
            } => {
                self.stw1.set_do_not_reject_traversing_task(true);
                self.stw1.set_no_intermediate_stop(true);
                self.pos_stw1.set_activate_mdi(true);
                self.pos_stw1.set_absolute_positioning(absolute);
                self.override_velocity = IntWord(FULL_SCALE);
                self.mdi_tarpos = IntDoubleWord(target);
                self.mdi_velocity = IntDoubleWord(velocity);
                self.mdi_acc = IntWord(FULL_SCALE);
                self.mdi_dec = IntWord(FULL_SCALE);
                true
            }
            TaskRequest::Jog { incremental, .. } => {
                self.pos_stw2.set_jog_incremental(incremental);
                true
            }
            TaskRequest::Referencing => true,
            TaskRequest::Record { .. } | TaskRequest::Velocity { .. } => false,
        }
    }

    fn set_task_trigger(&mut self, task: &TaskRequest, value: bool) {
        match *task {
            TaskRequest::Position { .. } => self.stw1.set_activate_traversing_task(value),
            TaskRequest::Jog {
                positive, negative, ..
            } => {
                self.stw1.set_jog_positive(positive && value);
                self.stw1.set_jog_negative(negative && value);
            }
            TaskRequest::Referencing => self.stw1.set_start_homing(value),
            _ => {}
        }
    }

    fn trigger_needs_edge(&self, task: &TaskRequest) -> bool {
        // With continuous update the drive tracks the setpoint words and
        // the trigger stays high.
        matches!(task, TaskRequest::Position { .. }) && !self.pos_stw1.continuous_update()
    }

    fn task_acknowledged(&self, task: &TaskRequest) -> bool {
        match task {
            TaskRequest::Position { .. } => self.zsw1.traversing_task_ack(),
            _ => true,
        }
    }

    fn task_finished(&self, task: &TaskRequest) -> bool {
        match task {
            TaskRequest::Position { .. } => self.zsw1.target_position_reached(),
            TaskRequest::Referencing => self.zsw1.home_position_set(),
            _ => false,
        }
    }

    fn clear_task(&mut self, task: &TaskRequest) {
        match task {
            TaskRequest::Position { .. } => {
                self.stw1.set_do_not_reject_traversing_task(false);
                self.stw1.set_no_intermediate_stop(false);
                self.pos_stw1.set_activate_mdi(false);
                self.pos_stw1.set_absolute_positioning(false);
                self.override_velocity = IntWord::default();
                self.mdi_tarpos = IntDoubleWord::default();
                self.mdi_velocity = IntDoubleWord::default();
                self.mdi_acc = IntWord::default();
                self.mdi_dec = IntWord::default();
            }
            TaskRequest::Jog { .. } => self.pos_stw2.set_jog_incremental(false),
            _ => {}
        }
    }
}

impl TaskBits for Telegram9 {
    fn stage_task(&mut self, task: &TaskRequest) -> bool {
        match *task {
            TaskRequest::Position {
                target,
                velocity,
                absolute,
            } => {
                self.stw1.set_do_not_reject_traversing_task(true);
                self.stw1.set_no_intermediate_stop(true);
                self.satzanw.set_mdi_active(true);
                self.mdi_mod.set_absolute(absolute);
                self.mdi_tarpos = IntDoubleWord(target);
                self.mdi_velocity = IntDoubleWord(velocity);
                self.mdi_acc = IntWord(FULL_SCALE);
                self.mdi_dec = IntWord(FULL_SCALE);
                true
            }
            TaskRequest::Record { number } => {
                self.stw1.set_do_not_reject_traversing_task(true);
                self.stw1.set_no_intermediate_stop(true);
                self.satzanw.set_mdi_active(false);
                self.satzanw.set_record_number(number & 0x7F);
                true
            }
            TaskRequest::Jog { .. } | TaskRequest::Referencing => true,
            TaskRequest::Velocity { .. } => false,
        }
    }

    fn set_task_trigger(&mut self, task: &TaskRequest, value: bool) {
        match *task {
            TaskRequest::Position { .. } | TaskRequest::Record { .. } => {
                self.stw1.set_activate_traversing_task(value)
            }
            TaskRequest::Jog {
                positive, negative, ..
            } => {
                self.stw1.set_jog_positive(positive && value);
                self.stw1.set_jog_negative(negative && value);
            }
            TaskRequest::Referencing => self.stw1.set_start_homing(value),
            _ => {}
        }
    }

    fn trigger_needs_edge(&self, task: &TaskRequest) -> bool {
        matches!(
            task,
            TaskRequest::Position { .. } | TaskRequest::Record { .. }
        )
    }

    fn task_acknowledged(&self, task: &TaskRequest) -> bool {
        match task {
            TaskRequest::Position { .. } | TaskRequest::Record { .. } => {
                self.zsw1.traversing_task_ack()
            }
            _ => true,
        }
    }

    fn task_finished(&self, task: &TaskRequest) -> bool {
        match task {
            TaskRequest::Position { .. } | TaskRequest::Record { .. } => {
                self.zsw1.target_position_reached()
            }
            TaskRequest::Referencing => self.zsw1.home_position_set(),
            _ => false,
        }
    }

    fn clear_task(&mut self, task: &TaskRequest) {
        match task {
            TaskRequest::Position { .. } => {
                self.stw1.set_do_not_reject_traversing_task(false);
                self.stw1.set_no_intermediate_stop(false);
                self.satzanw.set_mdi_active(false);
                self.mdi_mod.set_absolute(false);
                self.mdi_tarpos = IntDoubleWord::default();
                self.mdi_velocity = IntDoubleWord::default();
                self.mdi_acc = IntWord::default();
                self.mdi_dec = IntWord::default();
            }
            TaskRequest::Record { .. } => {
                self.stw1.set_do_not_reject_traversing_task(false);
                self.stw1.set_no_intermediate_stop(false);
                self.satzanw.set_record_number(0);
            }
            _ => {}
        }
    }
}

impl TaskBits for Telegram1 {
    fn stage_task(&mut self, task: &TaskRequest) -> bool {
        match *task {
            TaskRequest::Velocity { speed } => {
                let clamped = speed.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
                if i32::from(clamped) != speed {
                    log::warn!("speed setpoint {speed} clamped to {clamped} for the 16-bit slot");
                }
                self.nsoll_a = IntWord(clamped);
                true
            }
            TaskRequest::Jog { .. } => true,
            _ => false,
        }
    }

    fn set_task_trigger(&mut self, task: &TaskRequest, value: bool) {
        match *task {
            TaskRequest::Velocity { .. } => self.stw1.set_setpoint_enable(value),
            TaskRequest::Jog {
                positive, negative, ..
            } => {
                self.stw1.set_jog_positive(positive && value);
                self.stw1.set_jog_negative(negative && value);
            }
            _ => {}
        }
    }

    fn trigger_needs_edge(&self, _task: &TaskRequest) -> bool {
        false
    }

    fn task_acknowledged(&self, _task: &TaskRequest) -> bool {
        true
    }

    fn task_finished(&self, task: &TaskRequest) -> bool {
        match task {
            TaskRequest::Velocity { .. } => self.zsw1.setpoint_reached(),
            _ => false,
        }
    }

    fn clear_task(&mut self, task: &TaskRequest) {
        if let TaskRequest::Velocity { .. } = task {
            self.nsoll_a = IntWord::default();
        }
    }
}

impl TaskBits for Telegram102 {
    fn stage_task(&mut self, task: &TaskRequest) -> bool {
        match *task {
            TaskRequest::Velocity { speed } => {
                self.nsoll_b = IntDoubleWord(speed);
                true
            }
            TaskRequest::Jog { .. } => true,
            _ => false,
        }
    }

    fn set_task_trigger(&mut self, task: &TaskRequest, value: bool) {
        match *task {
            TaskRequest::Velocity { .. } => self.stw1.set_setpoint_enable(value),
            TaskRequest::Jog {
                positive, negative, ..
            } => {
                self.stw1.set_jog_positive(positive && value);
                self.stw1.set_jog_negative(negative && value);
            }
            _ => {}
        }
    }

    fn trigger_needs_edge(&self, _task: &TaskRequest) -> bool {
        false
    }

    fn task_acknowledged(&self, _task: &TaskRequest) -> bool {
        true
    }

    fn task_finished(&self, task: &TaskRequest) -> bool {
        match task {
            TaskRequest::Velocity { .. } => self.zsw1.setpoint_reached(),
            _ => false,
        }
    }

    fn clear_task(&mut self, task: &TaskRequest) {
        if let TaskRequest::Velocity { .. } = task {
            self.nsoll_b = IntDoubleWord::default();
        }
    }
}

/// Where the handler currently sits in the power-up ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HandlerState {
    /// No exchange yet, or the powerstage is switched off.
    Unpowered,
    /// The drive has granted control to this controller.
    PlcControlRequested,
    /// Powerstage ready to be switched on.
    PowerstageReady,
    /// Powerstage on, drive follows setpoints, no task running.
    OperationEnabled,
    /// A motion task is running.
    TaskActive,
    /// The drive reports a fault; acknowledge before anything else.
    Fault,
}

/// How [`DriveHandler::new`] treats the telegram selector parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramSetup {
    /// Write the layout number to the drive, then read it back.
    Write,
    /// Only verify the drive already runs this layout.
    Validate,
    /// Trust the caller, touch nothing.
    Ignore,
}

/// Resolves a fault code to human-readable text, typically backed by the
/// drive's fault-text parameters.
pub type FaultTextResolver = Box<dyn Fn(u16) -> String>;

/// Motion engine for one drive over one telegram layout.
pub struct DriveHandler<T: TaskBits, D: CyclicDriver> {
    telegram: T,
    driver: D,
    state: HandlerState,
    diagnosis: String,
    fault_resolver: Option<FaultTextResolver>,
}

impl<T: TaskBits, D: CyclicDriver> DriveHandler<T, D> {
    /// Configure the layout, start cyclic exchange and request PLC control
    /// with the basic enable bits set.
    pub fn new(driver: D, setup: TelegramSetup) -> Result<Self> {
        let mut handler = Self {
            telegram: T::default(),
            driver,
            state: HandlerState::Unpowered,
            diagnosis: String::new(),
            fault_resolver: None,
        };
        handler.configure_layout(setup)?;
        handler.driver.start_io()?;

        handler.telegram.set_plc_control(true);
        handler.telegram.set_basic_enable(true);
        let status = handler.exchange(false)?;
        if status.fault_present {
            handler.record_fault();
        }
        log::info!(
            "drive handler up on telegram {}, state {}",
            T::NUMBER,
            handler.state
        );
        Ok(handler)
    }

    // The selector is acyclic, so it works before cyclic exchange is up;
    // on EtherNet/IP the assembly sizes depend on it, so it must.
    fn configure_layout(&mut self, setup: TelegramSetup) -> Result<()> {
        match setup {
            TelegramSetup::Write => {
                if !pnu::write_pnu(
                    &mut self.driver,
                    TELEGRAM_SELECTOR,
                    0,
                    u32::from(T::NUMBER),
                ) {
                    return Err(DriveError::Timeout);
                }
                self.validate_layout()
            }
            TelegramSetup::Validate => self.validate_layout(),
            TelegramSetup::Ignore => Ok(()),
        }
    }

    fn validate_layout(&mut self) -> Result<()> {
        let active = pnu::read_pnu::<u32>(&mut self.driver, TELEGRAM_SELECTOR, 0)
            .ok_or(DriveError::Timeout)?;
        if active != u32::from(T::NUMBER) {
            return Err(DriveError::TelegramMismatch {
                expected: T::NUMBER,
                actual: active as u16,
            });
        }
        Ok(())
    }

    /// Push the current outputs, pull fresh inputs, update the state.
    fn exchange(&mut self, nonblocking: bool) -> Result<DriveStatus> {
        self.driver
            .send_io(&self.telegram.output_bytes(), nonblocking)?;
        let frame = self.driver.recv_io(nonblocking)?;
        self.telegram.input_bytes(&frame)?;
        let status = self.telegram.status();
        self.state = self.derive_state(&status);
        Ok(status)
    }

    fn derive_state(&self, status: &DriveStatus) -> HandlerState {
        if status.fault_present {
            HandlerState::Fault
        } else if self.state == HandlerState::TaskActive {
            // Stays active until the task is finished or cleared.
            HandlerState::TaskActive
        } else if status.operation_enabled {
            HandlerState::OperationEnabled
        } else if status.ready_to_switch_on {
            HandlerState::PowerstageReady
        } else if status.control_requested {
            HandlerState::PlcControlRequested
        } else {
            HandlerState::Unpowered
        }
    }

    fn record_fault(&mut self) {
        self.diagnosis = match (self.telegram.fault_code(), &self.fault_resolver) {
            (Some(code), Some(resolve)) => format!("fault 0x{code:04X}: {}", resolve(code)),
            (Some(code), None) => format!("fault 0x{code:04X}"),
            (None, _) => "fault reported in status word".into(),
        };
        log::error!("{}", self.diagnosis);
    }

    /// Exchange until `condition` holds on the telegram.
    ///
    /// A fault aborts the wait immediately; `Duration::ZERO` waits without
    /// bound. Paced by the blocking exchange, one iteration per cycle.
    fn wait_for(&mut self, condition: impl Fn(&T) -> bool, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            let status = self.exchange(false)?;
            if status.fault_present {
                self.record_fault();
                return Err(DriveError::FaultPresent);
            }
            if condition(&self.telegram) {
                return Ok(());
            }
            if !timeout.is_zero() && started.elapsed() >= timeout {
                return Err(DriveError::Timeout);
            }
        }
    }

    /// Exchange until `condition` holds on the drive status.
    pub fn wait_until_or_fault(
        &mut self,
        condition: impl Fn(&DriveStatus) -> bool,
        timeout: Duration,
    ) -> Result<()> {
        self.wait_for(|telegram| condition(&telegram.status()), timeout)
    }

    // Nonblocking exchange so the checks below test current inputs, not
    // whatever the last blocking call happened to leave behind.
    fn refresh(&mut self) -> bool {
        match self.exchange(true) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("input refresh failed: {err}");
                false
            }
        }
    }

    /// Whether the drive currently accepts control words from us.
    /// Refreshes the inputs first.
    pub fn plc_control_granted(&mut self) -> bool {
        self.refresh() && self.telegram.status().control_requested
    }

    /// Whether a task could start right now: inputs refreshed, operation
    /// enabled, control grant still in place, no task or fault pending.
    pub fn ready_for_motion(&mut self) -> bool {
        self.refresh()
            && self.state == HandlerState::OperationEnabled
            && self.telegram.status().control_requested
    }

    /// Pulse the fault acknowledge bit, then wait for the fault to clear.
    ///
    /// Drives hold the fault bit for a few cycles past the falling edge;
    /// `Ok(false)` means it was still set when `timeout` ran out.
    /// `Duration::ZERO` waits without bound.
    pub fn acknowledge_faults(&mut self, timeout: Duration) -> Result<bool> {
        self.telegram.set_fault_ack(true);
        self.exchange(false)?;
        self.telegram.set_fault_ack(false);
        let started = Instant::now();
        loop {
            let status = self.exchange(false)?;
            if !status.fault_present {
                self.diagnosis.clear();
                return Ok(true);
            }
            if !timeout.is_zero() && started.elapsed() >= timeout {
                self.record_fault();
                return Ok(false);
            }
        }
    }

    /// Switch the powerstage on and wait for operation enabled.
    ///
    /// The ON bit is forced low for one exchange first; drives ignore a
    /// level that was already high when they became ready.
    pub fn enable_powerstage(&mut self, timeout: Duration) -> Result<()> {
        self.telegram.set_enable_operation(false);
        self.telegram.set_on(false);
        self.exchange(false)?;
        self.telegram.set_on(true);
        self.telegram.set_enable_operation(true);
        self.exchange(false)?;
        self.wait_until_or_fault(|status| status.operation_enabled, timeout)
    }

    /// Switch the powerstage off and wait until operation ends.
    ///
    /// The OFF transition is edge-forced like the ON one: the bit is
    /// driven high for one exchange before it falls, in case it was
    /// already low.
    pub fn disable_powerstage(&mut self, timeout: Duration) -> Result<()> {
        self.telegram.set_enable_operation(false);
        self.telegram.set_on(true);
        self.exchange(false)?;
        self.telegram.set_on(false);
        self.exchange(false)?;
        self.wait_until_or_fault(|status| !status.operation_enabled, timeout)
    }

    /// Run a motion task.
    ///
    /// Returns `Ok(false)` without touching any output word when the
    /// handler is not ready or the layout cannot express the task.
    /// Nonblocking mode returns once the task is running (trigger edge
    /// completed); blocking mode waits for completion and clears the task.
    pub fn run_task(&mut self, task: &TaskRequest, nonblocking: bool) -> Result<bool> {
        if !self.ready_for_motion() {
            log::warn!("{task} task rejected, handler is {}", self.state);
            return Ok(false);
        }
        if !self.telegram.stage_task(task) {
            log::warn!("{task} task not supported by telegram {}", T::NUMBER);
            return Ok(false);
        }

        self.telegram.set_task_trigger(task, true);
        let status = self.exchange(false)?;
        if status.fault_present {
            self.record_fault();
            return Err(DriveError::FaultPresent);
        }
        self.state = HandlerState::TaskActive;

        if self.telegram.trigger_needs_edge(task) {
            let ack_timeout = self.driver.cycle_time() * ACK_TIMEOUT_CYCLES;
            self.wait_for(|telegram| telegram.task_acknowledged(task), ack_timeout)?;
            self.telegram.set_task_trigger(task, false);
            self.exchange(false)?;
        }
        if nonblocking {
            return Ok(true);
        }

        self.wait_for(|telegram| telegram.task_finished(task), Duration::ZERO)?;
        self.finish_task(task)?;
        Ok(true)
    }

    /// Clear a running (or finished) task from the outputs.
    pub fn finish_task(&mut self, task: &TaskRequest) -> Result<()> {
        self.telegram.set_task_trigger(task, false);
        self.telegram.clear_task(task);
        self.exchange(false)?;
        if self.state == HandlerState::TaskActive {
            self.state = HandlerState::OperationEnabled;
        }
        Ok(())
    }

    /// Hold a velocity setpoint for `duration`, then withdraw it.
    ///
    /// Reaching the setpoint early keeps it applied for the remaining
    /// window on the drive side; not reaching it within the window is the
    /// normal case, not an error. A zero duration returns with the
    /// setpoint still applied; withdraw it with [`Self::finish_task`].
    pub fn run_velocity_for(&mut self, speed: i32, duration: Duration) -> Result<bool> {
        let task = TaskRequest::Velocity { speed };
        if !self.run_task(&task, true)? {
            return Ok(false);
        }
        if duration.is_zero() {
            return Ok(true);
        }
        match self.wait_for(|telegram| telegram.task_finished(&task), duration) {
            Ok(()) | Err(DriveError::Timeout) => {}
            Err(err) => return Err(err),
        }
        self.finish_task(&task)?;
        Ok(true)
    }

    /// Hold the jog bits for `duration`, then release them.
    ///
    /// The window keeps exchanging frames, so a fault aborts it with
    /// [`DriveError::FaultPresent`] instead of jogging blind. A zero
    /// duration returns with the bits still held; release them with
    /// [`Self::finish_task`].
    pub fn jog_for(&mut self, positive: bool, negative: bool, duration: Duration) -> Result<bool> {
        if positive && negative {
            // The profile leaves simultaneous jog bits to the drive, which
            // treats them as no movement.
            log::warn!("both jog directions requested, forwarding as-is");
        }
        let task = TaskRequest::Jog {
            positive,
            negative,
            incremental: false,
        };
        if !self.run_task(&task, true)? {
            return Ok(false);
        }
        if duration.is_zero() {
            return Ok(true);
        }
        match self.wait_for(|_| false, duration) {
            Ok(()) | Err(DriveError::Timeout) => {}
            Err(err) => return Err(err),
        }
        self.finish_task(&task)?;
        Ok(true)
    }

    /// Install a fault-code-to-text resolver used for [`Self::diagnosis`].
    pub fn set_fault_resolver(&mut self, resolver: FaultTextResolver) {
        self.fault_resolver = Some(resolver);
    }

    /// Text of the most recent fault, empty while the drive is clean.
    pub fn diagnosis(&self) -> &str {
        &self.diagnosis
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Last received drive status.
    pub fn status(&self) -> DriveStatus {
        self.telegram.status()
    }

    pub fn telegram(&self) -> &T {
        &self.telegram
    }

    /// Direct access to the output words, for layout-specific overrides
    /// before staging a task.
    pub fn telegram_mut(&mut self) -> &mut T {
        &mut self.telegram
    }

    /// Underlying driver, for acyclic parameter access.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Push one all-zero safe-stop frame, then stop cyclic exchange.
    pub fn shutdown(&mut self) {
        if self.driver.io_active() {
            self.telegram.reset();
            if let Err(err) = self.exchange(false) {
                log::warn!("final safe-stop frame not delivered: {err}");
            }
        }
        self.driver.stop_io();
        self.state = HandlerState::Unpowered;
    }
}

impl<T: TaskBits, D: CyclicDriver> Drop for DriveHandler<T, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
