//! Layout-independent view of the drive state plus the control-side knobs
//! the motion engine needs from every telegram.
//!
//! The four layouts disagree on where things live (velocity layouts report
//! setpoint-reached where position layouts report target-reached, only
//! telegram 111 carries fault codes), so the engine goes through
//! [`StatusView`] and [`DriveTelegram`] instead of poking words directly.

use std::fmt::Write as _;

use crate::telegram::{Telegram, Telegram1, Telegram102, Telegram111, Telegram9};

/// Snapshot of the state bits shared by all telegram layouts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriveStatus {
    pub ready_to_switch_on: bool,
    pub ready_to_operate: bool,
    pub operation_enabled: bool,
    pub fault_present: bool,
    pub warning_present: bool,
    pub switching_on_inhibited: bool,
    /// The drive accepts control words from this controller.
    pub control_requested: bool,
    /// Target position reached, or speed setpoint reached on the velocity
    /// layouts.
    pub target_reached: bool,
    /// Home position set. Always false on the velocity layouts, which do
    /// not report homing.
    pub home_position_set: bool,
    /// Traversing task acknowledged. Always false on the velocity layouts.
    pub traversing_task_ack: bool,
    /// Drive at standstill. Always false on the velocity layouts.
    pub drive_stopped: bool,
}

/// Read access to the drive state carried in the input words.
pub trait StatusView {
    fn status(&self) -> DriveStatus;

    /// Active fault code, on layouts that carry one.
    fn fault_code(&self) -> Option<u16> {
        None
    }

    /// Active warning code, on layouts that carry one.
    fn warning_code(&self) -> Option<u16> {
        None
    }
}

/// The control bits every layout provides, wherever its STW1 keeps them.
pub trait DriveTelegram: Telegram + StatusView {
    /// Bit 10, hand control to this controller.
    fn set_plc_control(&mut self, value: bool);
    /// OFF2 and OFF3 inactive; on the velocity layouts this also releases
    /// the ramp generator.
    fn set_basic_enable(&mut self, value: bool);
    /// Bit 0, switch the powerstage on.
    fn set_on(&mut self, value: bool);
    /// Bit 3, enable operation.
    fn set_enable_operation(&mut self, value: bool);
    /// Bit 7, rising edge acknowledges pending faults.
    fn set_fault_ack(&mut self, value: bool);
}

macro_rules! velocity_drive_telegram {
    ($telegram:ty) => {
        impl StatusView for $telegram {
            fn status(&self) -> DriveStatus {
                DriveStatus {
                    ready_to_switch_on: self.zsw1.ready_to_switch_on(),
                    ready_to_operate: self.zsw1.ready_to_operate(),
                    operation_enabled: self.zsw1.operation_enabled(),
                    fault_present: self.zsw1.fault_present(),
                    warning_present: self.zsw1.warning_present(),
                    switching_on_inhibited: self.zsw1.switching_on_inhibited(),
                    control_requested: self.zsw1.control_requested(),
                    target_reached: self.zsw1.setpoint_reached(),
                    home_position_set: false,
                    traversing_task_ack: false,
                    drive_stopped: false,
                }
            }
        }

        impl DriveTelegram for $telegram {
            fn set_plc_control(&mut self, value: bool) {
                self.stw1.set_control_by_plc(value);
            }

            fn set_basic_enable(&mut self, value: bool) {
                self.stw1.set_no_coast_stop(value);
                self.stw1.set_no_quick_stop(value);
                self.stw1.set_enable_ramp_generator(value);
                self.stw1.set_unfreeze_ramp_generator(value);
            }

            fn set_on(&mut self, value: bool) {
                self.stw1.set_on(value);
            }

            fn set_enable_operation(&mut self, value: bool) {
                self.stw1.set_enable_operation(value);
            }

            fn set_fault_ack(&mut self, value: bool) {
                self.stw1.set_fault_ack(value);
            }
        }
    };
}

macro_rules! position_drive_telegram {
    ($telegram:ty) => {
        position_drive_telegram!(@status $telegram);
        position_drive_telegram!(@control $telegram);
    };
    // Variant for layouts that carry diagnostic words in the input frame.
    ($telegram:ty, $fault:ident, $warn:ident) => {
        position_drive_telegram!(@status $telegram, {
            fn fault_code(&self) -> Option<u16> {
                Some(self.$fault.to_int())
            }

            fn warning_code(&self) -> Option<u16> {
                Some(self.$warn.to_int())
            }
        });
        position_drive_telegram!(@control $telegram);
    };
    (@status $telegram:ty $(, { $($diagnostics:tt)* })?) => {
        impl StatusView for $telegram {
            fn status(&self) -> DriveStatus {
                DriveStatus {
                    ready_to_switch_on: self.zsw1.ready_to_switch_on(),
                    ready_to_operate: self.zsw1.ready_to_operate(),
                    operation_enabled: self.zsw1.operation_enabled(),
                    fault_present: self.zsw1.fault_present(),
                    warning_present: self.zsw1.warning_present(),
                    switching_on_inhibited: self.zsw1.switching_on_inhibited(),
                    control_requested: self.zsw1.control_requested(),
                    target_reached: self.zsw1.target_position_reached(),
                    home_position_set: self.zsw1.home_position_set(),
                    traversing_task_ack: self.zsw1.traversing_task_ack(),
                    drive_stopped: self.zsw1.drive_stopped(),
                }
            }

            $($($diagnostics)*)?
        }
    };
    (@control $telegram:ty) => {
        impl DriveTelegram for $telegram {
            fn set_plc_control(&mut self, value: bool) {
                self.stw1.set_control_by_plc(value);
            }

            fn set_basic_enable(&mut self, value: bool) {
                self.stw1.set_no_coast_stop(value);
                self.stw1.set_no_quick_stop(value);
            }

            fn set_on(&mut self, value: bool) {
                self.stw1.set_on(value);
            }

            fn set_enable_operation(&mut self, value: bool) {
                self.stw1.set_enable_operation(value);
            }

            fn set_fault_ack(&mut self, value: bool) {
                self.stw1.set_fault_ack(value);
            }
        }
    };
}

velocity_drive_telegram!(Telegram1);
velocity_drive_telegram!(Telegram102);
position_drive_telegram!(Telegram9);
position_drive_telegram!(Telegram111, fault_code, warn_code);

/// Human-readable dump of the current input words, one line per slot,
/// walked through the static schema.
pub fn render_input<T: Telegram>(telegram: &T) -> String {
    let frame = telegram.input_frame();
    let mut out = String::new();
    for info in T::input_schema() {
        if let Ok(value) = info.decode(&frame) {
            match info.kind {
                crate::word::WordKind::Bits => {
                    let _ = writeln!(out, "{:<12} 0x{:04X}", info.name, value as u16);
                }
                _ => {
                    let _ = writeln!(out, "{:<12} {}", info.name, value);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::{BitWord, IntDoubleWord};
    use crate::words::{PositionStatusWord, VelocityStatusWord};

    #[test]
    fn status_maps_the_common_bits() {
        let mut telegram = Telegram111::default();
        telegram.zsw1 = PositionStatusWord::from_int(0x0237);
        let status = telegram.status();
        assert!(status.ready_to_switch_on);
        assert!(status.ready_to_operate);
        assert!(status.operation_enabled);
        assert!(!status.fault_present);
        assert!(status.control_requested);
        assert!(!status.target_reached);

        telegram.zsw1 = PositionStatusWord::from_int(0x0008);
        assert!(telegram.status().fault_present);
    }

    #[test]
    fn target_reached_comes_from_the_layout_specific_bit() {
        let mut velocity = Telegram1::default();
        velocity.zsw1 = VelocityStatusWord::from_int(0x0400);
        assert!(velocity.status().target_reached);

        let mut position = Telegram9::default();
        position.zsw1 = PositionStatusWord::from_int(0x0400);
        assert!(position.status().target_reached);
    }

    #[test]
    fn position_only_bits_stay_false_on_velocity_layouts() {
        let mut position = Telegram111::default();
        // home set | task ack | stopped
        position.zsw1 = PositionStatusWord::from_int(0x0800 | 0x1000 | 0x2000);
        let status = position.status();
        assert!(status.home_position_set);
        assert!(status.traversing_task_ack);
        assert!(status.drive_stopped);

        let mut velocity = Telegram102::default();
        velocity.zsw1 = VelocityStatusWord::from_int(0xFFFF);
        let status = velocity.status();
        assert!(!status.home_position_set);
        assert!(!status.traversing_task_ack);
        assert!(!status.drive_stopped);
    }

    #[test]
    fn basic_enable_sets_the_layout_specific_mask() {
        let mut velocity = Telegram102::default();
        velocity.set_basic_enable(true);
        assert_eq!(velocity.stw1.to_int(), 0x0036);
        velocity.set_basic_enable(false);
        assert_eq!(velocity.stw1.to_int(), 0x0000);

        let mut position = Telegram111::default();
        position.set_basic_enable(true);
        assert_eq!(position.stw1.to_int(), 0x0006);
    }

    #[test]
    fn only_telegram111_reports_diagnostic_codes() {
        let mut telegram = Telegram111::default();
        telegram.fault_code = BitWord::from_int(0x0021);
        telegram.warn_code = BitWord::from_int(0x0007);
        assert_eq!(telegram.fault_code(), Some(0x0021));
        assert_eq!(telegram.warning_code(), Some(0x0007));

        assert_eq!(Telegram9::default().fault_code(), None);
        assert_eq!(Telegram1::default().warning_code(), None);
    }

    #[test]
    fn render_input_lists_every_slot() {
        let mut telegram = Telegram111::default();
        telegram.zsw1 = PositionStatusWord::from_int(0x0237);
        telegram.xist_a = IntDoubleWord::from_int(-42_000);

        let rendered = render_input(&telegram);
        assert!(rendered.contains("ZSW1"));
        assert!(rendered.contains("0x0237"));
        assert!(rendered.contains("XIST_A"));
        assert!(rendered.contains("-42000"));
        assert_eq!(rendered.lines().count(), Telegram111::input_schema().len());
    }
}
