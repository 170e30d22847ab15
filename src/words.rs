//! Named control and status words of the telegram profile.
//!
//! Each word is a 16-bit little-endian bitfield. Control words and status
//! words are distinct types even where bits line up, and the velocity
//! telegrams (1, 102) interpret STW1/ZSW1 bits 4..6 and 8..13 differently
//! than the position telegrams (9, 111), hence the two variants of each.
//!
//! Slots whose bits the engine never touches (STW2, ZSW2, MELDW, the G1
//! encoder group, fault and warning codes) use the generic
//! [`BitWord`](crate::word::BitWord) instead of a named type here.

use modular_bitfield::prelude::*;

/// Implements [`Word`](crate::word::Word) plus the integer view for a
/// two-byte bitfield struct.
macro_rules! bitword_codec {
    ($word:ty) => {
        impl Default for $word {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $word {
            pub const LEN: usize = 2;

            /// Raw little-endian integer view.
            pub fn to_int(&self) -> u16 {
                u16::from_le_bytes((*self).into_bytes())
            }

            pub fn from_int(value: u16) -> Self {
                Self::from_bytes(value.to_le_bytes())
            }
        }

        impl crate::word::Word for $word {
            fn byte_len(&self) -> usize {
                Self::LEN
            }

            fn write_to(&self, dst: &mut [u8]) -> crate::error::Result<()> {
                crate::word::check_len(dst, Self::LEN)?;
                dst.copy_from_slice(&(*self).into_bytes());
                Ok(())
            }

            fn read_from(&mut self, src: &[u8]) -> crate::error::Result<()> {
                crate::word::check_len(src, Self::LEN)?;
                *self = Self::from_bytes([src[0], src[1]]);
                Ok(())
            }

            fn reset(&mut self) {
                *self = Self::new();
            }
        }
    };
}

/// STW1 of the velocity telegrams (1, 102).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VelocityControlWord {
    /// Bit 0 - switch the powerstage on (OFF1 inactive).
    pub on: bool,
    /// Bit 1 - do not coast to standstill (OFF2 inactive).
    pub no_coast_stop: bool,
    /// Bit 2 - no quick stop (OFF3 inactive).
    pub no_quick_stop: bool,
    /// Bit 3 - enable operation.
    pub enable_operation: bool,
    /// Bit 4 - enable the ramp generator.
    pub enable_ramp_generator: bool,
    /// Bit 5 - unfreeze the ramp generator.
    pub unfreeze_ramp_generator: bool,
    /// Bit 6 - release the speed setpoint.
    pub setpoint_enable: bool,
    /// Bit 7 - acknowledge faults on a rising edge.
    pub fault_ack: bool,
    /// Bit 8 - jog in positive direction.
    pub jog_positive: bool,
    /// Bit 9 - jog in negative direction.
    pub jog_negative: bool,
    /// Bit 10 - hand control to the PLC (this stack).
    pub control_by_plc: bool,
    /// Bit 11 - invert the setpoint sign.
    pub setpoint_inversion: bool,
    #[skip]
    __: B1,
    /// Bit 13 - motorized potentiometer raise.
    pub motor_pot_raise: bool,
    /// Bit 14 - motorized potentiometer lower.
    pub motor_pot_lower: bool,
    #[skip]
    __: B1,
}
bitword_codec!(VelocityControlWord);

/// ZSW1 of the velocity telegrams (1, 102).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VelocityStatusWord {
    /// Bit 0 - ready to switch on.
    pub ready_to_switch_on: bool,
    /// Bit 1 - ready to operate.
    pub ready_to_operate: bool,
    /// Bit 2 - operation enabled, powerstage active.
    pub operation_enabled: bool,
    /// Bit 3 - a fault is present.
    pub fault_present: bool,
    /// Bit 4 - coast stop not activated.
    pub coast_stop_inactive: bool,
    /// Bit 5 - quick stop not activated.
    pub quick_stop_inactive: bool,
    /// Bit 6 - switching on inhibited.
    pub switching_on_inhibited: bool,
    /// Bit 7 - a warning is present.
    pub warning_present: bool,
    /// Bit 8 - speed error within tolerance window.
    pub speed_within_tolerance: bool,
    /// Bit 9 - the drive accepts control from this controller.
    pub control_requested: bool,
    /// Bit 10 - speed setpoint reached or exceeded.
    pub setpoint_reached: bool,
    /// Bit 11 - torque limit reached.
    pub torque_limit_reached: bool,
    /// Bit 12 - holding brake released.
    pub holding_brake_released: bool,
    /// Bit 13 - no motor overtemperature alarm.
    pub no_motor_overtemperature: bool,
    #[skip]
    __: B2,
}
bitword_codec!(VelocityStatusWord);

/// STW1 of the position telegrams (9, 111).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionControlWord {
    /// Bit 0 - switch the powerstage on (OFF1 inactive).
    pub on: bool,
    /// Bit 1 - do not coast to standstill (OFF2 inactive).
    pub no_coast_stop: bool,
    /// Bit 2 - no quick stop (OFF3 inactive).
    pub no_quick_stop: bool,
    /// Bit 3 - enable operation.
    pub enable_operation: bool,
    /// Bit 4 - do not reject the traversing task.
    pub do_not_reject_traversing_task: bool,
    /// Bit 5 - no intermediate stop.
    pub no_intermediate_stop: bool,
    /// Bit 6 - start the traversing task on a rising edge.
    pub activate_traversing_task: bool,
    /// Bit 7 - acknowledge faults on a rising edge.
    pub fault_ack: bool,
    /// Bit 8 - jog in positive direction.
    pub jog_positive: bool,
    /// Bit 9 - jog in negative direction.
    pub jog_negative: bool,
    /// Bit 10 - hand control to the PLC (this stack).
    pub control_by_plc: bool,
    /// Bit 11 - start the homing procedure.
    pub start_homing: bool,
    #[skip]
    __: B4,
}
bitword_codec!(PositionControlWord);

/// ZSW1 of the position telegrams (9, 111).
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionStatusWord {
    /// Bit 0 - ready to switch on.
    pub ready_to_switch_on: bool,
    /// Bit 1 - ready to operate.
    pub ready_to_operate: bool,
    /// Bit 2 - operation enabled, powerstage active.
    pub operation_enabled: bool,
    /// Bit 3 - a fault is present.
    pub fault_present: bool,
    /// Bit 4 - coast stop not activated.
    pub coast_stop_inactive: bool,
    /// Bit 5 - quick stop not activated.
    pub quick_stop_inactive: bool,
    /// Bit 6 - switching on inhibited.
    pub switching_on_inhibited: bool,
    /// Bit 7 - a warning is present.
    pub warning_present: bool,
    /// Bit 8 - following error within tolerance window.
    pub following_error_in_tolerance: bool,
    /// Bit 9 - the drive accepts control from this controller.
    pub control_requested: bool,
    /// Bit 10 - target position reached.
    pub target_position_reached: bool,
    /// Bit 11 - home position set.
    pub home_position_set: bool,
    /// Bit 12 - traversing task acknowledged.
    pub traversing_task_ack: bool,
    /// Bit 13 - drive stopped.
    pub drive_stopped: bool,
    #[skip]
    __: B2,
}
bitword_codec!(PositionStatusWord);

/// POS_STW1 of telegram 111: MDI task shaping.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosControlWord1 {
    #[skip]
    __: B8,
    /// Bit 8 - transfer setpoint changes continuously instead of per edge.
    pub continuous_update: bool,
    /// Bit 9 - absolute positioning (relative when clear).
    pub absolute_positioning: bool,
    /// Bit 10 - positive direction for modulo positioning.
    pub direction_positive: bool,
    /// Bit 11 - negative direction for modulo positioning.
    pub direction_negative: bool,
    /// Bit 12 - setup mode.
    pub setup_mode: bool,
    #[skip]
    __: B2,
    /// Bit 15 - select the MDI interface.
    pub activate_mdi: bool,
}
bitword_codec!(PosControlWord1);

/// POS_STW2 of telegram 111: homing and jog shaping.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosControlWord2 {
    /// Bit 0 - tracking mode.
    pub tracking_mode: bool,
    /// Bit 1 - set the reference point here.
    pub set_reference_point: bool,
    /// Bit 2 - reference cam active.
    pub reference_cam_active: bool,
    #[skip]
    __: B2,
    /// Bit 5 - jog in fixed increments instead of continuously.
    pub jog_incremental: bool,
    #[skip]
    __: B10,
}
bitword_codec!(PosControlWord2);

/// SATZANW of telegram 9: traversing block selector.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversingBlockWord {
    /// Bits 0..6 - number of the preset traversing block to run.
    pub record_number: B7,
    #[skip]
    __: B8,
    /// Bit 15 - select the MDI interface instead of preset blocks.
    pub mdi_active: bool,
}
bitword_codec!(TraversingBlockWord);

/// MDI_MOD of telegram 9: positioning mode of a direct setpoint.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MdiModeWord {
    /// Bit 0 - absolute positioning (relative when clear).
    pub absolute: bool,
    /// Bit 1 - positive direction for modulo positioning.
    pub direction_positive: bool,
    /// Bit 2 - negative direction for modulo positioning.
    pub direction_negative: bool,
    #[skip]
    __: B13,
}
bitword_codec!(MdiModeWord);
