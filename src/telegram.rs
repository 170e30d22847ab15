//! The four fixed telegram layouts and their byte-exact (de)serialization.
//!
//! A telegram is an ordered list of output words and an ordered list of
//! input words. Output and input words are disjoint objects even where they
//! pair up semantically (STW1 vs. ZSW1). The total byte length of each
//! direction is fixed per layout and never changes after construction; the
//! per-word byte offsets are part of the external wire contract.

use crate::error::Result;
use crate::word::{check_len, BitWord, IntDoubleWord, IntWord, Word, WordInfo};
use crate::words::{
    MdiModeWord, PosControlWord1, PosControlWord2, PositionControlWord, PositionStatusWord,
    TraversingBlockWord, VelocityControlWord, VelocityStatusWord,
};

/// Upper bound over all layouts; telegram 111 needs 22 bytes per direction.
pub const MAX_TELEGRAM_LEN: usize = 32;

/// Fixed-capacity byte frame of one telegram direction.
pub type TelegramBytes = heapless::Vec<u8, MAX_TELEGRAM_LEN>;

/// One fixed process-data layout exchanged cyclically with the drive.
pub trait Telegram: Default {
    /// Profile number of this layout, as written to the selector PNU.
    const NUMBER: u16;
    /// Fixed byte length of the output (controller to drive) frame.
    const OUTPUT_LEN: usize;
    /// Fixed byte length of the input (drive to controller) frame.
    const INPUT_LEN: usize;

    /// Output words in wire order.
    fn output_words(&self) -> Vec<&dyn Word>;
    fn output_words_mut(&mut self) -> Vec<&mut dyn Word>;
    /// Input words in wire order.
    fn input_words(&self) -> Vec<&dyn Word>;
    fn input_words_mut(&mut self) -> Vec<&mut dyn Word>;

    /// Static layout of the output frame.
    fn output_schema() -> &'static [WordInfo];
    /// Static layout of the input frame.
    fn input_schema() -> &'static [WordInfo];

    /// Concatenate the output words in declaration order.
    fn output_bytes(&self) -> TelegramBytes {
        serialize_words(&self.output_words(), Self::OUTPUT_LEN)
    }

    /// Re-serialized view of the current input words, for diagnostics.
    fn input_frame(&self) -> TelegramBytes {
        serialize_words(&self.input_words(), Self::INPUT_LEN)
    }

    /// Decode a received frame into the input words.
    ///
    /// The frame is sliced into the fixed, contiguous per-word ranges of
    /// this layout; any other total length is a
    /// [`LengthMismatch`](crate::error::DriveError::LengthMismatch).
    fn input_bytes(&mut self, data: &[u8]) -> Result<()> {
        check_len(data, Self::INPUT_LEN)?;
        let mut offset = 0;
        for word in self.input_words_mut() {
            let len = word.byte_len();
            word.read_from(&data[offset..offset + len])?;
            offset += len;
        }
        Ok(())
    }

    /// Zero every output and input word.
    fn reset(&mut self) {
        for word in self.output_words_mut() {
            word.reset();
        }
        for word in self.input_words_mut() {
            word.reset();
        }
    }
}

fn serialize_words(words: &[&dyn Word], total: usize) -> TelegramBytes {
    let mut frame = TelegramBytes::new();
    frame
        .resize_default(total)
        .expect("telegram layout exceeds MAX_TELEGRAM_LEN");
    let mut offset = 0;
    for word in words {
        let len = word.byte_len();
        word.write_to(&mut frame[offset..offset + len])
            .expect("slot sized by byte_len");
        offset += len;
    }
    debug_assert_eq!(offset, total);
    frame
}

/// Telegram 1: minimal velocity control with a 16-bit speed setpoint.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Telegram1 {
    // outputs
    pub stw1: VelocityControlWord,
    pub nsoll_a: IntWord,
    // inputs
    pub zsw1: VelocityStatusWord,
    pub nist_a: IntWord,
}

const T1_OUTPUT: &[WordInfo] = &[WordInfo::bits("STW1", 0), WordInfo::int16("NSOLL_A", 2)];
const T1_INPUT: &[WordInfo] = &[WordInfo::bits("ZSW1", 0), WordInfo::int16("NIST_A", 2)];

impl Telegram for Telegram1 {
    const NUMBER: u16 = 1;
    const OUTPUT_LEN: usize = 4;
    const INPUT_LEN: usize = 4;

    fn output_words(&self) -> Vec<&dyn Word> {
        vec![&self.stw1, &self.nsoll_a]
    }

    fn output_words_mut(&mut self) -> Vec<&mut dyn Word> {
        vec![&mut self.stw1, &mut self.nsoll_a]
    }

    fn input_words(&self) -> Vec<&dyn Word> {
        vec![&self.zsw1, &self.nist_a]
    }

    fn input_words_mut(&mut self) -> Vec<&mut dyn Word> {
        vec![&mut self.zsw1, &mut self.nist_a]
    }

    fn output_schema() -> &'static [WordInfo] {
        T1_OUTPUT
    }

    fn input_schema() -> &'static [WordInfo] {
        T1_INPUT
    }
}

/// Telegram 102: extended velocity control with a 32-bit speed setpoint,
/// torque reduction and the encoder status group.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Telegram102 {
    // outputs
    pub stw1: VelocityControlWord,
    pub nsoll_b: IntDoubleWord,
    pub stw2: BitWord,
    pub momred: IntWord,
    pub g1_stw: BitWord,
    // inputs
    pub zsw1: VelocityStatusWord,
    pub nist_b: IntDoubleWord,
    pub zsw2: BitWord,
    pub meldw: BitWord,
    pub g1_zsw: BitWord,
    pub g1_xist1: IntDoubleWord,
    pub g1_xist2: IntDoubleWord,
}

const T102_OUTPUT: &[WordInfo] = &[
    WordInfo::bits("STW1", 0),
    WordInfo::int32("NSOLL_B", 2),
    WordInfo::bits("STW2", 6),
    WordInfo::int16("MOMRED", 8),
    WordInfo::bits("G1_STW", 10),
];
const T102_INPUT: &[WordInfo] = &[
    WordInfo::bits("ZSW1", 0),
    WordInfo::int32("NIST_B", 2),
    WordInfo::bits("ZSW2", 6),
    WordInfo::bits("MELDW", 8),
    WordInfo::bits("G1_ZSW", 10),
    WordInfo::int32("G1_XIST1", 12),
    WordInfo::int32("G1_XIST2", 16),
];

impl Telegram for Telegram102 {
    const NUMBER: u16 = 102;
    const OUTPUT_LEN: usize = 12;
    const INPUT_LEN: usize = 20;

    fn output_words(&self) -> Vec<&dyn Word> {
        vec![
            &self.stw1,
            &self.nsoll_b,
            &self.stw2,
            &self.momred,
            &self.g1_stw,
        ]
    }

    fn output_words_mut(&mut self) -> Vec<&mut dyn Word> {
        vec![
            &mut self.stw1,
            &mut self.nsoll_b,
            &mut self.stw2,
            &mut self.momred,
            &mut self.g1_stw,
        ]
    }

    fn input_words(&self) -> Vec<&dyn Word> {
        vec![
            &self.zsw1,
            &self.nist_b,
            &self.zsw2,
            &self.meldw,
            &self.g1_zsw,
            &self.g1_xist1,
            &self.g1_xist2,
        ]
    }

    fn input_words_mut(&mut self) -> Vec<&mut dyn Word> {
        vec![
            &mut self.zsw1,
            &mut self.nist_b,
            &mut self.zsw2,
            &mut self.meldw,
            &mut self.g1_zsw,
            &mut self.g1_xist1,
            &mut self.g1_xist2,
        ]
    }

    fn output_schema() -> &'static [WordInfo] {
        T102_OUTPUT
    }

    fn input_schema() -> &'static [WordInfo] {
        T102_INPUT
    }
}

/// Telegram 9: position control through preset traversing blocks, with the
/// block selector word and direct setpoint fields.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Telegram9 {
    // outputs
    pub stw1: PositionControlWord,
    pub satzanw: TraversingBlockWord,
    pub stw2: BitWord,
    pub mdi_tarpos: IntDoubleWord,
    pub mdi_velocity: IntDoubleWord,
    pub mdi_acc: IntWord,
    pub mdi_dec: IntWord,
    pub mdi_mod: MdiModeWord,
    // inputs
    pub zsw1: PositionStatusWord,
    pub aktsatz: TraversingBlockWord,
    pub zsw2: BitWord,
    pub xist_a: IntDoubleWord,
}

const T9_OUTPUT: &[WordInfo] = &[
    WordInfo::bits("STW1", 0),
    WordInfo::bits("SATZANW", 2),
    WordInfo::bits("STW2", 4),
    WordInfo::int32("MDI_TARPOS", 6),
    WordInfo::int32("MDI_VELOCITY", 10),
    WordInfo::int16("MDI_ACC", 14),
    WordInfo::int16("MDI_DEC", 16),
    WordInfo::bits("MDI_MOD", 18),
];
const T9_INPUT: &[WordInfo] = &[
    WordInfo::bits("ZSW1", 0),
    WordInfo::bits("AKTSATZ", 2),
    WordInfo::bits("ZSW2", 4),
    WordInfo::int32("XIST_A", 6),
];

impl Telegram for Telegram9 {
    const NUMBER: u16 = 9;
    const OUTPUT_LEN: usize = 20;
    const INPUT_LEN: usize = 10;

    fn output_words(&self) -> Vec<&dyn Word> {
        vec![
            &self.stw1,
            &self.satzanw,
            &self.stw2,
            &self.mdi_tarpos,
            &self.mdi_velocity,
            &self.mdi_acc,
            &self.mdi_dec,
            &self.mdi_mod,
        ]
    }

    fn output_words_mut(&mut self) -> Vec<&mut dyn Word> {
        vec![
            &mut self.stw1,
            &mut self.satzanw,
            &mut self.stw2,
            &mut self.mdi_tarpos,
            &mut self.mdi_velocity,
            &mut self.mdi_acc,
            &mut self.mdi_dec,
            &mut self.mdi_mod,
        ]
    }

    fn input_words(&self) -> Vec<&dyn Word> {
        vec![&self.zsw1, &self.aktsatz, &self.zsw2, &self.xist_a]
    }

    fn input_words_mut(&mut self) -> Vec<&mut dyn Word> {
        vec![
            &mut self.zsw1,
            &mut self.aktsatz,
            &mut self.zsw2,
            &mut self.xist_a,
        ]
    }

    fn output_schema() -> &'static [WordInfo] {
        T9_OUTPUT
    }

    fn input_schema() -> &'static [WordInfo] {
        T9_INPUT
    }
}

/// Telegram 111: position control with a free target (MDI), velocity
/// override and fault/warning code feedback.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Telegram111 {
    // outputs
    pub stw1: PositionControlWord,
    pub pos_stw1: PosControlWord1,
    pub pos_stw2: PosControlWord2,
    pub stw2: BitWord,
    pub override_velocity: IntWord,
    pub mdi_tarpos: IntDoubleWord,
    pub mdi_velocity: IntDoubleWord,
    pub mdi_acc: IntWord,
    pub mdi_dec: IntWord,
    // inputs
    pub zsw1: PositionStatusWord,
    pub pos_zsw1: BitWord,
    pub pos_zsw2: BitWord,
    pub zsw2: BitWord,
    pub meldw: BitWord,
    pub xist_a: IntDoubleWord,
    pub nist_b: IntDoubleWord,
    pub fault_code: BitWord,
    pub warn_code: BitWord,
}

const T111_OUTPUT: &[WordInfo] = &[
    WordInfo::bits("STW1", 0),
    WordInfo::bits("POS_STW1", 2),
    WordInfo::bits("POS_STW2", 4),
    WordInfo::bits("STW2", 6),
    WordInfo::int16("OVERRIDE", 8),
    WordInfo::int32("MDI_TARPOS", 10),
    WordInfo::int32("MDI_VELOCITY", 14),
    WordInfo::int16("MDI_ACC", 18),
    WordInfo::int16("MDI_DEC", 20),
];
const T111_INPUT: &[WordInfo] = &[
    WordInfo::bits("ZSW1", 0),
    WordInfo::bits("POS_ZSW1", 2),
    WordInfo::bits("POS_ZSW2", 4),
    WordInfo::bits("ZSW2", 6),
    WordInfo::bits("MELDW", 8),
    WordInfo::int32("XIST_A", 10),
    WordInfo::int32("NIST_B", 14),
    WordInfo::bits("FAULT_CODE", 18),
    WordInfo::bits("WARN_CODE", 20),
];

impl Telegram for Telegram111 {
    const NUMBER: u16 = 111;
    const OUTPUT_LEN: usize = 22;
    const INPUT_LEN: usize = 22;

    fn output_words(&self) -> Vec<&dyn Word> {
        vec![
            &self.stw1,
            &self.pos_stw1,
            &self.pos_stw2,
            &self.stw2,
            &self.override_velocity,
            &self.mdi_tarpos,
            &self.mdi_velocity,
            &self.mdi_acc,
            &self.mdi_dec,
        ]
    }

    fn output_words_mut(&mut self) -> Vec<&mut dyn Word> {
        vec![
            &mut self.stw1,
            &mut self.pos_stw1,
            &mut self.pos_stw2,
            &mut self.stw2,
            &mut self.override_velocity,
            &mut self.mdi_tarpos,
            &mut self.mdi_velocity,
            &mut self.mdi_acc,
            &mut self.mdi_dec,
        ]
    }

    fn input_words(&self) -> Vec<&dyn Word> {
        vec![
            &self.zsw1,
            &self.pos_zsw1,
            &self.pos_zsw2,
            &self.zsw2,
            &self.meldw,
            &self.xist_a,
            &self.nist_b,
            &self.fault_code,
            &self.warn_code,
        ]
    }

    fn input_words_mut(&mut self) -> Vec<&mut dyn Word> {
        vec![
            &mut self.zsw1,
            &mut self.pos_zsw1,
            &mut self.pos_zsw2,
            &mut self.zsw2,
            &mut self.meldw,
            &mut self.xist_a,
            &mut self.nist_b,
            &mut self.fault_code,
            &mut self.warn_code,
        ]
    }

    fn output_schema() -> &'static [WordInfo] {
        T111_OUTPUT
    }

    fn input_schema() -> &'static [WordInfo] {
        T111_INPUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_lengths_are_invariant_under_mutation() {
        let mut telegram = Telegram111::default();
        assert_eq!(telegram.output_bytes().len(), Telegram111::OUTPUT_LEN);

        telegram.stw1 = PositionControlWord::from_int(0xFFFF);
        telegram.mdi_tarpos = IntDoubleWord::from_int(i32::MIN);
        telegram.mdi_velocity = IntDoubleWord::from_int(i32::MAX);
        telegram.override_velocity = IntWord::from_int(-1);
        assert_eq!(telegram.output_bytes().len(), Telegram111::OUTPUT_LEN);

        let mut telegram = Telegram1::default();
        telegram.nsoll_a = IntWord::from_int(i16::MIN);
        assert_eq!(telegram.output_bytes().len(), Telegram1::OUTPUT_LEN);

        let mut telegram = Telegram9::default();
        telegram.mdi_tarpos = IntDoubleWord::from_int(123_456);
        assert_eq!(telegram.output_bytes().len(), Telegram9::OUTPUT_LEN);

        let mut telegram = Telegram102::default();
        telegram.nsoll_b = IntDoubleWord::from_int(-42);
        assert_eq!(telegram.output_bytes().len(), Telegram102::OUTPUT_LEN);
    }

    #[test]
    fn telegram111_output_offsets_are_byte_exact() {
        let mut telegram = Telegram111::default();
        telegram.stw1 = PositionControlWord::from_int(0x0447);
        telegram.pos_stw1 = PosControlWord1::from_int(0x8200);
        telegram.override_velocity = IntWord::from_int(0x4000);
        telegram.mdi_tarpos = IntDoubleWord::from_int(10_000);
        telegram.mdi_velocity = IntDoubleWord::from_int(600_000);
        telegram.mdi_acc = IntWord::from_int(0x4000);
        telegram.mdi_dec = IntWord::from_int(0x4000);

        let bytes = telegram.output_bytes();
        assert_eq!(
            bytes.as_slice(),
            &[
                0x47, 0x04, // STW1
                0x00, 0x82, // POS_STW1
                0x00, 0x00, // POS_STW2
                0x00, 0x00, // STW2
                0x00, 0x40, // OVERRIDE
                0x10, 0x27, 0x00, 0x00, // MDI_TARPOS = 10000
                0xC0, 0x27, 0x09, 0x00, // MDI_VELOCITY = 600000
                0x00, 0x40, // MDI_ACC
                0x00, 0x40, // MDI_DEC
            ]
        );
    }

    #[test]
    fn telegram111_input_offsets_are_byte_exact() {
        let mut data = [0u8; Telegram111::INPUT_LEN];
        data[0] = 0x01; // ZSW1 bit 0
        data[10..14].copy_from_slice(&10_000i32.to_le_bytes()); // XIST_A
        data[14..18].copy_from_slice(&(-250i32).to_le_bytes()); // NIST_B
        data[18] = 0x21; // FAULT_CODE
        data[20] = 0x07; // WARN_CODE

        let mut telegram = Telegram111::default();
        telegram.input_bytes(&data).unwrap();

        assert!(telegram.zsw1.ready_to_switch_on());
        assert_eq!(telegram.xist_a.to_int(), 10_000);
        assert_eq!(telegram.nist_b.to_int(), -250);
        assert_eq!(telegram.fault_code.to_int(), 0x21);
        assert_eq!(telegram.warn_code.to_int(), 0x07);
    }

    #[test]
    fn bit0_only_frame_leaves_every_other_field_zero() {
        let mut data = [0u8; Telegram111::INPUT_LEN];
        data[0] = 0x01;

        let mut telegram = Telegram111::default();
        telegram.input_bytes(&data).unwrap();

        assert!(telegram.zsw1.ready_to_switch_on());
        assert_eq!(telegram.zsw1.to_int(), 0x0001);
        assert_eq!(telegram.pos_zsw1.to_int(), 0);
        assert_eq!(telegram.pos_zsw2.to_int(), 0);
        assert_eq!(telegram.zsw2.to_int(), 0);
        assert_eq!(telegram.meldw.to_int(), 0);
        assert_eq!(telegram.xist_a.to_int(), 0);
        assert_eq!(telegram.nist_b.to_int(), 0);
        assert_eq!(telegram.fault_code.to_int(), 0);
        assert_eq!(telegram.warn_code.to_int(), 0);
    }

    #[test]
    fn input_bytes_rejects_wrong_total_length() {
        let mut telegram = Telegram111::default();
        assert!(telegram.input_bytes(&[0u8; 21]).is_err());
        assert!(telegram.input_bytes(&[0u8; 23]).is_err());

        let mut telegram = Telegram1::default();
        assert!(telegram.input_bytes(&[0u8; 3]).is_err());
    }

    #[test]
    fn input_bytes_is_repeatable() {
        let mut data = [0u8; Telegram102::INPUT_LEN];
        data[0] = 0x37;
        data[2..6].copy_from_slice(&5_000i32.to_le_bytes());

        let mut telegram = Telegram102::default();
        telegram.input_bytes(&data).unwrap();
        let first = telegram.clone();
        telegram.input_bytes(&data).unwrap();
        assert_eq!(telegram, first);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut telegram = Telegram9::default();
        telegram.stw1 = PositionControlWord::from_int(0xFFFF);
        telegram.satzanw = TraversingBlockWord::from_int(0x8031);
        telegram.mdi_tarpos = IntDoubleWord::from_int(-1);
        telegram
            .input_bytes(&[0xFFu8; Telegram9::INPUT_LEN])
            .unwrap();

        telegram.reset();
        let zeroed = telegram.clone();
        telegram.reset();
        assert_eq!(telegram, zeroed);
        assert_eq!(telegram, Telegram9::default());
        assert!(telegram.output_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn schemas_cover_the_frames_contiguously() {
        fn check(schema: &[WordInfo], total: usize) {
            let mut offset = 0;
            for info in schema {
                assert_eq!(info.offset, offset, "gap before {}", info.name);
                offset += info.len;
            }
            assert_eq!(offset, total);
        }
        check(Telegram1::output_schema(), Telegram1::OUTPUT_LEN);
        check(Telegram1::input_schema(), Telegram1::INPUT_LEN);
        check(Telegram9::output_schema(), Telegram9::OUTPUT_LEN);
        check(Telegram9::input_schema(), Telegram9::INPUT_LEN);
        check(Telegram102::output_schema(), Telegram102::OUTPUT_LEN);
        check(Telegram102::input_schema(), Telegram102::INPUT_LEN);
        check(Telegram111::output_schema(), Telegram111::OUTPUT_LEN);
        check(Telegram111::input_schema(), Telegram111::INPUT_LEN);
    }

    #[test]
    fn schema_decodes_match_the_words() {
        let mut telegram = Telegram111::default();
        telegram.mdi_tarpos = IntDoubleWord::from_int(77_000);
        let frame = telegram.output_bytes();
        let slot = Telegram111::output_schema()
            .iter()
            .find(|info| info.name == "MDI_TARPOS")
            .unwrap();
        assert_eq!(slot.decode(&frame).unwrap(), 77_000);
    }
}
