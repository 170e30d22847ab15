//! Fixed-size binary words, the smallest unit of the telegram codec.
//!
//! Every word has an immutable wire size and a little-endian byte
//! representation. Decoding from a slice of any other length is a
//! [`DriveError::LengthMismatch`], never a silent truncation.

use strum_macros::EnumIter;

use crate::error::{DriveError, Result};

/// Reject any buffer whose length differs from the declared word size.
pub(crate) fn check_len(buf: &[u8], expected: usize) -> Result<()> {
    if buf.len() != expected {
        return Err(DriveError::LengthMismatch {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// A fixed-size binary value that can live inside a telegram.
///
/// Implemented by the three generic word variants below and by every named
/// control/status word in [`crate::words`].
pub trait Word: core::fmt::Debug {
    /// Wire size of this word in bytes. Constant per implementor.
    fn byte_len(&self) -> usize;
    /// Encode into a slice of exactly [`Word::byte_len`] bytes.
    fn write_to(&self, dst: &mut [u8]) -> Result<()>;
    /// Decode from a slice of exactly [`Word::byte_len`] bytes.
    fn read_from(&mut self, src: &[u8]) -> Result<()>;
    /// Clear every bit.
    fn reset(&mut self);
}

/// 16 independent boolean flags, two bytes on the wire.
///
/// Used for the telegram slots whose individual bits carry no engine-level
/// meaning (STW2, ZSW2, MELDW, the G1 group, fault/warning codes).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BitWord(pub u16);

impl BitWord {
    pub const LEN: usize = 2;

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        check_len(src, Self::LEN)?;
        Ok(Self(u16::from_le_bytes([src[0], src[1]])))
    }

    /// Raw little-endian integer view.
    pub fn to_int(self) -> u16 {
        self.0
    }

    pub fn from_int(value: u16) -> Self {
        Self(value)
    }

    /// Read flag `bit` (0 = least significant).
    pub fn flag(self, bit: u8) -> bool {
        debug_assert!(bit < 16);
        self.0 & (1 << bit) != 0
    }

    /// Set flag `bit` (0 = least significant).
    pub fn set_flag(&mut self, bit: u8, value: bool) {
        debug_assert!(bit < 16);
        if value {
            self.0 |= 1 << bit;
        } else {
            self.0 &= !(1 << bit);
        }
    }
}

impl Word for BitWord {
    fn byte_len(&self) -> usize {
        Self::LEN
    }

    fn write_to(&self, dst: &mut [u8]) -> Result<()> {
        check_len(dst, Self::LEN)?;
        dst.copy_from_slice(&self.to_bytes());
        Ok(())
    }

    fn read_from(&mut self, src: &[u8]) -> Result<()> {
        *self = Self::from_bytes(src)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Signed 16-bit process value, little-endian on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntWord(pub i16);

impl IntWord {
    pub const LEN: usize = 2;

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        check_len(src, Self::LEN)?;
        Ok(Self(i16::from_le_bytes([src[0], src[1]])))
    }

    pub fn to_int(self) -> i16 {
        self.0
    }

    pub fn from_int(value: i16) -> Self {
        Self(value)
    }
}

impl Word for IntWord {
    fn byte_len(&self) -> usize {
        Self::LEN
    }

    fn write_to(&self, dst: &mut [u8]) -> Result<()> {
        check_len(dst, Self::LEN)?;
        dst.copy_from_slice(&self.to_bytes());
        Ok(())
    }

    fn read_from(&mut self, src: &[u8]) -> Result<()> {
        *self = Self::from_bytes(src)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Signed 32-bit process value, little-endian on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntDoubleWord(pub i32);

impl IntDoubleWord {
    pub const LEN: usize = 4;

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        check_len(src, Self::LEN)?;
        Ok(Self(i32::from_le_bytes([src[0], src[1], src[2], src[3]])))
    }

    pub fn to_int(self) -> i32 {
        self.0
    }

    pub fn from_int(value: i32) -> Self {
        Self(value)
    }
}

impl Word for IntDoubleWord {
    fn byte_len(&self) -> usize {
        Self::LEN
    }

    fn write_to(&self, dst: &mut [u8]) -> Result<()> {
        check_len(dst, Self::LEN)?;
        dst.copy_from_slice(&self.to_bytes());
        Ok(())
    }

    fn read_from(&mut self, src: &[u8]) -> Result<()> {
        *self = Self::from_bytes(src)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Value kind of one slot in a telegram schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum WordKind {
    /// A 16-flag bit word.
    Bits,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
}

/// Static descriptor of one word slot within a telegram byte frame.
///
/// Telegram layouts publish these tables so diagnostic tooling can walk a
/// frame without introspecting the telegram struct.
#[derive(Debug, Clone, Copy)]
pub struct WordInfo {
    pub name: &'static str,
    pub kind: WordKind,
    /// Byte offset of the slot inside the frame.
    pub offset: usize,
    /// Byte length of the slot.
    pub len: usize,
}

impl WordInfo {
    pub const fn bits(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            kind: WordKind::Bits,
            offset,
            len: BitWord::LEN,
        }
    }

    pub const fn int16(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            kind: WordKind::Int16,
            offset,
            len: IntWord::LEN,
        }
    }

    pub const fn int32(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            kind: WordKind::Int32,
            offset,
            len: IntDoubleWord::LEN,
        }
    }

    /// Integer view of this slot in `frame`.
    pub fn decode(&self, frame: &[u8]) -> Result<i64> {
        let src = frame
            .get(self.offset..self.offset + self.len)
            .ok_or(DriveError::LengthMismatch {
                expected: self.offset + self.len,
                actual: frame.len(),
            })?;
        Ok(match self.kind {
            WordKind::Bits => BitWord::from_bytes(src)?.to_int() as i64,
            WordKind::Int16 => IntWord::from_bytes(src)?.to_int() as i64,
            WordKind::Int32 => IntDoubleWord::from_bytes(src)?.to_int() as i64,
        })
    }
}
