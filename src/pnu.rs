//! Typed parameter access on top of the raw mailbox payloads.
//!
//! Raw payloads are little-endian byte strings; this module maps them to
//! and from the scalar types the drive documentation talks about. The
//! driver layer already collapses transport errors to `Option`/`bool`, the
//! typed layer only adds the length check.

use crate::driver::CyclicDriver;

/// PNU selecting the active telegram layout.
pub const TELEGRAM_SELECTOR: u16 = 3490;

/// A scalar that travels as a mailbox payload.
pub trait PnuValue: Sized + Copy {
    /// Wire size in bytes.
    const LEN: usize;
    fn to_payload(self) -> Vec<u8>;
    fn from_payload(payload: &[u8]) -> Option<Self>;
}

// All the numeric formats of the parameter dictionary share one shape:
// little-endian, size of the Rust type. Longer payloads keep their prefix,
// drives pad reads up to even register counts.
macro_rules! pnu_value_impl {
    ($($ty:ty),* $(,)?) => {
        $(impl PnuValue for $ty {
            const LEN: usize = core::mem::size_of::<$ty>();

            fn to_payload(self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }

            fn from_payload(payload: &[u8]) -> Option<Self> {
                let bytes = payload.get(..Self::LEN)?;
                Some(Self::from_le_bytes(bytes.try_into().ok()?))
            }
        })*
    };
}

pnu_value_impl!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// Typed parameter read. `None` on transport failure or a payload shorter
/// than the requested type.
pub fn read_pnu<V: PnuValue>(driver: &mut impl CyclicDriver, pnu: u16, subindex: u8) -> Option<V> {
    let payload = driver.read_pnu_raw(pnu, subindex, 1)?;
    let value = V::from_payload(&payload);
    if value.is_none() {
        log::warn!(
            "pnu {pnu}.{subindex}: expected {} bytes, drive sent {}",
            V::LEN,
            payload.len()
        );
    }
    value
}

/// Typed parameter write. `false` on transport failure.
pub fn write_pnu<V: PnuValue>(
    driver: &mut impl CyclicDriver,
    pnu: u16,
    subindex: u8,
    value: V,
) -> bool {
    driver.write_pnu_raw(pnu, subindex, 1, &value.to_payload())
}

/// Visible-string parameter, terminated at the first NUL.
pub fn read_pnu_string(
    driver: &mut impl CyclicDriver,
    pnu: u16,
    subindex: u8,
    num_elements: u8,
) -> Option<String> {
    let payload = driver.read_pnu_raw(pnu, subindex, num_elements)?;
    let end = payload
        .iter()
        .position(|&byte| byte == 0)
        .unwrap_or(payload.len());
    Some(String::from_utf8_lossy(&payload[..end]).into_owned())
}
