//! LEB128 length prefixes.

use crate::error::{CodecError, CodecResult};
use bytes::{Buf, BufMut};

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Appends `value` as an unsigned LEB128 varint.
pub fn put_varint(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let low = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(low);
            return;
        }
        buf.put_u8(low | 0x80);
    }
}

/// Reads an unsigned LEB128 varint, advancing `buf`.
///
/// # Errors
///
/// Returns `UnexpectedEof` if the input ends mid-varint and
/// `VarintOverflow` if the value exceeds 64 bits.
pub fn get_varint(buf: &mut impl Buf) -> CodecResult<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(CodecError::UnexpectedEof);
        }
        let byte = buf.get_u8();
        let low = u64::from(byte & 0x7f);
        // The tenth byte may only carry the top bit of a u64
        if i == MAX_VARINT_LEN - 1 && low > 1 {
            return Err(CodecError::VarintOverflow);
        }
        value |= low << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(CodecError::VarintOverflow)
}
