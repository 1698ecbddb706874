//! Primitive integer and string representations, RFC 7541 §5.
//!
//! ```text
//!   0   1   2   3   4   5   6   7
//! +---+---+---+---+---+---+---+---+
//! | ? | ? | ? |       Value       |   N-bit prefix integer
//! +---+---+---+-------------------+
//! | 1 |    Value-(2^N-1) LSB      |   continuation while >= 128
//! +---+---------------------------+
//! | 0 |    Value-(2^N-1) MSB      |
//! +---+---------------------------+
//!
//! +---+---+---+---+---+---+---+---+
//! | H |    String Length (7+)     |   string literal
//! +---+---------------------------+
//! |  String Data (Length octets)  |
//! +-------------------------------+
//! ```
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::hpack::error::HpackError;
use crate::hpack::huffman;

/// Encode `value` under `pattern` with a `prefix`-bit prefix.
pub(crate) fn encode_int(value: usize, prefix: u8, pattern: u8, out: &mut BytesMut) {
    debug_assert!((1..=7).contains(&prefix));

    let mask = (1usize << prefix) - 1;
    if value < mask {
        out.put_u8(pattern | value as u8);
        return;
    }

    out.put_u8(pattern | mask as u8);
    let mut rest = value - mask;
    while rest >= 128 {
        out.put_u8(0x80 | (rest % 128) as u8);
        rest /= 128;
    }
    out.put_u8(rest as u8);
}

/// Decode a `prefix`-bit integer whose first byte is `first`.
pub(crate) fn decode_int(bytes: &mut Bytes, prefix: u8, first: u8) -> Result<usize, HpackError> {
    debug_assert!((1..=7).contains(&prefix));

    let mask = ((1usize << prefix) - 1) as u8;
    let head = first & mask;
    if head < mask {
        return Ok(head as usize);
    }

    let mut value = head as usize;
    let mut shift = 0u32;
    loop {
        if bytes.is_empty() {
            return Err(HpackError::Incomplete);
        }
        let byte = bytes.get_u8();

        let chunk = ((byte & 0x7f) as usize)
            .checked_shl(shift)
            .ok_or(HpackError::IntegerOverflow)?;
        value = value
            .checked_add(chunk)
            .ok_or(HpackError::IntegerOverflow)?;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok(value);
        }
        if shift > usize::BITS {
            return Err(HpackError::IntegerOverflow);
        }
    }
}

/// Encode a string literal, Huffman-coded when `huffman_coded`.
pub(crate) fn encode_string(string: &[u8], huffman_coded: bool, out: &mut BytesMut) {
    if huffman_coded {
        encode_int(huffman::encoded_length(string), 7, 0x80, out);
        huffman::encode(string, out);
    } else {
        encode_int(string.len(), 7, 0x00, out);
        out.put_slice(string);
    }
}

/// Decode a string literal.
pub(crate) fn decode_string(bytes: &mut Bytes) -> Result<String, HpackError> {
    if bytes.is_empty() {
        return Err(HpackError::Incomplete);
    }
    let first = bytes.get_u8();
    let is_huffman = first & 0x80 != 0;
    let len = decode_int(bytes, 7, first)?;

    if bytes.remaining() < len {
        return Err(HpackError::Incomplete);
    }
    let raw = bytes.split_to(len);

    let text = if is_huffman {
        let mut buf = BytesMut::new();
        huffman::decode(&raw, &mut buf)?;
        buf.to_vec()
    } else {
        raw.to_vec()
    };
    String::from_utf8(text).map_err(|_| HpackError::InvalidString)
}
