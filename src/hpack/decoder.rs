use bytes::{Buf, Bytes};

use crate::hpack::error::HpackError;
use crate::hpack::repr;
use crate::hpack::table::HpackContext;

//   0   1   2   3   4   5   6   7
// +---+---+---+---+---+---+---+---+
// | 1 |        Index (7+)         |  indexed field
// +---+---+-----------------------+
// | 0 | 1 |      Index (6+)       |  literal, incremental indexing
// +---+---+---+-------------------+
// | 0 | 0 | 1 |   Max size (5+)   |  dynamic table size update
// +---+---+---+---+---------------+
// | 0 | 0 | 0 | 1 |  Index (4+)   |  literal, never indexed
// +---+---+---+---+---------------+
// | 0 | 0 | 0 | 0 |  Index (4+)   |  literal, not indexed
// +---+---+---+---+---------------+
const INDEXED: u8 = 0x80;
const INCREMENTAL: u8 = 0x40;
const SIZE_UPDATE: u8 = 0x20;
const NEVER_INDEXED: u8 = 0x10;

/// HPACK header block decoder.
///
/// Owns the decoding [`HpackContext`]; never-indexed and not-indexed
/// literals leave the dynamic table untouched.
#[derive(Debug, Default)]
pub struct Decoder {
    context: HpackContext,
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder::default()
    }

    /// Decoder with a protocol-level table limit.
    pub fn with_limit(limit: usize) -> Decoder {
        Decoder {
            context: HpackContext::with_limit(limit),
        }
    }

    /// The joined index table.
    pub fn context(&self) -> &HpackContext {
        &self.context
    }

    /// Lazily decode `block` into `(name, value)` pairs.
    ///
    /// Dynamic-table side effects happen as the iterator advances; a
    /// partially consumed iterator leaves the table mid-block.
    pub fn decode<'a>(&'a mut self, block: Bytes) -> Decode<'a> {
        Decode {
            context: &mut self.context,
            block,
            failed: false,
        }
    }

    /// Decode a whole block eagerly.
    pub fn decode_block(&mut self, block: Bytes) -> Result<Vec<(String, String)>, HpackError> {
        self.decode(block).collect()
    }
}

/// Lazy field iterator over one header block, see [`Decoder::decode`].
pub struct Decode<'a> {
    context: &'a mut HpackContext,
    block: Bytes,
    failed: bool,
}

impl std::fmt::Debug for Decode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decode")
            .field("remaining", &self.block.len())
            .finish_non_exhaustive()
    }
}

impl Decode<'_> {
    fn field(&mut self) -> Result<Option<(String, String)>, HpackError> {
        loop {
            if self.block.is_empty() {
                return Ok(None);
            }
            let first = self.block.get_u8();

            if first & INDEXED != 0 {
                let index = repr::decode_int(&mut self.block, 7, first)?;
                if index == 0 {
                    return Err(HpackError::ZeroIndex);
                }
                let (name, value) = self
                    .context
                    .get(index)
                    .ok_or(HpackError::NotFound(index))?;
                return Ok(Some((name.to_owned(), value.to_owned())));
            }

            if first & INCREMENTAL != 0 {
                let index = repr::decode_int(&mut self.block, 6, first)?;
                let name = self.name_at(index)?;
                let value = repr::decode_string(&mut self.block)?;
                self.context.add(name.clone(), value.clone());
                return Ok(Some((name, value)));
            }

            if first & SIZE_UPDATE != 0 {
                let max_size = repr::decode_int(&mut self.block, 5, first)?;
                self.context.set_max_size(max_size)?;
                continue;
            }

            // never-indexed (bit 4 set) and not-indexed share one shape;
            // neither touches the dynamic table
            let _never = first & NEVER_INDEXED != 0;
            let index = repr::decode_int(&mut self.block, 4, first)?;
            let name = self.name_at(index)?;
            let value = repr::decode_string(&mut self.block)?;
            return Ok(Some((name, value)));
        }
    }

    /// Resolve a literal name: index 0 means a string literal follows.
    fn name_at(&mut self, index: usize) -> Result<String, HpackError> {
        if index == 0 {
            return repr::decode_string(&mut self.block);
        }
        let (name, _) = self
            .context
            .get(index)
            .ok_or(HpackError::NotFound(index))?;
        Ok(name.to_owned())
    }
}

impl Iterator for Decode<'_> {
    type Item = Result<(String, String), HpackError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.field() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
