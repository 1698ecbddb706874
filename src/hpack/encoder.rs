use bytes::{BufMut, BytesMut};

use crate::hpack::huffman;
use crate::hpack::repr;
use crate::hpack::table::{HpackContext, IndexType};

/// Whether literal fields are added to the dynamic table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Indexing {
    /// Emit literals without indexing.
    #[default]
    Never,
    /// Emit literals with incremental indexing.
    Incremental,
}

/// String literal coding choice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Huffman {
    /// Raw ASCII literals.
    Never,
    /// Huffman-code every literal.
    Always,
    /// Huffman-code when it is strictly shorter.
    #[default]
    Auto,
}

impl Huffman {
    fn applies_to(&self, string: &str) -> bool {
        match self {
            Huffman::Never => false,
            Huffman::Always => true,
            Huffman::Auto => huffman::encoded_length(string.as_bytes()) < string.len(),
        }
    }
}

/// HPACK header block encoder.
///
/// Owns its own [`HpackContext`]; the peer's decoder tracks an identical
/// table by processing the emitted blocks.
#[derive(Debug, Default)]
pub struct Encoder {
    context: HpackContext,
    indexing: Indexing,
    huffman: Huffman,
}

impl Encoder {
    pub fn new() -> Encoder {
        Encoder::default()
    }

    /// Encoder with explicit indexing and string policies.
    pub fn with_policies(indexing: Indexing, huffman: Huffman) -> Encoder {
        Encoder {
            context: HpackContext::new(),
            indexing,
            huffman,
        }
    }

    /// The joined index table.
    pub fn context(&self) -> &HpackContext {
        &self.context
    }

    /// Lower the protocol-level table limit.
    pub fn set_limit(&mut self, limit: usize) {
        self.context.set_limit(limit);
    }

    /// Encode one header field into `out`.
    pub fn encode(&mut self, name: &str, value: &str, out: &mut BytesMut) {
        let (index_type, index) = self.context.get_index(name, value);

        let indexable =
            self.indexing == Indexing::Incremental && index_type != IndexType::Full;
        if indexable {
            self.context.add(name.to_owned(), value.to_owned());
        }

        match index_type {
            IndexType::Full => {
                // +---+---+---+---+---+---+---+---+
                // | 1 |        Index (7+)         |
                // +---+---------------------------+
                repr::encode_int(index, 7, 0x80, out);
            }
            IndexType::Name => {
                if indexable {
                    // | 0 | 1 |      Index (6+)       |
                    repr::encode_int(index, 6, 0x40, out);
                } else {
                    // | 0 | 0 | 0 | 0 |  Index (4+)   |
                    repr::encode_int(index, 4, 0x00, out);
                }
                self.encode_string(value, out);
            }
            IndexType::None => {
                out.put_u8(if indexable { 0x40 } else { 0x00 });
                self.encode_string(name, out);
                self.encode_string(value, out);
            }
        }
    }

    /// Encode a whole header list into one block.
    pub fn encode_block<'a, I>(&mut self, fields: I, out: &mut BytesMut)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (name, value) in fields {
            self.encode(name, value, out);
        }
    }

    fn encode_string(&self, string: &str, out: &mut BytesMut) {
        repr::encode_string(string.as_bytes(), self.huffman.applies_to(string), out);
    }
}
