use crate::hpack::huffman::HuffmanError;

/// HPACK wire-format violation.
#[derive(Debug)]
pub enum HpackError {
    /// Header block ended inside a field.
    Incomplete,
    /// Indexed representation with index 0.
    ZeroIndex,
    /// Index beyond the joined table.
    NotFound(usize),
    /// Dynamic size update above the protocol limit.
    SizeUpdateTooLarge { max_size: usize, limit: usize },
    /// Integer coding continuation does not fit.
    IntegerOverflow,
    /// String literal is not valid ASCII text.
    InvalidString,
    /// Huffman coding failure.
    Huffman(HuffmanError),
}

impl std::error::Error for HpackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HpackError::Huffman(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for HpackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HpackError::Incomplete => f.write_str("header block is incomplete"),
            HpackError::ZeroIndex => f.write_str("indexed field with index 0"),
            HpackError::NotFound(index) => write!(f, "no table entry at index {index}"),
            HpackError::SizeUpdateTooLarge { max_size, limit } => {
                write!(f, "size update to {max_size} exceeds the limit {limit}")
            }
            HpackError::IntegerOverflow => f.write_str("integer does not fit"),
            HpackError::InvalidString => f.write_str("string literal is not ASCII text"),
            HpackError::Huffman(e) => std::fmt::Display::fmt(e, f),
        }
    }
}

impl From<HuffmanError> for HpackError {
    fn from(err: HuffmanError) -> Self {
        HpackError::Huffman(err)
    }
}
