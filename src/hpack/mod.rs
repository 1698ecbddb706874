//! HPACK header compression, RFC 7541.
//!
//! The [`Encoder`] and [`Decoder`] each own an [`HpackContext`]: the
//! immutable static table joined with a bounded FIFO dynamic table. The
//! two directions of a connection use distinct contexts.

mod decoder;
mod encoder;
pub mod huffman;
mod repr;
mod table;

pub mod error;

pub use decoder::{Decode, Decoder};
pub use encoder::{Encoder, Huffman, Indexing};
pub use table::{DEFAULT_LIMIT, HpackContext, IndexType, STATIC_TABLE};

#[cfg(test)]
mod test;
