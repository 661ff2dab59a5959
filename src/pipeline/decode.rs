//! Incremental decoding of a stream body into items.
//!
//! The body is a sequence of JSON values, usually one per line, with blank
//! keep-alive lines in between. Values may be split across chunks.

use serde::de::Error as _;

use crate::models::StreamItem;

/// Largest incomplete value the decoder will buffer.
pub const MAX_ITEM_SIZE: usize = 1024 * 1024;

/// Outcome of one decode attempt.
#[derive(Debug)]
pub enum Decoded {
    Item(StreamItem),
    /// The buffer holds no complete value yet.
    NeedMore,
    /// The buffer holds something that will never decode.
    Invalid(serde_json::Error),
}

/// Buffers body chunks and yields items one at a time.
#[derive(Debug)]
pub struct ItemDecoder {
    buffer: Vec<u8>,
    limit: usize,
}

impl Default for ItemDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_ITEM_SIZE)
    }
}

impl ItemDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that gives up once `limit` bytes are buffered without
    /// completing a value.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
        }
    }

    /// Buffer the next body chunk is appended to.
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    /// Bytes buffered but not yet decoded.
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_item(&mut self) -> Decoded {
        let mut values =
            serde_json::Deserializer::from_slice(&self.buffer).into_iter::<StreamItem>();
        match values.next() {
            Some(Ok(item)) => {
                let consumed = values.byte_offset();
                self.buffer.drain(..consumed);
                Decoded::Item(item)
            }
            Some(Err(_)) if self.buffer.len() > self.limit => {
                Decoded::Invalid(serde_json::Error::custom(format!(
                    "item exceeds {} bytes",
                    self.limit
                )))
            }
            Some(Err(e)) if e.is_eof() => Decoded::NeedMore,
            Some(Err(e)) => Decoded::Invalid(e),
            None => {
                // Only whitespace left.
                self.buffer.clear();
                Decoded::NeedMore
            }
        }
    }
}
