//! Byte accounting across partial transfers.
//!
//! [`Progress`] tracks a single contiguous buffer, [`ChunkCursor`] tracks a
//! position inside an ordered list of chunks sent as one vectored operation.
//! Both are advanced only with counts the kernel actually reported, so a
//! retry resumes exactly at the first byte that has not moved yet.

use crate::error::invariant;

/// `(offset, remaining)` over a buffer of `len` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
  offset: usize,
  len: usize,
}

impl Progress {
  pub fn new(len: usize) -> Self {
    Self { offset: 0, len }
  }

  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn remaining(&self) -> usize {
    self.len - self.offset
  }

  pub fn is_complete(&self) -> bool {
    self.offset == self.len
  }

  /// Records `n` transferred bytes.
  ///
  /// # Panics
  ///
  /// If `n` exceeds [`remaining`](Self::remaining).
  pub fn advance(&mut self, n: usize) {
    if n > self.remaining() {
      invariant(format_args!(
        "transferred {n} bytes with only {} remaining",
        self.remaining()
      ));
    }
    self.offset += n;
  }
}

/// A `(chunk index, intra-chunk offset)` position in a chunk list.
///
/// The cursor always points at an unsent byte, or is past the end once the
/// whole list has been consumed. Empty chunks are never pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkCursor {
  index: usize,
  offset: usize,
}

impl ChunkCursor {
  /// Cursor at the first unsent byte of `chunks`.
  pub fn start<B: AsRef<[u8]>>(chunks: &[B]) -> Self {
    let mut cursor = Self::default();
    cursor.skip_empty(chunks);
    cursor
  }

  pub fn index(&self) -> usize {
    self.index
  }

  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn is_done<B: AsRef<[u8]>>(&self, chunks: &[B]) -> bool {
    self.index >= chunks.len()
  }

  /// Bytes left to transfer from the cursor to the end of `chunks`.
  pub fn remaining<B: AsRef<[u8]>>(&self, chunks: &[B]) -> usize {
    let Some(first) = chunks.get(self.index) else {
      return 0;
    };
    let rest: usize =
      chunks[self.index + 1..].iter().map(|c| c.as_ref().len()).sum();
    first.as_ref().len() - self.offset + rest
  }

  /// Unsent slices starting at the cursor, at most `max` of them.
  pub fn slices<'a, B: AsRef<[u8]>>(
    &self,
    chunks: &'a [B],
    max: usize,
  ) -> impl Iterator<Item = &'a [u8]> + 'a {
    let offset = self.offset;
    let index = self.index;
    chunks
      .iter()
      .enumerate()
      .skip(index)
      .map(move |(i, chunk)| {
        let bytes = chunk.as_ref();
        if i == index { &bytes[offset..] } else { bytes }
      })
      .filter(|bytes| !bytes.is_empty())
      .take(max)
  }

  /// Moves the cursor forward by `n` transferred bytes.
  ///
  /// # Panics
  ///
  /// If `n` is larger than what is left in `chunks`.
  pub fn advance<B: AsRef<[u8]>>(&mut self, chunks: &[B], mut n: usize) {
    while n > 0 {
      let Some(chunk) = chunks.get(self.index) else {
        invariant(format_args!(
          "vectored transfer ran {n} bytes past the last chunk"
        ));
      };
      let left = chunk.as_ref().len() - self.offset;
      let take = left.min(n);
      self.offset += take;
      n -= take;

      if self.offset == chunk.as_ref().len() {
        self.index += 1;
        self.offset = 0;
      }
    }
    self.skip_empty(chunks);
  }

  fn skip_empty<B: AsRef<[u8]>>(&mut self, chunks: &[B]) {
    while let Some(chunk) = chunks.get(self.index) {
      if self.offset < chunk.as_ref().len() {
        break;
      }
      self.index += 1;
      self.offset = 0;
    }
  }
}
