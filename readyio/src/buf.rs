//! Staging buffers for receive operations.
//!
//! A receive goes through a two-phase lifecycle:
//!
//! 1. **Stage**: [`Staging::with_len`] allocates the largest size the
//!    operation may receive. The operation owns it exclusively and fills it
//!    through [`Staging::unfilled_mut`] / [`Staging::advance`].
//! 2. **Finalize**: [`Staging::finalize`] consumes the staging buffer,
//!    truncates it to the filled length, drops any spare capacity and hands
//!    the bytes out as an immutable [`Bytes`].
//!
//! Because `finalize` takes `self`, it cannot run twice, and it cannot run
//! while a syscall still borrows the unfilled region.

use bytes::Bytes;

use crate::accounting::Progress;

pub struct Staging {
  buf: Vec<u8>,
  progress: Progress,
}

impl Staging {
  /// Allocates `len` zeroed bytes, none of them filled yet.
  pub fn with_len(len: usize) -> Self {
    Self { buf: vec![0; len], progress: Progress::new(len) }
  }

  /// Bytes received so far.
  pub fn filled(&self) -> usize {
    self.progress.offset()
  }

  pub fn is_full(&self) -> bool {
    self.progress.is_complete()
  }

  /// The region the next receive writes into.
  pub fn unfilled_mut(&mut self) -> &mut [u8] {
    &mut self.buf[self.progress.offset()..]
  }

  /// Records `n` bytes written into the unfilled region.
  ///
  /// # Panics
  ///
  /// If that would fill past the allocation.
  pub fn advance(&mut self, n: usize) {
    self.progress.advance(n);
  }

  /// Converts into an exactly-sized immutable result.
  pub fn finalize(self) -> Bytes {
    let Self { mut buf, progress } = self;
    buf.truncate(progress.offset());
    buf.shrink_to_fit();
    Bytes::from(buf)
  }
}
