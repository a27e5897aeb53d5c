//! Connected stream sockets.
//!
//! [`Connection`] wraps a caller-owned, non-blocking stream descriptor and
//! its read/write registrations. Every operation loops until its contract is
//! met, waiting for readiness whenever the kernel says it would block.
//!
//! One send and one receive may run at the same time from different threads.
//! Two sends (or two receives) on the same connection must not overlap.

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

use bytes::Bytes;

use crate::accounting::{ChunkCursor, Progress};
use crate::buf::Staging;
use crate::engine::{Mode, Transfer, drive};
use crate::error::Result;
use crate::interrupt::{Gate, Interrupt};
use crate::readiness::{Direction, ReadinessManager};
use crate::sys::{self, Outcome};

/// A connected, non-blocking stream socket.
///
/// The descriptor is borrowed: it must stay open for the lifetime of the
/// `Connection` and is never closed by it.
pub struct Connection<M: ReadinessManager> {
  fd: RawFd,
  manager: Arc<M>,
  read: M::Registration,
  write: M::Registration,
}

impl<M: ReadinessManager> Connection<M> {
  /// Registers `fd` for both directions with `manager`.
  ///
  /// `fd` must already be in non-blocking mode.
  pub fn new(fd: RawFd, manager: Arc<M>) -> io::Result<Self> {
    let read = manager.register(fd, Direction::Read)?;
    let write = manager.register(fd, Direction::Write)?;
    Ok(Self { fd, manager, read, write })
  }

  pub fn fd(&self) -> RawFd {
    self.fd
  }

  /// Sends all of `data`.
  ///
  /// Returns once the kernel accepted every byte, in order. An empty slice
  /// returns at once without a syscall.
  pub fn send(&self, data: &[u8], interrupt: Option<&Interrupt>) -> Result<()> {
    let mut transfer = SendSlice { fd: self.fd, data, progress: Progress::new(data.len()) };
    drive(
      &*self.manager,
      &self.write,
      Gate::new(interrupt),
      Mode::Exact(data.len()),
      "send",
      &mut transfer,
    )?;
    Ok(())
  }

  /// Sends the concatenation of `chunks` with vectored writes.
  ///
  /// A partial write resumes at the exact byte it stopped at, which may be in
  /// the middle of a chunk.
  pub fn send_many<B: AsRef<[u8]>>(
    &self,
    chunks: &[B],
    interrupt: Option<&Interrupt>,
  ) -> Result<()> {
    let cursor = ChunkCursor::start(chunks);
    let total = cursor.remaining(chunks);
    let mut transfer = SendChunks { fd: self.fd, chunks, cursor, sent: 0 };
    drive(
      &*self.manager,
      &self.write,
      Gate::new(interrupt),
      Mode::Exact(total),
      "send_many",
      &mut transfer,
    )?;
    Ok(())
  }

  /// Receives exactly `n` bytes.
  ///
  /// Fails with [`Error::Closed`](crate::Error::Closed) if the peer shuts
  /// down first.
  pub fn recv_exact(
    &self,
    n: usize,
    interrupt: Option<&Interrupt>,
  ) -> Result<Bytes> {
    self.recv_mode(n, Mode::Exact(n), "recv_exact", interrupt)
  }

  /// Receives whatever one successful `recv` returns, at most `max` bytes.
  ///
  /// An empty result means the peer closed the stream (or `max` is 0).
  pub fn recv_once(
    &self,
    max: usize,
    interrupt: Option<&Interrupt>,
  ) -> Result<Bytes> {
    if max == 0 {
      return Ok(Bytes::new());
    }
    self.recv_mode(max, Mode::Once, "recv_once", interrupt)
  }

  /// Receives at least `min` and at most `max` bytes.
  ///
  /// Returns as soon as `min` is reached; it does not wait to fill `max`.
  /// With `min` 0 it never waits: an idle stream yields an empty result.
  ///
  /// # Panics
  ///
  /// If `min > max`.
  pub fn recv_between(
    &self,
    min: usize,
    max: usize,
    interrupt: Option<&Interrupt>,
  ) -> Result<Bytes> {
    assert!(min <= max, "recv_between: min ({min}) > max ({max})");
    self.recv_mode(max, Mode::Between { min, max }, "recv_between", interrupt)
  }

  fn recv_mode(
    &self,
    len: usize,
    mode: Mode,
    op: &'static str,
    interrupt: Option<&Interrupt>,
  ) -> Result<Bytes> {
    let mut transfer = RecvInto { fd: self.fd, staging: Staging::with_len(len) };
    drive(&*self.manager, &self.read, Gate::new(interrupt), mode, op, &mut transfer)?;
    Ok(transfer.staging.finalize())
  }
}

struct SendSlice<'a> {
  fd: RawFd,
  data: &'a [u8],
  progress: Progress,
}

impl Transfer for SendSlice<'_> {
  fn attempt(&mut self) -> Outcome {
    sys::send(self.fd, &self.data[self.progress.offset()..])
  }

  fn advance(&mut self, n: usize) {
    self.progress.advance(n);
  }

  fn transferred(&self) -> usize {
    self.progress.offset()
  }
}

struct SendChunks<'a, B> {
  fd: RawFd,
  chunks: &'a [B],
  cursor: ChunkCursor,
  sent: usize,
}

impl<B: AsRef<[u8]>> Transfer for SendChunks<'_, B> {
  fn attempt(&mut self) -> Outcome {
    sys::send_vectored(self.fd, self.chunks, &self.cursor)
  }

  fn advance(&mut self, n: usize) {
    self.cursor.advance(self.chunks, n);
    self.sent += n;
  }

  fn transferred(&self) -> usize {
    self.sent
  }
}

struct RecvInto {
  fd: RawFd,
  staging: Staging,
}

impl Transfer for RecvInto {
  fn attempt(&mut self) -> Outcome {
    sys::recv(self.fd, self.staging.unfilled_mut())
  }

  fn advance(&mut self, n: usize) {
    self.staging.advance(n);
  }

  fn transferred(&self) -> usize {
    self.staging.filled()
  }
}
