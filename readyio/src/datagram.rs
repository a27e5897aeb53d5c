//! Datagram sockets.
//!
//! Every datagram moves whole: one successful syscall per message, each
//! received message sized to exactly what arrived. Receiving many datagrams
//! at once goes through a [`Slab`] of reusable slots.

use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::Arc;

use bytes::Bytes;

use crate::buf::Staging;
use crate::engine::{Mode, Transfer, drive};
use crate::error::{Error, Result, invariant, unexpected_errno};
use crate::interrupt::{Gate, Interrupt};
use crate::readiness::{Direction, ReadinessManager};
use crate::sync::Mutex;
use crate::sys::{self, Outcome};

/// Receive size used when an operation is not given a maximum.
pub const DEFAULT_MAX_DATAGRAM: usize = 65_536;

const DEFAULT_SLAB_SLOTS: usize = 16;

/// Whether the socket has a fixed peer, chosen when the handle is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
  /// `connect` was called; [`DatagramSocket::send`] is available.
  Connected,
  /// Every send names its destination with [`DatagramSocket::send_to`].
  Unconnected,
}

/// A pre-allocated set of equal-sized receive slots.
///
/// Reused across [`DatagramSocket::recv_many`] calls so a burst of
/// datagrams does not allocate a maximum-size buffer per message.
pub struct Slab {
  buf: Vec<u8>,
  slot_len: usize,
}

impl Default for Slab {
  fn default() -> Self {
    Self::with_capacity(DEFAULT_SLAB_SLOTS, DEFAULT_MAX_DATAGRAM)
  }
}

impl Slab {
  /// Allocates `slots` slots of `slot_len` bytes each.
  ///
  /// # Panics
  ///
  /// If `slots` is 0.
  pub fn with_capacity(slots: usize, slot_len: usize) -> Self {
    assert!(slots > 0, "Slab::with_capacity: a slab needs at least one slot");
    Self { buf: vec![0; slots * slot_len], slot_len }
  }

  pub fn slots(&self) -> usize {
    self.buf.len().checked_div(self.slot_len).unwrap_or(0).max(1)
  }

  pub fn slot_len(&self) -> usize {
    self.slot_len
  }

  fn slot_mut(&mut self, index: usize, len: usize) -> &mut [u8] {
    let start = index * self.slot_len;
    &mut self.buf[start..start + len.min(self.slot_len)]
  }
}

/// A non-blocking datagram socket.
///
/// Like [`Connection`](crate::Connection), the descriptor stays owned by
/// the caller.
///
/// A receive error hit while draining a batch after its first datagram is
/// held back and returned by the next receive call, before any I/O.
pub struct DatagramSocket<M: ReadinessManager> {
  fd: RawFd,
  association: Association,
  manager: Arc<M>,
  read: M::Registration,
  write: M::Registration,
  deferred: Mutex<Option<Error>>,
}

impl<M: ReadinessManager> DatagramSocket<M> {
  pub fn new(
    fd: RawFd,
    association: Association,
    manager: Arc<M>,
  ) -> io::Result<Self> {
    let read = manager.register(fd, Direction::Read)?;
    let write = manager.register(fd, Direction::Write)?;
    Ok(Self {
      fd,
      association,
      manager,
      read,
      write,
      deferred: Mutex::new(None),
    })
  }

  pub fn fd(&self) -> RawFd {
    self.fd
  }

  pub fn association(&self) -> Association {
    self.association
  }

  /// Sends `data` as one datagram to the connected peer.
  ///
  /// # Panics
  ///
  /// If the socket was built as [`Association::Unconnected`].
  pub fn send(&self, data: &[u8], interrupt: Option<&Interrupt>) -> Result<()> {
    assert!(
      self.association == Association::Connected,
      "DatagramSocket::send on an unconnected socket, use send_to"
    );
    self.send_inner(data, None, "send", interrupt)
  }

  /// Sends `data` as one datagram to `to`.
  pub fn send_to(
    &self,
    data: &[u8],
    to: SocketAddr,
    interrupt: Option<&Interrupt>,
  ) -> Result<()> {
    self.send_inner(data, Some(to), "send_to", interrupt)
  }

  fn send_inner(
    &self,
    data: &[u8],
    to: Option<SocketAddr>,
    op: &'static str,
    interrupt: Option<&Interrupt>,
  ) -> Result<()> {
    if data.is_empty() {
      return Ok(());
    }
    let mut transfer = SendDatagram { fd: self.fd, data, to, sent: 0 };
    let sent = drive(
      &*self.manager,
      &self.write,
      Gate::new(interrupt),
      Mode::Once,
      op,
      &mut transfer,
    )?;
    if sent != data.len() {
      invariant(format_args!(
        "{op}: datagram of {} bytes went out as {sent}",
        data.len()
      ));
    }
    Ok(())
  }

  /// Receives one datagram of at most `max` bytes (default
  /// [`DEFAULT_MAX_DATAGRAM`]). Longer datagrams are truncated.
  pub fn recv(
    &self,
    max: Option<usize>,
    interrupt: Option<&Interrupt>,
  ) -> Result<Bytes> {
    self.recv_inner(max, "recv", interrupt).map(|(bytes, _)| bytes)
  }

  /// Like [`recv`](Self::recv), also returning the sender's address when it
  /// is an IPv4/IPv6 address.
  pub fn recv_from(
    &self,
    max: Option<usize>,
    interrupt: Option<&Interrupt>,
  ) -> Result<(Bytes, Option<SocketAddr>)> {
    self.recv_inner(max, "recv_from", interrupt)
  }

  fn recv_inner(
    &self,
    max: Option<usize>,
    op: &'static str,
    interrupt: Option<&Interrupt>,
  ) -> Result<(Bytes, Option<SocketAddr>)> {
    self.take_deferred(op)?;

    let mut staging = Staging::with_len(max.unwrap_or(DEFAULT_MAX_DATAGRAM));
    if staging.is_full() {
      return Ok((Bytes::new(), None));
    }

    let mut transfer =
      RecvDatagram { fd: self.fd, buf: staging.unfilled_mut(), len: 0, peer: None };
    drive(&*self.manager, &self.read, Gate::new(interrupt), Mode::Once, op, &mut transfer)?;

    let RecvDatagram { len, peer, .. } = transfer;
    staging.advance(len);
    Ok((staging.finalize(), peer))
  }

  /// Receives one or more datagrams into `slab`.
  ///
  /// Waits for the first datagram, then keeps receiving without waiting until
  /// the socket would block or every slot is used. Each datagram is capped at
  /// `max` (default: the slot length).
  pub fn recv_many(
    &self,
    slab: &mut Slab,
    max: Option<usize>,
    interrupt: Option<&Interrupt>,
  ) -> Result<Vec<Bytes>> {
    let batch = self.recv_batch(slab, max, "recv_many", interrupt)?;
    Ok(batch.into_iter().map(|(bytes, _)| bytes).collect())
  }

  /// Like [`recv_many`](Self::recv_many), with each sender's address.
  pub fn recv_many_from(
    &self,
    slab: &mut Slab,
    max: Option<usize>,
    interrupt: Option<&Interrupt>,
  ) -> Result<Vec<(Bytes, Option<SocketAddr>)>> {
    self.recv_batch(slab, max, "recv_many_from", interrupt)
  }

  fn recv_batch(
    &self,
    slab: &mut Slab,
    max: Option<usize>,
    op: &'static str,
    interrupt: Option<&Interrupt>,
  ) -> Result<Vec<(Bytes, Option<SocketAddr>)>> {
    self.take_deferred(op)?;

    let limit = max.unwrap_or(slab.slot_len()).min(slab.slot_len());
    if limit == 0 {
      return Ok(Vec::new());
    }

    let mut received = Vec::with_capacity(slab.slots());

    let mut first =
      RecvDatagram { fd: self.fd, buf: slab.slot_mut(0, limit), len: 0, peer: None };
    drive(&*self.manager, &self.read, Gate::new(interrupt), Mode::Once, op, &mut first)?;
    let RecvDatagram { buf, len, peer, .. } = first;
    received.push((Bytes::copy_from_slice(&buf[..len]), peer));

    let fd = self.fd;
    let stopped = drain(slab, limit, op, &mut received, |slot| {
      sys::recv_datagram(fd, slot)
    });
    if let Some(err) = stopped {
      log::warn!(
        target: "readyio",
        "{op}: {err} after {} datagrams, reporting it on the next receive",
        received.len()
      );
      *self.deferred.lock() = Some(err);
    }

    log::trace!(target: "readyio", "{op}: {} datagrams", received.len());
    Ok(received)
  }

  fn take_deferred(&self, op: &'static str) -> Result<()> {
    match self.deferred.lock().take() {
      Some(err) => {
        log::debug!(target: "readyio", "{op}: deferred {err}");
        Err(err)
      }
      None => Ok(()),
    }
  }
}

/// Fills slots `1..` of `slab` without waiting, until the socket would block
/// or the slab is full.
///
/// Returns the error that stopped it early, if any.
fn drain<F>(
  slab: &mut Slab,
  limit: usize,
  op: &'static str,
  received: &mut Vec<(Bytes, Option<SocketAddr>)>,
  mut recv: F,
) -> Option<Error>
where
  F: FnMut(&mut [u8]) -> (Outcome, Option<SocketAddr>),
{
  'slots: for index in 1..slab.slots() {
    let slot = slab.slot_mut(index, limit);
    loop {
      match recv(slot) {
        (Outcome::Done(n), peer) => {
          received.push((Bytes::copy_from_slice(&slot[..n]), peer));
          continue 'slots;
        }
        (Outcome::Restart, _) => continue,
        (Outcome::WouldBlock, _) => break 'slots,
        (Outcome::Reset, _) => return Some(Error::Reset),
        (Outcome::PipeClosed, _) => return Some(Error::PipeClosed),
        (Outcome::Closed, _) => return Some(Error::Closed),
        (Outcome::Fatal(errno), _) => unexpected_errno(op, errno),
      }
    }
  }
  None
}

struct SendDatagram<'a> {
  fd: RawFd,
  data: &'a [u8],
  to: Option<SocketAddr>,
  sent: usize,
}

impl Transfer for SendDatagram<'_> {
  fn attempt(&mut self) -> Outcome {
    sys::send_datagram(self.fd, self.data, self.to.as_ref())
  }

  fn advance(&mut self, n: usize) {
    self.sent += n;
  }

  fn transferred(&self) -> usize {
    self.sent
  }
}

struct RecvDatagram<'a> {
  fd: RawFd,
  buf: &'a mut [u8],
  len: usize,
  peer: Option<SocketAddr>,
}

impl Transfer for RecvDatagram<'_> {
  fn attempt(&mut self) -> Outcome {
    let (outcome, peer) = sys::recv_datagram(self.fd, self.buf);
    self.peer = peer;
    outcome
  }

  fn advance(&mut self, n: usize) {
    self.len += n;
  }

  fn transferred(&self) -> usize {
    self.len
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Poller;
  use std::collections::VecDeque;
  use std::os::fd::AsRawFd;
  use std::os::unix::net::UnixDatagram;

  /// Feeds `drain` a fixed list of outcomes, writing each payload into the
  /// slot it is given.
  fn scripted(
    script: Vec<(Outcome, &'static [u8])>,
  ) -> impl FnMut(&mut [u8]) -> (Outcome, Option<SocketAddr>) {
    let mut script = VecDeque::from(script);
    move |slot| {
      let (outcome, payload) =
        script.pop_front().expect("drain asked for more than scripted");
      slot[..payload.len()].copy_from_slice(payload);
      (outcome, None)
    }
  }

  #[test]
  fn drain_keeps_datagrams_before_an_error() {
    let mut slab = Slab::with_capacity(8, 16);
    let mut received = Vec::new();
    let stopped = drain(
      &mut slab,
      16,
      "test",
      &mut received,
      scripted(vec![
        (Outcome::Done(3), b"abc"),
        (Outcome::Restart, b""),
        (Outcome::Done(1), b"d"),
        (Outcome::Reset, b""),
      ]),
    );

    assert_eq!(stopped, Some(Error::Reset));
    let got: Vec<&[u8]> = received.iter().map(|(b, _)| &b[..]).collect();
    assert_eq!(got, vec![&b"abc"[..], &b"d"[..]]);
  }

  #[test]
  fn drain_stops_quietly_on_would_block() {
    let mut slab = Slab::with_capacity(8, 16);
    let mut received = Vec::new();
    let stopped = drain(
      &mut slab,
      16,
      "test",
      &mut received,
      scripted(vec![(Outcome::Done(2), b"hi"), (Outcome::WouldBlock, b"")]),
    );
    assert_eq!(stopped, None);
    assert_eq!(received.len(), 1);
  }

  #[test]
  fn drain_stops_when_slab_is_full() {
    let mut slab = Slab::with_capacity(3, 4);
    let mut received = Vec::new();
    let stopped = drain(
      &mut slab,
      4,
      "test",
      &mut received,
      scripted(vec![(Outcome::Done(1), b"x"), (Outcome::Done(1), b"y")]),
    );
    assert_eq!(stopped, None);
    assert_eq!(received.len(), 2);
  }

  fn unix_pair() -> (
    DatagramSocket<Poller>,
    DatagramSocket<Poller>,
    (UnixDatagram, UnixDatagram),
  ) {
    let (a, b) = UnixDatagram::pair().unwrap();
    a.set_nonblocking(true).unwrap();
    b.set_nonblocking(true).unwrap();
    let poller = Arc::new(Poller::new());
    let left =
      DatagramSocket::new(a.as_raw_fd(), Association::Connected, poller.clone())
        .unwrap();
    let right =
      DatagramSocket::new(b.as_raw_fd(), Association::Connected, poller)
        .unwrap();
    (left, right, (a, b))
  }

  #[test]
  fn deferred_error_comes_before_queued_data() {
    let (left, right, _sockets) = unix_pair();
    left.send(b"queued", None).unwrap();

    *right.deferred.lock() = Some(Error::Reset);
    assert_eq!(right.recv(None, None), Err(Error::Reset));
    assert_eq!(&right.recv(None, None).unwrap()[..], b"queued");
  }

  #[test]
  fn deferred_error_is_reported_once_by_recv_many() {
    let (left, right, _sockets) = unix_pair();
    left.send(b"one", None).unwrap();

    let mut slab = Slab::with_capacity(4, 16);
    *right.deferred.lock() = Some(Error::Reset);
    assert_eq!(right.recv_many(&mut slab, None, None), Err(Error::Reset));

    let got = right.recv_many(&mut slab, None, None).unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(&got[0][..], b"one");
  }

  #[test]
  fn slab_slots() {
    let mut slab = Slab::with_capacity(4, 10);
    assert_eq!(slab.slots(), 4);
    assert_eq!(slab.slot_len(), 10);
    assert_eq!(slab.slot_mut(3, 100).len(), 10);
    assert_eq!(slab.slot_mut(1, 3).len(), 3);
  }

  #[test]
  fn zero_length_slots_still_count() {
    let slab = Slab::with_capacity(3, 0);
    assert_eq!(slab.slots(), 1);
  }

  #[test]
  #[should_panic(expected = "at least one slot")]
  fn empty_slab_is_rejected() {
    Slab::with_capacity(0, 16);
  }

  #[test]
  fn default_slab() {
    let slab = Slab::default();
    assert_eq!(slab.slots(), DEFAULT_SLAB_SLOTS);
    assert_eq!(slab.slot_len(), DEFAULT_MAX_DATAGRAM);
  }
}
