//! Single-attempt send/receive calls.
//!
//! Each function issues at most one syscall and classifies the result. None
//! of them loop or wait; that is the engine's job.

use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::mem;

use crate::accounting::ChunkCursor;
use crate::addr;

/// Upper bound on iovecs handed to one `sendmsg`. Linux and the BSDs all
/// accept at least this many (`IOV_MAX`).
pub const MAX_IOVECS: usize = 1024;

#[cfg(not(apple))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
// No MSG_NOSIGNAL on Apple platforms: callers set SO_NOSIGPIPE on the socket.
#[cfg(apple)]
const SEND_FLAGS: libc::c_int = 0;

/// Result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// `n` bytes sent or received.
  Done(usize),
  /// The descriptor is not ready; wait for readiness and try again.
  WouldBlock,
  /// Orderly shutdown by the peer: a stream receive returned 0.
  Closed,
  /// `ECONNRESET` or `ECONNREFUSED`.
  Reset,
  /// `EPIPE`.
  PipeClosed,
  /// `EINTR`: a signal arrived before any data moved; try again at once.
  Restart,
  /// Any other errno.
  Fatal(i32),
}

impl Outcome {
  fn from_ret(ret: io::Result<isize>) -> Self {
    match ret {
      Ok(n) => Outcome::Done(n as usize),
      Err(err) => Self::from_error(&err),
    }
  }

  pub fn from_error(err: &io::Error) -> Self {
    match err.raw_os_error() {
      Some(code) => Self::from_errno(code),
      None => Outcome::Fatal(0),
    }
  }

  pub fn from_errno(code: i32) -> Self {
    #[allow(unreachable_patterns)]
    match code {
      libc::EAGAIN | libc::EWOULDBLOCK => Outcome::WouldBlock,
      libc::EINTR => Outcome::Restart,
      libc::ECONNRESET | libc::ECONNREFUSED => Outcome::Reset,
      libc::EPIPE => Outcome::PipeClosed,
      other => Outcome::Fatal(other),
    }
  }
}

/// One `send` on a stream socket.
pub fn send(fd: RawFd, buf: &[u8]) -> Outcome {
  if buf.is_empty() {
    return Outcome::Done(0);
  }
  Outcome::from_ret(syscall!(send(
    fd,
    buf.as_ptr().cast::<libc::c_void>(),
    buf.len(),
    SEND_FLAGS,
  )))
}

/// One `recv` on a stream socket. A zero return is [`Outcome::Closed`].
pub fn recv(fd: RawFd, buf: &mut [u8]) -> Outcome {
  if buf.is_empty() {
    return Outcome::Done(0);
  }
  match Outcome::from_ret(syscall!(recv(
    fd,
    buf.as_mut_ptr().cast::<libc::c_void>(),
    buf.len(),
    0,
  ))) {
    Outcome::Done(0) => Outcome::Closed,
    other => other,
  }
}

/// One `sendmsg` of the unsent part of `chunks`, starting at `cursor`.
///
/// At most [`MAX_IOVECS`] chunks go out per call; the engine loops for the
/// rest.
pub fn send_vectored<B: AsRef<[u8]>>(
  fd: RawFd,
  chunks: &[B],
  cursor: &ChunkCursor,
) -> Outcome {
  let mut iovecs: Vec<libc::iovec> = cursor
    .slices(chunks, MAX_IOVECS)
    .map(|slice| libc::iovec {
      iov_base: slice.as_ptr() as *mut libc::c_void,
      iov_len: slice.len(),
    })
    .collect();

  if iovecs.is_empty() {
    return Outcome::Done(0);
  }

  // SAFETY: msghdr is plain data; all-zero means no name and no control.
  let mut msg: libc::msghdr = unsafe { mem::zeroed() };
  msg.msg_iov = iovecs.as_mut_ptr();
  msg.msg_iovlen = iovecs.len() as _;

  Outcome::from_ret(syscall!(sendmsg(fd, &msg, SEND_FLAGS)))
}

/// One `send` (connected) or `sendto` of a whole datagram.
pub fn send_datagram(
  fd: RawFd,
  buf: &[u8],
  to: Option<&SocketAddr>,
) -> Outcome {
  if buf.is_empty() {
    return Outcome::Done(0);
  }
  let data = buf.as_ptr().cast::<libc::c_void>();

  match to {
    None => Outcome::from_ret(syscall!(send(fd, data, buf.len(), SEND_FLAGS))),
    Some(addr) => {
      let (storage, len) = addr::encode(addr);
      Outcome::from_ret(syscall!(sendto(
        fd,
        data,
        buf.len(),
        SEND_FLAGS,
        (&storage as *const libc::sockaddr_storage).cast::<libc::sockaddr>(),
        len,
      )))
    }
  }
}

/// One `recvfrom` of a single datagram, with the sender's address.
///
/// A zero-length datagram is `Done(0)`; datagram sockets have no
/// end-of-stream. Datagrams longer than `buf` are truncated by the kernel.
pub fn recv_datagram(
  fd: RawFd,
  buf: &mut [u8],
) -> (Outcome, Option<SocketAddr>) {
  if buf.is_empty() {
    return (Outcome::Done(0), None);
  }

  // SAFETY: all-zero sockaddr_storage is valid (family AF_UNSPEC).
  let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
  let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

  let outcome = Outcome::from_ret(syscall!(recvfrom(
    fd,
    buf.as_mut_ptr().cast::<libc::c_void>(),
    buf.len(),
    0,
    (&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr>(),
    &mut len,
  )));

  let peer = match outcome {
    Outcome::Done(_) => addr::decode(&storage, len),
    _ => None,
  };
  (outcome, peer)
}
