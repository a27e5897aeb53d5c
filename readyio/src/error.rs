//! Error types and the invariant-violation path.
//!
//! Operations return one of the recoverable [`Error`] variants. Anything the
//! platform reports that is not in the expected set is not returned at all:
//! it is logged and turned into a panic carrying the symbolic errno, see
//! [`unexpected_errno`].

use std::{fmt, io};

/// Recoverable failures of a send or receive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
  /// The peer reset (or refused) the connection.
  #[error("connection reset by peer")]
  Reset,
  /// The local end can no longer write, the peer closed its read side.
  #[error("broken pipe")]
  PipeClosed,
  /// The peer shut the stream down before the requested bytes arrived.
  #[error("connection closed before the requested bytes arrived")]
  Closed,
  /// The caller raised the operation's [`Interrupt`](crate::Interrupt).
  ///
  /// Bytes transferred before the interruption are not reported.
  #[error("operation interrupted")]
  Interrupted,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Logs and panics on an errno outside the expected set.
#[cold]
#[track_caller]
pub(crate) fn unexpected_errno(op: &'static str, errno: i32) -> ! {
  let name = errno_name(errno);
  let desc = io::Error::from_raw_os_error(errno);
  log::error!(
    target: "readyio",
    "unexpected {name} ({errno}) from {op}: {desc}"
  );
  panic!("readyio: unexpected {name} ({errno}) from {op}: {desc}");
}

/// Aborts on broken internal bookkeeping.
#[cold]
#[track_caller]
pub(crate) fn invariant(args: fmt::Arguments<'_>) -> ! {
  log::error!(target: "readyio", "invariant violated: {args}");
  panic!("readyio: invariant violated: {args}");
}

/// Symbolic name of an errno value, for diagnostics.
pub fn errno_name(errno: i32) -> &'static str {
  match errno {
    libc::EAGAIN => "EAGAIN",
    libc::EINTR => "EINTR",
    libc::EPIPE => "EPIPE",
    libc::ECONNRESET => "ECONNRESET",
    libc::ECONNREFUSED => "ECONNREFUSED",
    libc::ECONNABORTED => "ECONNABORTED",
    libc::EBADF => "EBADF",
    libc::EFAULT => "EFAULT",
    libc::EINVAL => "EINVAL",
    libc::ENOTSOCK => "ENOTSOCK",
    libc::ENOTCONN => "ENOTCONN",
    libc::EISCONN => "EISCONN",
    libc::EDESTADDRREQ => "EDESTADDRREQ",
    libc::EMSGSIZE => "EMSGSIZE",
    libc::ENOBUFS => "ENOBUFS",
    libc::ENOMEM => "ENOMEM",
    libc::EOPNOTSUPP => "EOPNOTSUPP",
    libc::EAFNOSUPPORT => "EAFNOSUPPORT",
    libc::EACCES => "EACCES",
    libc::ETIMEDOUT => "ETIMEDOUT",
    libc::EHOSTUNREACH => "EHOSTUNREACH",
    libc::ENETUNREACH => "ENETUNREACH",
    libc::ENETDOWN => "ENETDOWN",
    _ => "unknown errno",
  }
}
