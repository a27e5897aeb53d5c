//! The readiness-notification interface the retry engine waits on.
//!
//! A manager hands out one registration per `(descriptor, direction)`. Each
//! registration carries a [`Token`] that moves forward every time the
//! descriptor may have become ready. The engine uses it like this:
//!
//! ```text
//! token = wait(reg)          // returns at once while reg is ready
//! attempt syscall
//! on would-block:
//!     unready(token, reg)    // stale, unless a newer token arrived meanwhile
//!     token = wait(reg)      // block until the token moves
//! ```
//!
//! `unready` only takes effect if `token` is still the current one, so a
//! readiness update that lands between the failed attempt and the `unready`
//! call is never lost.

use std::io;
use std::os::fd::RawFd;
use std::task::Waker;

/// Version of a registration's readiness, compared to detect new signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub(crate) u64);

impl Token {
  pub const fn new(version: u64) -> Self {
    Self(version)
  }

  pub const fn version(self) -> u64 {
    self.0
  }
}

/// The direction a registration watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
  Read,
  Write,
}

/// Trait for readiness-notification managers.
///
/// Implementations must tolerate one waiter per registration at a time; the
/// socket handles in this crate never wait on the same registration from two
/// threads.
pub trait ReadinessManager {
  type Registration: Send + Sync;

  /// Starts watching `fd` in `direction`.
  ///
  /// A fresh registration is considered ready, so the first operation tries
  /// the syscall before waiting.
  fn register(
    &self,
    fd: RawFd,
    direction: Direction,
  ) -> io::Result<Self::Registration>;

  /// Blocks until the registration is ready and returns its current token.
  ///
  /// May also return early, without a new token, when the registration's
  /// [`waker`](Self::waker) fires. Callers treat that like a spurious wakeup.
  fn wait(&self, registration: &Self::Registration) -> Token;

  /// Marks the registration not ready as of `token`.
  ///
  /// No-op if a newer token has been delivered since.
  fn unready(&self, token: Token, registration: &Self::Registration);

  /// A waker that makes a blocked [`wait`](Self::wait) on this registration
  /// return.
  fn waker(&self, registration: &Self::Registration) -> Waker;
}
