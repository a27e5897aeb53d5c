//! The readiness retry loop.
//!
//! [`drive`] repeatedly attempts a [`Transfer`] until its [`Mode`] is
//! satisfied. A would-block marks the registration's token stale and waits
//! for a fresh one; a signal interruption retries at once; typed failures
//! stop the loop; unexpected errno values abort it. A would-block never
//! waits once the mode's minimum is already met.
//!
//! ```text
//!   Start ─▶ Waiting ─▶ Attempting ─┬─ Done(n) ─▶ satisfied? ── yes ─▶ Done
//!              ▲                    │                 └─ no ──┐
//!              │                    ├─ WouldBlock ─ unready ──┤
//!              └────────────────────┴─────────────────────────┘
//!                                   └─ Reset/PipeClosed/Closed ─▶ Failed
//! ```

use crate::error::{Error, Result, invariant, unexpected_errno};
use crate::interrupt::Gate;
use crate::readiness::{ReadinessManager, Token};
use crate::sys::Outcome;

/// When the loop may stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
  /// Stop after the first successful attempt, whatever its size.
  Once,
  /// Stop once exactly this many bytes moved.
  Exact(usize),
  /// Stop on the first success that brings the total to at least `min`.
  /// `max` bounds what the transfer asks for per attempt.
  Between { min: usize, max: usize },
}

impl Mode {
  fn is_satisfied(self, transferred: usize) -> bool {
    match self {
      Mode::Once => true,
      Mode::Exact(target) => transferred >= target,
      Mode::Between { min, .. } => transferred >= min,
    }
  }

  /// Whether a would-block may end the loop with `transferred` bytes.
  ///
  /// `Once` needs one success first; the other modes stop as soon as their
  /// minimum is met, which for `Between { min: 0, .. }` is before any I/O.
  fn settles_on_would_block(self, transferred: usize) -> bool {
    !matches!(self, Mode::Once) && self.is_satisfied(transferred)
  }

  fn limit(self) -> Option<usize> {
    match self {
      Mode::Once => None,
      Mode::Exact(target) => Some(target),
      Mode::Between { max, .. } => Some(max),
    }
  }
}

/// One direction of data movement with its own byte accounting.
pub(crate) trait Transfer {
  /// Issues one syscall at the current position.
  fn attempt(&mut self) -> Outcome;

  /// Records `n` bytes reported by the last attempt.
  fn advance(&mut self, n: usize);

  /// Total bytes recorded so far.
  fn transferred(&self) -> usize;
}

/// Runs `transfer` to completion under `mode`.
///
/// Returns the total number of bytes transferred.
pub(crate) fn drive<M, T>(
  manager: &M,
  registration: &M::Registration,
  gate: Gate<'_>,
  mode: Mode,
  op: &'static str,
  transfer: &mut T,
) -> Result<usize>
where
  M: ReadinessManager + ?Sized,
  T: Transfer + ?Sized,
{
  if mode.limit() == Some(0) {
    return Ok(0);
  }

  // A mode already met at zero bytes tries once without waiting.
  let mut token = if mode.settles_on_would_block(0) {
    gate.check(op)?;
    None
  } else {
    Some(wait_ready(manager, registration, gate, op)?)
  };

  loop {
    match transfer.attempt() {
      Outcome::Done(n) => {
        transfer.advance(n);
        let total = transfer.transferred();

        if let Some(limit) = mode.limit()
          && total > limit
        {
          invariant(format_args!(
            "{op}: transferred {total} bytes, limit was {limit}"
          ));
        }
        if mode.is_satisfied(total) {
          return Ok(total);
        }
        if n == 0 {
          invariant(format_args!("{op}: attempt made no progress"));
        }
        log::trace!(target: "readyio", "{op}: partial {n}, total {total}");
      }
      Outcome::WouldBlock => {
        let total = transfer.transferred();
        if mode.settles_on_would_block(total) {
          return Ok(total);
        }
        if let Some(token) = token {
          log::trace!(
            target: "readyio",
            "{op}: would block at token {}",
            token.version()
          );
          manager.unready(token, registration);
        }
        token = Some(wait_ready(manager, registration, gate, op)?);
      }
      Outcome::Restart => continue,
      Outcome::Closed => {
        let total = transfer.transferred();
        if mode.is_satisfied(total) {
          return Ok(total);
        }
        log::debug!(target: "readyio", "{op}: peer closed after {total} bytes");
        return Err(Error::Closed);
      }
      Outcome::Reset => {
        log::debug!(target: "readyio", "{op}: connection reset");
        return Err(Error::Reset);
      }
      Outcome::PipeClosed => {
        log::debug!(target: "readyio", "{op}: broken pipe");
        return Err(Error::PipeClosed);
      }
      Outcome::Fatal(errno) => unexpected_errno(op, errno),
    }
  }
}

/// The suspension point: gate checks around one `wait`.
fn wait_ready<M>(
  manager: &M,
  registration: &M::Registration,
  gate: Gate<'_>,
  op: &'static str,
) -> Result<Token>
where
  M: ReadinessManager + ?Sized,
{
  gate.check(op)?;
  let _subscription = gate.watch(|| manager.waker(registration));
  gate.check(op)?;

  let token = manager.wait(registration);

  gate.check(op)?;
  Ok(token)
}
