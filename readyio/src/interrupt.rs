//! Caller-driven cancellation.
//!
//! An [`Interrupt`] is a shared flag. Passing one to an operation makes it
//! interruptible: the engine checks the flag at every suspension point and
//! gives up with [`Error::Interrupted`] once it is raised. Raising also wakes
//! any operation currently blocked waiting for readiness, so a thread parked
//! in `wait` notices without needing new I/O.
//!
//! Timeouts are built on top by raising the flag from a timer:
//!
//! ```no_run
//! # use readyio::Interrupt;
//! let interrupt = Interrupt::new();
//! let timer = interrupt.clone();
//! std::thread::spawn(move || {
//!   std::thread::sleep(std::time::Duration::from_secs(5));
//!   timer.raise();
//! });
//! // conn.recv_exact(64, Some(&interrupt))
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

use crate::error::{Error, Result};
use crate::sync::Mutex;

/// A shared, externally raised cancellation flag.
#[derive(Clone, Default)]
pub struct Interrupt {
  inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
  raised: AtomicBool,
  waiters: Mutex<Waiters>,
}

#[derive(Default)]
struct Waiters {
  next_id: u64,
  wakers: Vec<(u64, Waker)>,
}

impl Interrupt {
  pub fn new() -> Self {
    Self::default()
  }

  /// Raises the flag and wakes every operation suspended on it.
  ///
  /// Raising is permanent; use a fresh `Interrupt` for the next operation.
  pub fn raise(&self) {
    self.inner.raised.store(true, Ordering::SeqCst);

    let wakers: Vec<Waker> = {
      let waiters = self.inner.waiters.lock();
      waiters.wakers.iter().map(|(_, waker)| waker.clone()).collect()
    };
    for waker in wakers {
      waker.wake();
    }
  }

  pub fn is_raised(&self) -> bool {
    self.inner.raised.load(Ordering::SeqCst)
  }

  fn subscribe(&self, waker: Waker) -> Subscription<'_> {
    let mut waiters = self.inner.waiters.lock();
    let id = waiters.next_id;
    waiters.next_id += 1;
    waiters.wakers.push((id, waker));
    Subscription { interrupt: self, id }
  }
}

impl std::fmt::Debug for Interrupt {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Interrupt").field("raised", &self.is_raised()).finish()
  }
}

/// Keeps a waker registered with an [`Interrupt`] until dropped.
pub(crate) struct Subscription<'a> {
  interrupt: &'a Interrupt,
  id: u64,
}

impl Drop for Subscription<'_> {
  fn drop(&mut self) {
    let mut waiters = self.interrupt.inner.waiters.lock();
    waiters.wakers.retain(|(id, _)| *id != self.id);
  }
}

/// The cancellation capability an operation runs with.
///
/// `None` means uninterruptible: every check passes and nothing subscribes.
#[derive(Clone, Copy)]
pub(crate) struct Gate<'a> {
  interrupt: Option<&'a Interrupt>,
}

impl<'a> Gate<'a> {
  pub fn new(interrupt: Option<&'a Interrupt>) -> Self {
    Self { interrupt }
  }

  pub fn check(&self, op: &'static str) -> Result<()> {
    match self.interrupt {
      Some(interrupt) if interrupt.is_raised() => {
        log::debug!(target: "readyio", "{op}: interrupted");
        Err(Error::Interrupted)
      }
      _ => Ok(()),
    }
  }

  /// Registers the waker of the registration about to be waited on.
  ///
  /// The flag must be checked again after this returns: a raise that
  /// happened before the subscription did not see the waker.
  pub fn watch(
    &self,
    waker: impl FnOnce() -> Waker,
  ) -> Option<Subscription<'a>> {
    self.interrupt.map(|interrupt| interrupt.subscribe(waker()))
  }
}
