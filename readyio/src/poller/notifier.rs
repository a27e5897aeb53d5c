//! Wake pipe for a single registration.
//!
//! `poll` waits on the watched descriptor and on the read end of this pipe.
//! Writing a byte to the write end makes that `poll` return, which is how an
//! [`Interrupt`](crate::Interrupt) reaches a thread blocked in `wait`. A byte
//! written before the waiter reaches `poll` stays in the pipe, so the wakeup
//! is never lost.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::task::Wake;

pub struct Notifier {
  read_fd: OwnedFd,
  write_fd: OwnedFd,
}

impl Notifier {
  #[cfg(linux)]
  pub fn new() -> io::Result<Self> {
    let mut fds = [0 as RawFd; 2];
    syscall!(pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK))?;

    // SAFETY: pipe2 just returned these two descriptors and nothing else owns
    // them.
    Ok(unsafe { Self::from_fds(fds) })
  }

  #[cfg(not(linux))]
  pub fn new() -> io::Result<Self> {
    let mut fds = [0 as RawFd; 2];
    syscall!(pipe(fds.as_mut_ptr()))?;

    // SAFETY: see above, for pipe.
    let notifier = unsafe { Self::from_fds(fds) };
    for fd in [notifier.read_fd(), notifier.write_fd.as_raw_fd()] {
      syscall!(fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC))?;
      let flags = syscall!(fcntl(fd, libc::F_GETFL))?;
      syscall!(fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK))?;
    }
    Ok(notifier)
  }

  unsafe fn from_fds(fds: [RawFd; 2]) -> Self {
    Self {
      read_fd: unsafe { OwnedFd::from_raw_fd(fds[0]) },
      write_fd: unsafe { OwnedFd::from_raw_fd(fds[1]) },
    }
  }

  /// Descriptor to include in the `poll` set.
  pub fn read_fd(&self) -> RawFd {
    self.read_fd.as_raw_fd()
  }

  /// Makes the next (or current) `poll` on [`read_fd`](Self::read_fd) return.
  pub fn notify(&self) -> io::Result<()> {
    let byte: u8 = 1;
    let result = syscall!(write(
      self.write_fd.as_raw_fd(),
      &byte as *const u8 as *const libc::c_void,
      1,
    ));

    match result {
      // Pipe already full: a wakeup is pending anyway.
      Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
      other => other.map(|_| ()),
    }
  }

  /// Consumes pending wakeups.
  pub fn drain(&self) {
    let mut sink = [0u8; 64];
    loop {
      let res = syscall!(read(
        self.read_fd.as_raw_fd(),
        sink.as_mut_ptr().cast::<libc::c_void>(),
        sink.len(),
      ));
      match res {
        Ok(n) if n as usize == sink.len() => continue,
        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
        _ => break,
      }
    }
  }
}

impl Wake for Notifier {
  fn wake(self: Arc<Self>) {
    self.wake_by_ref();
  }

  fn wake_by_ref(self: &Arc<Self>) {
    if let Err(err) = self.notify() {
      log::warn!(target: "readyio", "failed to notify waiter: {err}");
    }
  }
}
