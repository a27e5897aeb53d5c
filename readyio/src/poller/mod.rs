//! A `poll(2)` based readiness manager.
//!
//! Each [`Registration`] owns its readiness state and a wake pipe. `wait`
//! returns immediately while the registration is marked ready; otherwise it
//! polls the descriptor together with the wake pipe. Readiness reported by
//! the kernel bumps the registration's version and marks it ready again.
//!
//! `poll` is level-triggered, so a descriptor that became ready while nobody
//! was waiting is still reported on the next `wait`.

mod notifier;

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::task::Waker;

use notifier::Notifier;

use crate::error::unexpected_errno;
use crate::readiness::{Direction, ReadinessManager, Token};
use crate::sync::Mutex;

/// The default [`ReadinessManager`].
///
/// ```no_run
/// use std::os::fd::AsRawFd;
/// use std::os::unix::net::UnixStream;
/// use std::sync::Arc;
///
/// use readyio::{Connection, Poller};
///
/// let (a, _b) = UnixStream::pair()?;
/// a.set_nonblocking(true)?;
///
/// let conn = Connection::new(a.as_raw_fd(), Arc::new(Poller::new()))?;
/// conn.send(b"ping", None)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct Poller {
  _private: (),
}

impl Poller {
  pub fn new() -> Self {
    Self::default()
  }
}

pub struct Registration {
  fd: RawFd,
  direction: Direction,
  state: Mutex<State>,
  notifier: Arc<Notifier>,
}

struct State {
  version: u64,
  ready: bool,
}

impl Registration {
  fn events(&self) -> libc::c_short {
    match self.direction {
      Direction::Read => libc::POLLIN,
      Direction::Write => libc::POLLOUT,
    }
  }

  /// Current token if the registration is ready.
  fn ready_token(&self) -> Option<Token> {
    let state = self.state.lock();
    state.ready.then_some(Token(state.version))
  }

  fn current_token(&self) -> Token {
    Token(self.state.lock().version)
  }

  fn mark_ready(&self) -> Token {
    let mut state = self.state.lock();
    state.version += 1;
    state.ready = true;
    Token(state.version)
  }
}

impl ReadinessManager for Poller {
  type Registration = Registration;

  fn register(
    &self,
    fd: RawFd,
    direction: Direction,
  ) -> io::Result<Registration> {
    Ok(Registration {
      fd,
      direction,
      state: Mutex::new(State { version: 0, ready: true }),
      notifier: Arc::new(Notifier::new()?),
    })
  }

  fn wait(&self, registration: &Registration) -> Token {
    loop {
      if let Some(token) = registration.ready_token() {
        return token;
      }

      let mut fds = [
        libc::pollfd {
          fd: registration.fd,
          events: registration.events(),
          revents: 0,
        },
        libc::pollfd {
          fd: registration.notifier.read_fd(),
          events: libc::POLLIN,
          revents: 0,
        },
      ];

      match syscall!(poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1)) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
        Err(err) => {
          unexpected_errno("poll", err.raw_os_error().unwrap_or_default())
        }
      }

      // Errors and hangups count as ready: the next syscall reports them.
      if fds[0].revents != 0 {
        let token = registration.mark_ready();
        log::trace!(
          target: "readyio",
          "fd {} {:?} ready at token {}",
          registration.fd,
          registration.direction,
          token.version()
        );
        return token;
      }

      if fds[1].revents != 0 {
        registration.notifier.drain();
        return registration.current_token();
      }
    }
  }

  fn unready(&self, token: Token, registration: &Registration) {
    let mut state = registration.state.lock();
    if state.version == token.0 {
      state.ready = false;
    }
  }

  fn waker(&self, registration: &Registration) -> Waker {
    Waker::from(registration.notifier.clone())
  }
}
