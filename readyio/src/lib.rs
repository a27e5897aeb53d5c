#![cfg_attr(docsrs, feature(doc_cfg))]

//! # readyio - blocking-style socket I/O over non-blocking descriptors
//!
//! readyio moves bytes through non-blocking sockets with plain, sequential
//! calls. Each operation keeps attempting the syscall, and when the kernel
//! says it would block it waits on a [`ReadinessManager`] until the
//! descriptor is ready again.
//!
//! ## Features
//! - **Exact, once and bounded receives** on streams, with partial results
//!   accumulated across any number of short reads.
//! - **Vectored sends** that resume mid-chunk after a short write.
//! - **Whole-datagram** send and receive, single or batched into a [`Slab`].
//! - **Interruption**: pass an [`Interrupt`] and raising it makes any waiting
//!   operation return [`Error::Interrupted`].
//!
//! *Note:* descriptors are borrowed. readyio never opens, closes, binds or
//! connects a socket, and expects it to be non-blocking already.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::os::fd::AsRawFd;
//! use std::os::unix::net::UnixStream;
//! use std::sync::Arc;
//!
//! use readyio::{Connection, Interrupt, Poller};
//!
//! let (a, b) = UnixStream::pair()?;
//! a.set_nonblocking(true)?;
//! b.set_nonblocking(true)?;
//!
//! let poller = Arc::new(Poller::new());
//! let left = Connection::new(a.as_raw_fd(), poller.clone())?;
//! let right = Connection::new(b.as_raw_fd(), poller)?;
//!
//! left.send_many(&[&b"hello, "[..], &b"world"[..]], None)?;
//!
//! let stop = Interrupt::new();
//! let greeting = right.recv_exact(12, Some(&stop))?;
//! assert_eq!(&greeting[..], b"hello, world");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Expected failures (peer reset, broken pipe, closed stream, interruption)
//! come back as [`Error`]. An errno the library does not expect from a
//! send or receive is a programming error: it is logged and then panics.

#[macro_use]
mod macros;

mod addr;
mod buf;
mod engine;
mod sync;

pub mod accounting;
pub mod datagram;
pub mod error;
pub mod interrupt;
pub mod poller;
pub mod readiness;
pub mod stream;
pub mod sys;

pub use bytes::Bytes;

pub use datagram::{Association, DEFAULT_MAX_DATAGRAM, DatagramSocket, Slab};
pub use error::{Error, Result};
pub use interrupt::Interrupt;
pub use poller::{Poller, Registration};
pub use readiness::{Direction, ReadinessManager, Token};
pub use stream::Connection;
