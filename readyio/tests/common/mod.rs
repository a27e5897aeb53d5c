#![allow(dead_code)]

use std::net::{SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use readyio::{Association, Connection, DatagramSocket, Interrupt, Poller};

pub fn init() {
  let _ = env_logger::builder().is_test(true).try_init();
}

/// Two connected stream endpoints sharing one poller.
///
/// The `UnixStream`s own the descriptors and must outlive the connections.
pub struct StreamPair {
  pub left: Connection<Poller>,
  pub right: Connection<Poller>,
  _sockets: (UnixStream, UnixStream),
}

pub fn stream_pair() -> StreamPair {
  init();
  let (a, b) = UnixStream::pair().unwrap();
  a.set_nonblocking(true).unwrap();
  b.set_nonblocking(true).unwrap();

  let poller = Arc::new(Poller::new());
  StreamPair {
    left: Connection::new(a.as_raw_fd(), poller.clone()).unwrap(),
    right: Connection::new(b.as_raw_fd(), poller).unwrap(),
    _sockets: (a, b),
  }
}

pub struct UdpEndpoint {
  pub socket: DatagramSocket<Poller>,
  pub addr: SocketAddr,
  _owner: UdpSocket,
}

/// An unconnected UDP socket bound to an ephemeral loopback port.
pub fn udp_endpoint(poller: &Arc<Poller>) -> UdpEndpoint {
  init();
  let owner = UdpSocket::bind("127.0.0.1:0").unwrap();
  owner.set_nonblocking(true).unwrap();
  let addr = owner.local_addr().unwrap();
  let socket = DatagramSocket::new(
    owner.as_raw_fd(),
    Association::Unconnected,
    poller.clone(),
  )
  .unwrap();
  UdpEndpoint { socket, addr, _owner: owner }
}

pub struct DatagramPair {
  pub left: DatagramSocket<Poller>,
  pub right: DatagramSocket<Poller>,
  _sockets: (UnixDatagram, UnixDatagram),
}

/// Two connected unix datagram sockets.
pub fn datagram_pair() -> DatagramPair {
  init();
  let (a, b) = UnixDatagram::pair().unwrap();
  a.set_nonblocking(true).unwrap();
  b.set_nonblocking(true).unwrap();

  let poller = Arc::new(Poller::new());
  DatagramPair {
    left: DatagramSocket::new(
      a.as_raw_fd(),
      Association::Connected,
      poller.clone(),
    )
    .unwrap(),
    right: DatagramSocket::new(b.as_raw_fd(), Association::Connected, poller)
      .unwrap(),
    _sockets: (a, b),
  }
}

/// Raises `interrupt` from another thread after `delay`.
pub fn raise_after(interrupt: &Interrupt, delay: Duration) -> thread::JoinHandle<()> {
  let interrupt = interrupt.clone();
  thread::spawn(move || {
    thread::sleep(delay);
    interrupt.raise();
  })
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
  let mut rng = fastrand::Rng::with_seed(seed);
  let mut data = vec![0u8; len];
  rng.fill(&mut data);
  data
}
