mod common;

use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use proptest::test_runner::Config;
use readyio::{Error, Interrupt};

/// Splits `data` at random points; some chunks come out empty.
fn chunked(data: &[u8], seed: u64, max_chunk: usize) -> Vec<Vec<u8>> {
  let mut rng = fastrand::Rng::with_seed(seed);
  let mut chunks = Vec::new();
  let mut rest = data;
  while !rest.is_empty() {
    let take = rng.usize(0..=max_chunk.min(rest.len()));
    let (head, tail) = rest.split_at(take);
    chunks.push(head.to_vec());
    rest = tail;
  }
  chunks
}

// Each round trip runs once with no interrupt and once with an interrupt that
// is never raised; both must behave the same.
macro_rules! round_trip_test {
  ($name:ident, $len:expr, |$pair:ident, $data:ident, $interrupt:ident| $body:block) => {
    pastey::paste! {
      #[test]
      fn [<$name _uninterruptible>]() {
        let $pair = common::stream_pair();
        let $data = common::payload($len, 0x5eed);
        let $interrupt: Option<&Interrupt> = None;
        $body
      }

      #[test]
      fn [<$name _interruptible>]() {
        let $pair = common::stream_pair();
        let $data = common::payload($len, 0x5eed);
        let never = Interrupt::new();
        let $interrupt = Some(&never);
        $body
        assert!(!never.is_raised());
      }
    }
  };
}

round_trip_test!(large_send_recv_exact, 4 << 20, |pair, data, interrupt| {
  thread::scope(|s| {
    s.spawn(|| pair.left.send(&data, interrupt).unwrap());
    let got = pair.right.recv_exact(data.len(), interrupt).unwrap();
    assert_eq!(got.len(), data.len());
    assert!(got[..] == data[..]);
  });
});

round_trip_test!(send_many_then_recv_exact, 1 << 20, |pair, data, interrupt| {
  let chunks = chunked(&data, 7, 8192);
  thread::scope(|s| {
    s.spawn(|| pair.left.send_many(&chunks, interrupt).unwrap());
    let got = pair.right.recv_exact(data.len(), interrupt).unwrap();
    assert!(got[..] == data[..]);
  });
});

round_trip_test!(recv_between_reassembles, 256 << 10, |pair, data, interrupt| {
  thread::scope(|s| {
    s.spawn(|| pair.left.send(&data, interrupt).unwrap());

    let mut rng = fastrand::Rng::with_seed(11);
    let mut got = Vec::with_capacity(data.len());
    while got.len() < data.len() {
      let left = data.len() - got.len();
      let max = rng.usize(1..=left.min(65_536));
      let min = rng.usize(1..=max);
      let part = pair.right.recv_between(min, max, interrupt).unwrap();
      assert!(part.len() >= min && part.len() <= max);
      got.extend_from_slice(&part);
    }
    assert!(got == data);
  });
});

#[test]
fn recv_between_with_exactly_min_available() {
  let pair = common::stream_pair();
  pair.left.send(b"12345", None).unwrap();

  let got = pair.right.recv_between(5, 4096, None).unwrap();
  assert_eq!(&got[..], b"12345");
}

#[test]
fn recv_between_zero_min_on_idle_stream_is_empty() {
  let pair = common::stream_pair();
  let interrupt = Interrupt::new();
  let raiser = common::raise_after(&interrupt, Duration::from_millis(300));

  let got = pair.right.recv_between(0, 16, Some(&interrupt)).unwrap();
  assert!(got.is_empty());
  assert!(!interrupt.is_raised());
  raiser.join().unwrap();
}

#[test]
fn recv_between_zero_min_after_interrupted_wait_does_not_block() {
  let pair = common::stream_pair();
  let interrupt = Interrupt::new();
  let raiser = common::raise_after(&interrupt, Duration::from_millis(50));
  assert_eq!(
    pair.right.recv_exact(4, Some(&interrupt)),
    Err(Error::Interrupted)
  );
  raiser.join().unwrap();

  // The read registration is left unready; a zero minimum must not wait on it.
  assert!(pair.right.recv_between(0, 16, None).unwrap().is_empty());

  pair.left.send(b"xyz", None).unwrap();
  assert_eq!(&pair.right.recv_between(0, 16, None).unwrap()[..], b"xyz");
}

#[test]
fn recv_once_is_bounded_by_max() {
  let pair = common::stream_pair();
  pair.left.send(b"abcdef", None).unwrap();

  assert_eq!(&pair.right.recv_once(4, None).unwrap()[..], b"abcd");
  assert_eq!(&pair.right.recv_once(64, None).unwrap()[..], b"ef");
}

#[test]
fn recv_once_waits_for_data() {
  let pair = common::stream_pair();
  thread::scope(|s| {
    s.spawn(|| {
      thread::sleep(Duration::from_millis(50));
      pair.left.send(b"late", None).unwrap();
    });
    assert_eq!(&pair.right.recv_once(16, None).unwrap()[..], b"late");
  });
}

#[test]
fn zero_length_operations_return_immediately() {
  let pair = common::stream_pair();
  pair.left.send(b"", None).unwrap();
  pair.left.send_many::<&[u8]>(&[], None).unwrap();
  pair.left.send_many(&[b"", b""], None).unwrap();
  assert!(pair.right.recv_exact(0, None).unwrap().is_empty());
  assert!(pair.right.recv_between(0, 0, None).unwrap().is_empty());
}

#[test]
fn interrupted_recv_leaves_connection_usable() {
  let pair = common::stream_pair();
  let interrupt = Interrupt::new();
  let raiser = common::raise_after(&interrupt, Duration::from_millis(50));

  assert_eq!(
    pair.right.recv_exact(10, Some(&interrupt)),
    Err(Error::Interrupted)
  );
  raiser.join().unwrap();

  pair.left.send(b"0123456789", None).unwrap();
  let got = pair.right.recv_exact(10, None).unwrap();
  assert_eq!(&got[..], b"0123456789");
}

#[test]
fn interrupt_raised_before_call_fails_without_io() {
  let pair = common::stream_pair();
  pair.left.send(b"queued", None).unwrap();

  let interrupt = Interrupt::new();
  interrupt.raise();
  assert_eq!(
    pair.right.recv_exact(6, Some(&interrupt)),
    Err(Error::Interrupted)
  );

  // Nothing was consumed.
  assert_eq!(&pair.right.recv_exact(6, None).unwrap()[..], b"queued");
}

#[test]
fn blocked_send_is_interruptible() {
  let pair = common::stream_pair();
  let interrupt = Interrupt::new();
  let raiser = common::raise_after(&interrupt, Duration::from_millis(50));

  // Nobody reads, so the socket buffer fills up and the send has to wait.
  let data = vec![0u8; 64 << 20];
  assert_eq!(pair.left.send(&data, Some(&interrupt)), Err(Error::Interrupted));
  raiser.join().unwrap();
}

#[test]
fn full_duplex_on_one_connection() {
  let pair = common::stream_pair();
  let up = common::payload(1 << 20, 1);
  let down = common::payload(1 << 20, 2);

  thread::scope(|s| {
    s.spawn(|| pair.left.send(&up, None).unwrap());
    s.spawn(|| pair.right.send(&down, None).unwrap());
    let left_got = s.spawn(|| pair.left.recv_exact(down.len(), None).unwrap());
    let right_got = pair.right.recv_exact(up.len(), None).unwrap();

    assert!(right_got[..] == up[..]);
    assert!(left_got.join().unwrap()[..] == down[..]);
  });
}

proptest! {
  #![proptest_config(Config::with_cases(16))]

  #[test]
  fn prop_send_many_preserves_order(
    len in 0usize..=65_536,
    seed in any::<u64>(),
    max_chunk in 1usize..=4096,
  ) {
    let pair = common::stream_pair();
    let data = common::payload(len, seed);
    let chunks = chunked(&data, seed, max_chunk);

    let got = thread::scope(|s| {
      s.spawn(|| pair.left.send_many(&chunks, None).unwrap());
      pair.right.recv_exact(len, None).unwrap()
    });
    prop_assert!(got[..] == data[..]);
  }
}
