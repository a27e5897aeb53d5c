//! Conversions between `std::net::SocketAddr` and raw `sockaddr` storage.
//!
//! Decoding is a pure transform of the bytes `recvfrom` filled in; nothing
//! here touches a descriptor.

use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Decodes the peer address returned by a receive call.
///
/// Returns `None` for address families other than IPv4/IPv6 (for example an
/// unnamed unix-domain peer) and for a `len` too short for the family.
pub fn decode(
  storage: &libc::sockaddr_storage,
  len: libc::socklen_t,
) -> Option<SocketAddr> {
  let len = len as usize;

  match storage.ss_family as libc::c_int {
    libc::AF_INET if len >= mem::size_of::<libc::sockaddr_in>() => {
      // SAFETY: family is AF_INET and the kernel wrote a full sockaddr_in;
      // sockaddr_storage is aligned for every sockaddr type.
      let sin = unsafe {
        &*(storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in>()
      };
      let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
      let port = u16::from_be(sin.sin_port);
      Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
    }
    libc::AF_INET6 if len >= mem::size_of::<libc::sockaddr_in6>() => {
      // SAFETY: as above, for AF_INET6 / sockaddr_in6.
      let sin6 = unsafe {
        &*(storage as *const libc::sockaddr_storage)
          .cast::<libc::sockaddr_in6>()
      };
      let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
      let port = u16::from_be(sin6.sin6_port);
      Some(SocketAddr::V6(SocketAddrV6::new(
        ip,
        port,
        sin6.sin6_flowinfo,
        sin6.sin6_scope_id,
      )))
    }
    _ => None,
  }
}

/// Encodes `addr` for `sendto`, returning the storage and its used length.
pub fn encode(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
  // SAFETY: sockaddr_storage is plain integers; all-zero is a valid value.
  let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };

  let len = match addr {
    SocketAddr::V4(v4) => {
      // SAFETY: sockaddr_in fits in and shares alignment with the storage.
      let sin = unsafe {
        &mut *(&mut storage as *mut libc::sockaddr_storage)
          .cast::<libc::sockaddr_in>()
      };
      #[cfg(apple)]
      {
        sin.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
      }
      sin.sin_family = libc::AF_INET as libc::sa_family_t;
      sin.sin_port = v4.port().to_be();
      sin.sin_addr = libc::in_addr { s_addr: u32::from(*v4.ip()).to_be() };
      mem::size_of::<libc::sockaddr_in>()
    }
    SocketAddr::V6(v6) => {
      // SAFETY: as above, for sockaddr_in6.
      let sin6 = unsafe {
        &mut *(&mut storage as *mut libc::sockaddr_storage)
          .cast::<libc::sockaddr_in6>()
      };
      #[cfg(apple)]
      {
        sin6.sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
      }
      sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
      sin6.sin6_port = v6.port().to_be();
      sin6.sin6_addr = libc::in6_addr { s6_addr: v6.ip().octets() };
      sin6.sin6_flowinfo = v6.flowinfo();
      sin6.sin6_scope_id = v6.scope_id();
      mem::size_of::<libc::sockaddr_in6>()
    }
  };

  (storage, len as libc::socklen_t)
}
