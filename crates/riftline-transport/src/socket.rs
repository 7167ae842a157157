//! Socket construction and low-level tuning.
//!
//! `std::net::TcpStream::connect_timeout` already implements exactly the
//! "non-blocking connect bounded by a timeout, blocking socket on return"
//! sequence the spec calls for, so this module uses it directly rather than
//! hand-rolling the non-blocking connect/poll dance in raw `libc` — the
//! buffer-size and hardware-timestamp tuning below still goes through raw
//! `libc::setsockopt`, following the reference crate's own precedent
//! (`flux-network`'s `set_socket_buf_size`) for socket options `std` doesn't
//! expose.

use std::{
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    os::fd::AsRawFd,
    time::Duration,
};

use crate::error::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Tuned for latency, not throughput: small enough that the kernel doesn't
/// coalesce many records before handing them to us.
const SOCKET_BUF_SIZE: usize = 256 * 1024;

pub fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|_| TransportError::ResolveFailed(host.to_string()))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| TransportError::ResolveFailed(host.to_string()))
}

pub fn connect(addr: SocketAddr) -> Result<TcpStream, TransportError> {
    let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|err| {
        if err.kind() == std::io::ErrorKind::TimedOut {
            TransportError::ConnectTimedOut(addr.to_string())
        } else {
            TransportError::Io(err)
        }
    })?;

    stream.set_nodelay(true).ok();
    set_keepalive(&stream);
    set_buf_size(&stream, SOCKET_BUF_SIZE);

    Ok(stream)
}

fn set_keepalive(stream: &TcpStream) {
    let fd = stream.as_raw_fd();
    let on: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            (&raw const on).cast(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

fn set_buf_size(stream: &TcpStream, size: usize) {
    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            (&raw const size).cast(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&raw const size).cast(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

/// Attempts to enable hardware (and software, as a fallback) receive
/// timestamping. Returns whether it succeeded; failure is not fatal, it
/// just means [`crate::transport::Transport::hw_ts_enabled`] stays `false`
/// and no NIC timestamps will be extracted.
#[cfg(target_os = "linux")]
pub fn enable_hw_timestamping(stream: &TcpStream) -> bool {
    let fd = stream.as_raw_fd();
    let flags: libc::c_uint = libc::SOF_TIMESTAMPING_RX_HARDWARE
        | libc::SOF_TIMESTAMPING_RX_SOFTWARE
        | libc::SOF_TIMESTAMPING_SOFTWARE
        | libc::SOF_TIMESTAMPING_RAW_HARDWARE;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TIMESTAMPING,
            (&raw const flags).cast(),
            core::mem::size_of::<libc::c_uint>() as libc::socklen_t,
        )
    };
    ret == 0
}

#[cfg(not(target_os = "linux"))]
pub fn enable_hw_timestamping(_stream: &TcpStream) -> bool {
    false
}
