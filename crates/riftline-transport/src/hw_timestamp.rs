//! NIC hardware receive timestamp extraction.
//!
//! When `SO_TIMESTAMPING` is enabled on the socket (see
//! [`crate::socket::enable_hw_timestamping`]), every receive goes through
//! `recvmsg` with a control-message buffer instead of a plain `read`, so the
//! kernel can attach a `SCM_TIMESTAMPING` ancillary record alongside the
//! payload. That record carries up to three `timespec` entries — software,
//! a reserved legacy slot, and hardware — and the third is preferred
//! whenever it is nonzero.

use std::os::fd::RawFd;

#[repr(C)]
#[derive(Clone, Copy)]
struct Timespec3 {
    ts: [libc::timespec; 3],
}

/// Reads up to `buf.len()` bytes from `fd` via `recvmsg`, returning the byte
/// count and, if the kernel attached a timestamping record, the preferred
/// timestamp in nanoseconds since the epoch.
///
/// Returns `Ok((0, _))` on a would-block; callers map that the same way
/// they'd map `io::ErrorKind::WouldBlock` from a plain `read`.
#[cfg(target_os = "linux")]
pub fn recv_with_timestamp(fd: RawFd, buf: &mut [u8]) -> std::io::Result<(usize, Option<u64>)> {
    use std::{io, mem, ptr};

    let mut iov = libc::iovec { iov_base: buf.as_mut_ptr().cast(), iov_len: buf.len() };

    #[repr(C, align(8))]
    struct CmsgBuf([u8; 256]);
    let mut cbuf = CmsgBuf([0u8; 256]);

    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &raw mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cbuf.0.as_mut_ptr().cast();
    msg.msg_controllen = cbuf.0.len();

    let n = unsafe { libc::recvmsg(fd, &raw mut msg, libc::MSG_DONTWAIT) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    if n == 0 {
        return Ok((0, None));
    }

    let mut ts_ns = None;
    let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&raw const msg) };
    while !cmsg.is_null() {
        let hdr = unsafe { &*cmsg };
        if hdr.cmsg_level == libc::SOL_SOCKET && hdr.cmsg_type == libc::SO_TIMESTAMPING {
            let data = unsafe { libc::CMSG_DATA(cmsg) };
            if (data as usize) + mem::size_of::<Timespec3>() <= (cbuf.0.as_ptr() as usize) + cbuf.0.len() {
                let ts3 = unsafe { ptr::read_unaligned(data.cast::<Timespec3>()) };
                ts_ns = preferred_timestamp_ns(&ts3.ts);
            }
        }
        cmsg = unsafe { libc::CMSG_NXTHDR(&raw const msg, cmsg) };
    }

    Ok((n as usize, ts_ns))
}

#[cfg(not(target_os = "linux"))]
pub fn recv_with_timestamp(
    _fd: RawFd,
    _buf: &mut [u8],
) -> std::io::Result<(usize, Option<u64>)> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

fn preferred_timestamp_ns(ts: &[libc::timespec; 3]) -> Option<u64> {
    let hw = &ts[2];
    let sw = &ts[0];
    let nonzero = |t: &libc::timespec| t.tv_sec != 0 || t.tv_nsec != 0;
    let chosen = if nonzero(hw) {
        hw
    } else if nonzero(sw) {
        sw
    } else {
        return None;
    };
    let secs = u64::try_from(chosen.tv_sec).ok()?;
    let nanos = secs.saturating_mul(1_000_000_000).saturating_add(chosen.tv_nsec as u64);
    Some(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_hardware_slot_when_nonzero() {
        let ts = [
            libc::timespec { tv_sec: 1, tv_nsec: 1 },
            libc::timespec { tv_sec: 0, tv_nsec: 0 },
            libc::timespec { tv_sec: 2, tv_nsec: 500 },
        ];
        assert_eq!(preferred_timestamp_ns(&ts), Some(2_000_000_500));
    }

    #[test]
    fn falls_back_to_software_slot() {
        let ts = [
            libc::timespec { tv_sec: 1, tv_nsec: 1 },
            libc::timespec { tv_sec: 0, tv_nsec: 0 },
            libc::timespec { tv_sec: 0, tv_nsec: 0 },
        ];
        assert_eq!(preferred_timestamp_ns(&ts), Some(1_000_000_001));
    }

    #[test]
    fn none_when_both_zero() {
        let ts = [libc::timespec { tv_sec: 0, tv_nsec: 0 }; 3];
        assert_eq!(preferred_timestamp_ns(&ts), None);
    }
}
