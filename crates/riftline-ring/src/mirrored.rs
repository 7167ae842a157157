//! Virtual-memory double-mapping: reserve `2N` bytes of address space and map
//! the same `N`-byte backing twice in a row, so any span starting in the
//! first half can be read or written as a contiguous `N`-byte window with no
//! wraparound logic on the hot path.
//!
//! Mirrors the approach of the reference C implementation's
//! `try_create_mirrored_buffer`: anonymous `PROT_NONE` reservation, an
//! anonymous shared backing (`memfd_create` on Linux, `shm_open` + immediate
//! unlink elsewhere), two `MAP_FIXED | MAP_SHARED` mappings over the
//! reservation, then the descriptor is closed while the mappings live on.

use std::{
    ffi::CString,
    os::fd::RawFd,
    ptr,
    sync::atomic::{AtomicU32, Ordering},
};

/// A successfully established mirrored mapping. `base` points at the start
/// of a `2 * len` reservation whose first and second half are both backed
/// by the same `len` physical bytes.
pub struct MirroredMapping {
    pub base: *mut u8,
    pub len: usize,
}

impl MirroredMapping {
    /// # Safety
    /// `len` must be the exact length passed to [`try_create`], and the
    /// mapping must not already have been unmapped.
    pub unsafe fn unmap(&self) {
        unsafe {
            libc::munmap(self.base.cast(), 2 * self.len);
        }
    }
}

fn create_backing_fd(len: usize) -> Option<RawFd> {
    #[cfg(target_os = "linux")]
    {
        let name = CString::new("riftline-ring").ok()?;
        let fd = unsafe { libc::memfd_create(name.as_ptr(), 0) };
        if fd < 0 { None } else { Some(fd) }
    }

    #[cfg(not(target_os = "linux"))]
    {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = CString::new(format!("/riftline-ring-{}-{n}", unsafe { libc::getpid() })).ok()?;
        let fd = unsafe {
            libc::shm_open(name.as_ptr(), libc::O_CREAT | libc::O_RDWR | libc::O_EXCL, 0o600)
        };
        if fd < 0 {
            return None;
        }
        unsafe { libc::shm_unlink(name.as_ptr()) };
        Some(fd)
    }

    #[allow(unreachable_code)]
    {
        let _ = len;
        None
    }
}

/// Attempt to create a `len`-byte mirrored mapping. `len` must already be
/// validated as a nonzero power of two by the caller. Returns `None` on any
/// failure; the caller falls back to a plain allocation.
pub fn try_create(len: usize) -> Option<MirroredMapping> {
    let fd = create_backing_fd(len)?;

    let ok = unsafe { libc::ftruncate(fd, len as libc::off_t) } == 0;
    if !ok {
        unsafe { libc::close(fd) };
        return None;
    }

    let reservation = unsafe {
        libc::mmap(
            ptr::null_mut(),
            2 * len,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if reservation == libc::MAP_FAILED {
        unsafe { libc::close(fd) };
        return None;
    }
    let base = reservation.cast::<u8>();

    let first = unsafe {
        libc::mmap(
            base.cast(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_FIXED | libc::MAP_SHARED,
            fd,
            0,
        )
    };
    let second = if first != libc::MAP_FAILED {
        unsafe {
            libc::mmap(
                base.add(len).cast(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_FIXED | libc::MAP_SHARED,
                fd,
                0,
            )
        }
    } else {
        libc::MAP_FAILED
    };

    unsafe { libc::close(fd) };

    if first == libc::MAP_FAILED || second == libc::MAP_FAILED {
        unsafe { libc::munmap(base.cast(), 2 * len) };
        return None;
    }

    Some(MirroredMapping { base, len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_mapping_is_actually_mirrored() {
        let Some(mapping) = try_create(4096) else {
            // Some sandboxes (containers without memfd/shm_open access)
            // legitimately cannot create this mapping; the ring buffer
            // itself handles that by falling back, so the test does too.
            return;
        };

        unsafe {
            ptr::write_bytes(mapping.base, 0, 2 * mapping.len);
            mapping.base.write(0xAB);
            mapping.base.add(mapping.len - 1).write(0xCD);

            assert_eq!(mapping.base.add(mapping.len).read(), 0xAB);
            assert_eq!(mapping.base.add(2 * mapping.len - 1).read(), 0xCD);

            mapping.unmap();
        }
    }
}
