use std::{
    alloc::{self, Layout},
    mem::size_of,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{error::RingError, mirrored};

const CACHE_LINE: usize = 64;

/// Producer-owned cache line: the write index plus whatever tag bits we need
/// are kept apart from the consumer's read index so the two never false-share.
#[repr(C, align(64))]
struct ProducerLine {
    write: AtomicUsize,
    _pad: [u8; CACHE_LINE - size_of::<AtomicUsize>()],
}

#[repr(C, align(64))]
struct ConsumerLine {
    read: AtomicUsize,
    _pad: [u8; CACHE_LINE - size_of::<AtomicUsize>()],
}

enum Backing {
    Mirrored(mirrored::MirroredMapping),
    Plain { ptr: *mut u8, layout: Layout },
}

/// Single-producer/single-consumer byte ring buffer.
///
/// `len` is always a power of two. When the platform allows it the backing
/// is a virtual-memory mirrored mapping (see [`mirrored`]) and
/// [`RingBuffer::is_mirrored`] is `true`; otherwise it falls back to a single
/// cache-line-aligned allocation and callers must handle the two-span
/// (wraparound) case themselves.
///
/// Producer and consumer are expected to run on the same thread in this
/// profile (the context pumps both sides from one `update` call), but the
/// index publication uses release/acquire ordering throughout so the same
/// buffer is safe if split across a producer thread and a consumer thread.
pub struct RingBuffer {
    backing: Backing,
    len: usize,
    mask: usize,
    producer: ProducerLine,
    consumer: ConsumerLine,
}

unsafe impl Send for RingBuffer {}

impl RingBuffer {
    /// `len` must be a nonzero power of two and at least one page.
    pub fn new(len: usize) -> Result<Self, RingError> {
        if len == 0 || (len & (len - 1)) != 0 {
            return Err(RingError::NotPowerOfTwo(len));
        }
        if len < 4096 {
            return Err(RingError::TooSmall(len));
        }

        let backing = match mirrored::try_create(len) {
            Some(mapping) => Backing::Mirrored(mapping),
            None => {
                tracing::warn!(len, "mirrored ring buffer mapping failed, falling back to plain allocation");
                let layout = Layout::from_size_align(len, CACHE_LINE)
                    .map_err(|_| RingError::AllocationFailed)?;
                let ptr = unsafe { alloc::alloc_zeroed(layout) };
                if ptr.is_null() {
                    return Err(RingError::AllocationFailed);
                }
                Backing::Plain { ptr, layout }
            }
        };

        Ok(Self {
            backing,
            len,
            mask: len - 1,
            producer: ProducerLine { write: AtomicUsize::new(0), _pad: [0; CACHE_LINE - size_of::<AtomicUsize>()] },
            consumer: ConsumerLine { read: AtomicUsize::new(0), _pad: [0; CACHE_LINE - size_of::<AtomicUsize>()] },
        })
    }

    #[inline]
    pub const fn is_mirrored(&self) -> bool {
        matches!(self.backing, Backing::Mirrored(_))
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        self.len
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        match &self.backing {
            Backing::Mirrored(m) => m.base,
            Backing::Plain { ptr, .. } => *ptr,
        }
    }

    /// Bytes currently available to read, branchless.
    #[inline]
    pub fn available_read(&self) -> usize {
        let w = self.producer.write.load(Ordering::Acquire);
        let r = self.consumer.read.load(Ordering::Relaxed);
        w - r
    }

    /// Bytes currently available to write. Mirrored buffers can use the full
    /// capacity; the plain fallback reserves one byte so a completely full
    /// buffer never collapses onto the masked "empty" address, matching the
    /// classic SPSC full/empty disambiguation.
    #[inline]
    pub fn available_write(&self) -> usize {
        let w = self.producer.write.load(Ordering::Relaxed);
        let r = self.consumer.read.load(Ordering::Acquire);
        let used = w - r;
        if self.is_mirrored() { self.len - used } else { self.len - 1 - used }
    }

    /// Largest contiguous writable span. In mirrored mode this is always the
    /// full `available_write()`; in the plain fallback it may be clipped by
    /// the physical end of the buffer, in which case the caller must
    /// `commit_write` the first span before a second call can see the rest.
    pub fn writable_span(&mut self) -> &mut [u8] {
        let avail = self.available_write();
        if avail == 0 {
            return &mut [];
        }
        let w = self.producer.write.load(Ordering::Relaxed);
        let offset = w & self.mask;
        let len = if self.is_mirrored() { avail } else { avail.min(self.len - offset) };
        unsafe { std::slice::from_raw_parts_mut(self.base().add(offset), len) }
    }

    /// Publishes `n` bytes written into the span previously returned by
    /// [`Self::writable_span`]. `n` is clamped to `available_write()`.
    pub fn commit_write(&mut self, n: usize) {
        let n = n.min(self.available_write());
        let w = self.producer.write.load(Ordering::Relaxed);
        self.producer.write.store(w.wrapping_add(n), Ordering::Release);
    }

    /// Peeks the largest contiguous readable span without advancing the read
    /// index. Used by the frame parser to inspect a header before deciding
    /// whether to consume it.
    pub fn readable_span(&self) -> &[u8] {
        let avail = self.available_read();
        if avail == 0 {
            return &[];
        }
        let r = self.consumer.read.load(Ordering::Relaxed);
        let offset = r & self.mask;
        let len = if self.is_mirrored() { avail } else { avail.min(self.len - offset) };
        if len >= CACHE_LINE {
            prefetch_read(unsafe { self.base().add(offset) });
        }
        unsafe { std::slice::from_raw_parts(self.base().add(offset), len) }
    }

    /// Releases `n` bytes previously returned by [`Self::readable_span`].
    /// `n` is clamped to `available_read()`.
    pub fn advance_read(&mut self, n: usize) {
        let n = n.min(self.available_read());
        let r = self.consumer.read.load(Ordering::Relaxed);
        self.consumer.read.store(r.wrapping_add(n), Ordering::Release);
    }

    /// Resets both indices to zero without touching the backing memory.
    /// Test-only; never called on the hot path.
    #[cfg(test)]
    pub fn reset(&mut self) {
        self.producer.write.store(0, Ordering::Relaxed);
        self.consumer.read.store(0, Ordering::Relaxed);
    }

    /// Convenience copy-in for callers that don't need the zero-copy span
    /// API (handshake bytes, test fixtures). Returns the number of bytes
    /// actually written.
    pub fn write_copy(&mut self, mut data: &[u8]) -> usize {
        let mut total = 0;
        while !data.is_empty() {
            let span = self.writable_span();
            if span.is_empty() {
                break;
            }
            let n = span.len().min(data.len());
            span[..n].copy_from_slice(&data[..n]);
            self.commit_write(n);
            data = &data[n..];
            total += n;
            if self.is_mirrored() {
                break;
            }
        }
        total
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        match &self.backing {
            Backing::Mirrored(m) => unsafe { m.unmap() },
            Backing::Plain { ptr, layout } => unsafe { alloc::dealloc(*ptr, *layout) },
        }
    }
}

#[inline]
fn prefetch_read(ptr: *const u8) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        std::arch::x86_64::_mm_prefetch(ptr.cast(), std::arch::x86_64::_MM_HINT_T0);
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = ptr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two() {
        assert!(matches!(RingBuffer::new(4097), Err(RingError::NotPowerOfTwo(_))));
        assert!(matches!(RingBuffer::new(0), Err(RingError::NotPowerOfTwo(_))));
    }

    #[test]
    fn empty_on_construction() {
        let rb = RingBuffer::new(4096).unwrap();
        assert_eq!(rb.available_read(), 0);
        assert_eq!(rb.available_write(), if rb.is_mirrored() { 4096 } else { 4095 });
    }

    #[test]
    fn write_then_read_round_trip() {
        let mut rb = RingBuffer::new(4096).unwrap();
        let n = rb.write_copy(b"hello world");
        assert_eq!(n, 11);
        assert_eq!(rb.available_read(), 11);
        assert_eq!(rb.readable_span(), b"hello world");
        rb.advance_read(11);
        assert_eq!(rb.available_read(), 0);
    }

    #[test]
    fn commit_write_is_clamped() {
        let mut rb = RingBuffer::new(4096).unwrap();
        let avail = rb.available_write();
        rb.commit_write(avail + 1_000_000);
        assert_eq!(rb.available_write(), 0);
    }

    #[test]
    fn advance_read_is_clamped() {
        let mut rb = RingBuffer::new(4096).unwrap();
        rb.write_copy(b"abc");
        rb.advance_read(1_000_000);
        assert_eq!(rb.available_read(), 0);
    }

    #[test]
    fn many_small_writes_preserve_order() {
        let mut rb = RingBuffer::new(4096).unwrap();
        let mut expected = Vec::new();
        for i in 0..200u8 {
            let chunk = [i, i.wrapping_add(1), i.wrapping_add(2)];
            rb.write_copy(&chunk);
            expected.extend_from_slice(&chunk);
        }
        let mut got = Vec::new();
        while rb.available_read() > 0 {
            let span = rb.readable_span();
            let n = span.len();
            got.extend_from_slice(span);
            rb.advance_read(n);
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn wrap_around_preserves_bytes_in_non_mirrored_mode() {
        // Force the fallback path regardless of platform mirroring support,
        // by exercising writes/reads that straddle the physical end.
        let mut rb = RingBuffer::new(4096).unwrap();
        // fill to 4000, drain 3990, leaving a small tail, then write past
        // the physical end of the buffer to force a wrap.
        let filler = vec![0xAAu8; 4000];
        rb.write_copy(&filler);
        rb.advance_read(3990);
        let more = vec![0xBBu8; 500];
        let written = rb.write_copy(&more);
        assert!(written > 0);

        let mut got = Vec::new();
        while rb.available_read() > 0 {
            let span = rb.readable_span();
            let n = span.len();
            got.extend_from_slice(span);
            rb.advance_read(n);
        }
        assert_eq!(got.len(), 10 + written);
        assert!(got[..10].iter().all(|&b| b == 0xAA));
        assert!(got[10..].iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn never_overcommits_available_capacity() {
        let rb = RingBuffer::new(4096).unwrap();
        let bound = if rb.is_mirrored() { 4096 } else { 4095 };
        assert!(rb.available_read() + rb.available_write() <= bound);
    }
}
