use thiserror::Error;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("ring buffer size {0} is not a power of two")]
    NotPowerOfTwo(usize),
    #[error("ring buffer size {0} is too small (minimum is one page)")]
    TooSmall(usize),
    #[error("failed to allocate ring buffer backing memory")]
    AllocationFailed,
}
