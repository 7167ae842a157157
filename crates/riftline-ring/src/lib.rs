mod error;
mod mirrored;
mod ring;

pub use error::RingError;
pub use ring::RingBuffer;
