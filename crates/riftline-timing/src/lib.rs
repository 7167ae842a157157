mod duration;
mod global_clock;
mod instant;

pub use duration::Duration;
pub use global_clock::{Clock, global_clock};
pub use instant::Instant;
