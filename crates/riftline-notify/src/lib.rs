//! A thin readiness-notification abstraction over the platform's
//! edge-triggered poll primitive (`epoll` on Linux, `kqueue` on macOS),
//! exposing exactly the `add`/`mod`/`del`/`wait` surface the reference C
//! client's `ws_notifier` did, backed by `mio` the way the reference crate's
//! own `flux-network` connection manager already drives `mio::Poll` for its
//! sockets.
//!
//! There is only ever one registered descriptor in this profile (the
//! context's single socket), so `wait` does not return which fd fired.

use std::{io, os::fd::RawFd, time::Duration};

use mio::{Events, Interest, Poll, Token, unix::SourceFd};

/// Readable.
pub const EVENT_READ: u8 = 1 << 0;
/// Writable.
pub const EVENT_WRITE: u8 = 1 << 1;
/// Error/hangup (not independently requestable; always implicitly watched).
pub const EVENT_ERROR: u8 = 1 << 2;

const TOKEN: Token = Token(0);
/// Fixed wait timeout: bounds how long a local shutdown intent can take to
/// be noticed without needing a dedicated self-pipe wake fd.
const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

fn interest_for(events: u8) -> Interest {
    match (events & EVENT_READ != 0, events & EVENT_WRITE != 0) {
        (true, true) => Interest::READABLE.add(Interest::WRITABLE),
        (true, false) => Interest::READABLE,
        (false, true) => Interest::WRITABLE,
        (false, false) => Interest::READABLE,
    }
}

/// Edge-triggered readiness notifier for a single file descriptor.
pub struct Notifier {
    poll: Poll,
    events: Events,
    registered: bool,
}

impl Notifier {
    pub fn init() -> io::Result<Self> {
        Ok(Self { poll: Poll::new()?, events: Events::with_capacity(4), registered: false })
    }

    /// Registers `fd` with the given `EVENT_*` bitset. Replaces whatever was
    /// previously registered, if anything (this notifier only ever tracks
    /// one descriptor at a time, matching the contract).
    pub fn add(&mut self, fd: RawFd, events: u8) -> io::Result<()> {
        if self.registered {
            let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
        }
        self.poll.registry().register(&mut SourceFd(&fd), TOKEN, interest_for(events))?;
        self.registered = true;
        Ok(())
    }

    pub fn modify(&mut self, fd: RawFd, events: u8) -> io::Result<()> {
        self.poll.registry().reregister(&mut SourceFd(&fd), TOKEN, interest_for(events))
    }

    pub fn del(&mut self, fd: RawFd) -> io::Result<()> {
        self.registered = false;
        self.poll.registry().deregister(&mut SourceFd(&fd))
    }

    /// Blocks up to the fixed 100 ms timeout, then returns. Errors surfacing
    /// from `poll` itself (as opposed to socket-level errors, which are the
    /// caller's business once it calls `update`) are logged and swallowed —
    /// there is nothing actionable to do with them here.
    pub fn wait(&mut self) {
        if let Err(err) = self.poll.poll(&mut self.events, Some(WAIT_TIMEOUT)) {
            if err.kind() != io::ErrorKind::Interrupted {
                tracing::warn!(%err, "notifier poll failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsRawFd;

    use super::*;

    #[test]
    fn wait_times_out_with_nothing_registered() {
        let mut notifier = Notifier::init().unwrap();
        let start = std::time::Instant::now();
        notifier.wait();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn add_then_wait_sees_readable_pipe() {
        let mut notifier = Notifier::init().unwrap();
        let (mut rx, tx) = mio::unix::pipe::new().unwrap();
        notifier.add(rx.as_raw_fd(), EVENT_READ).unwrap();

        let mut tx = tx;
        use std::io::Write;
        tx.write_all(b"x").unwrap();

        notifier.wait();
        use std::io::Read;
        let mut buf = [0u8; 1];
        assert_eq!(rx.read(&mut buf).unwrap(), 1);
    }
}
