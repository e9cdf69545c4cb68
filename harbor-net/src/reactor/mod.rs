//! Readiness-driven event dispatch.
//!
//! One backend per OS family — kqueue on macOS and the BSDs, epoll on Linux.
//! Both run a single dispatch thread that waits on the kernel with a short
//! timeout, looks up the registered callback for each reported event under a
//! shared lock, and invokes it with a translated [`Event`] payload. The two
//! backends key their registrations differently (descriptor plus filter vs.
//! bare descriptor) and are not unified beyond the [`EventQueue`] contract;
//! [`Reactor`] aliases whichever one this target compiles.

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

#[cfg(target_os = "linux")]
pub mod epoll;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
))]
pub mod kqueue;

#[cfg(target_os = "linux")]
pub use epoll::{EpollReactor, Interest};
#[cfg(target_os = "linux")]
pub type Reactor = EpollReactor;

#[cfg(not(target_os = "linux"))]
pub use kqueue::{FilterKey, KqueueReactor};
#[cfg(not(target_os = "linux"))]
pub type Reactor = KqueueReactor;

/// Portable readiness payload. Backends translate their kernel event
/// structures into this before dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    /// Peer hangup, where the kernel reports one (EV_EOF / EPOLLHUP).
    pub eof: bool,
    /// Bytes known to be readable; kqueue reports this, epoll does not.
    pub available: Option<usize>,
}

/// Handler invoked on the dispatch thread. The reactor reference permits
/// re-entrant registration from inside a callback.
pub type Callback = Arc<dyn Fn(&Event, &Reactor) + Send + Sync>;

/// The contract shared by the two kernel backends. `Key` stays
/// backend-specific: `(fd, filter)` on kqueue, the bare descriptor on epoll.
pub trait EventQueue: Send + Sync + Sized {
    type Key: Copy + Eq + std::hash::Hash + Send;
    /// Per-registration interest; `()` on kqueue, where the filter is part
    /// of the key.
    type Interest: Copy + Send;

    /// Add `key` to the kernel interest set and record the callback.
    /// Registering an existing key replaces the prior binding.
    fn register(
        &self,
        key: Self::Key,
        interest: Self::Interest,
        callback: Callback,
    ) -> io::Result<()>;

    /// Remove `key` from the kernel set and the callback map. Idempotent on
    /// unknown keys.
    fn unregister(&self, key: Self::Key) -> io::Result<()>;

    /// Launch the dispatch thread. Fails if one is already running.
    fn spawn(&self) -> io::Result<()>;

    /// Stop the dispatch thread and wait for it. No-op when not spawned.
    fn join(&self);
}
