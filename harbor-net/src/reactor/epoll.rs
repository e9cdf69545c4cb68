//! epoll backend (Linux).

use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace};

use super::{Callback, Event, EventQueue};

const MAX_EVENTS: usize = 1024;

/// Wait timeout in milliseconds for the dispatch loop; bounds shutdown
/// latency.
const WAIT_TIMEOUT_MS: libc::c_int = 2;

/// Readiness interest carried per registration. The registration key is the
/// bare descriptor; one fd has exactly one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const READABLE: Interest = Interest {
        readable: true,
        writable: false,
    };
    pub const WRITABLE: Interest = Interest {
        readable: false,
        writable: true,
    };
    pub const READ_WRITE: Interest = Interest {
        readable: true,
        writable: true,
    };

    fn bits(self) -> u32 {
        let mut bits = 0;
        if self.readable {
            bits |= libc::EPOLLIN as u32;
        }
        if self.writable {
            bits |= libc::EPOLLOUT as u32;
        }
        bits
    }
}

struct Inner {
    ep: RawFd,
    handlers: RwLock<HashMap<RawFd, Callback>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

/// Cheap clonable handle over the shared reactor state; the dispatch thread
/// holds one clone.
#[derive(Clone)]
pub struct EpollReactor {
    inner: Arc<Inner>,
}

impl EpollReactor {
    pub fn new() -> io::Result<Self> {
        let ep = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if ep < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(EpollReactor {
            inner: Arc::new(Inner {
                ep,
                handlers: RwLock::new(HashMap::new()),
                thread: Mutex::new(None),
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// Register `fd` with the given interest. An fd that is already
    /// registered gets its interest and callback replaced.
    pub fn register(&self, fd: RawFd, interest: Interest, callback: Callback) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events: interest.bits(),
            u64: fd as u64,
        };
        let rc = unsafe { libc::epoll_ctl(self.inner.ep, libc::EPOLL_CTL_ADD, fd, &mut ev) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(err);
            }
            let rc = unsafe { libc::epoll_ctl(self.inner.ep, libc::EPOLL_CTL_MOD, fd, &mut ev) };
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        self.inner
            .handlers
            .write()
            .expect("reactor handler lock")
            .insert(fd, callback);
        trace!(fd, ?interest, "registered");
        Ok(())
    }

    pub fn unregister(&self, fd: RawFd) -> io::Result<()> {
        let mut ev: libc::epoll_event = unsafe { mem::zeroed() };
        let rc = unsafe { libc::epoll_ctl(self.inner.ep, libc::EPOLL_CTL_DEL, fd, &mut ev) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            // Unknown to the kernel: fine, unregister is idempotent.
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(err);
            }
        }
        self.inner
            .handlers
            .write()
            .expect("reactor handler lock")
            .remove(&fd);
        trace!(fd, "unregistered");
        Ok(())
    }

    pub fn spawn(&self) -> io::Result<()> {
        let mut slot = self.inner.thread.lock().expect("reactor thread lock");
        if slot.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "reactor is already running",
            ));
        }
        let reactor = self.clone();
        let handle = thread::Builder::new()
            .name("harbor-reactor".into())
            .spawn(move || reactor.dispatch_loop())?;
        *slot = Some(handle);
        Ok(())
    }

    pub fn join(&self) {
        let Some(handle) = self.inner.thread.lock().expect("reactor thread lock").take() else {
            return;
        };
        self.inner.shutdown.store(true, Ordering::Release);
        if handle.join().is_err() {
            error!("reactor thread panicked");
        }
        self.inner.shutdown.store(false, Ordering::Release);
    }

    fn dispatch_loop(&self) {
        debug!(ep = self.inner.ep, "dispatch loop started");
        let mut events: [libc::epoll_event; MAX_EVENTS] = unsafe { mem::zeroed() };

        while !self.inner.shutdown.load(Ordering::Acquire) {
            let count = unsafe {
                libc::epoll_wait(
                    self.inner.ep,
                    events.as_mut_ptr(),
                    MAX_EVENTS as libc::c_int,
                    WAIT_TIMEOUT_MS,
                )
            };
            if count < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                // Anything else here is a programming bug, not a runtime
                // condition the caller can handle.
                error!(error = %err, "epoll_wait failed");
                process::exit(1);
            }

            for raw in events.iter().take(count as usize) {
                let fd = raw.u64 as RawFd;
                let callback = {
                    let handlers = self.inner.handlers.read().expect("reactor handler lock");
                    handlers.get(&fd).cloned()
                };
                let Some(callback) = callback else {
                    trace!(fd, "readiness for unregistered fd");
                    continue;
                };

                let bits = raw.events;
                let hangup = bits & (libc::EPOLLHUP as u32 | libc::EPOLLERR as u32) != 0;
                let event = Event {
                    fd,
                    // A hangup must still reach the read path so the
                    // zero-byte read can observe EOF.
                    readable: bits & libc::EPOLLIN as u32 != 0 || hangup,
                    writable: bits & libc::EPOLLOUT as u32 != 0,
                    eof: hangup,
                    available: None,
                };
                callback(&event, self);
            }
        }
        debug!("dispatch loop exited");
    }
}

impl EventQueue for EpollReactor {
    type Key = RawFd;
    type Interest = Interest;

    fn register(&self, key: RawFd, interest: Interest, callback: Callback) -> io::Result<()> {
        EpollReactor::register(self, key, interest, callback)
    }

    fn unregister(&self, key: RawFd) -> io::Result<()> {
        EpollReactor::unregister(self, key)
    }

    fn spawn(&self) -> io::Result<()> {
        EpollReactor::spawn(self)
    }

    fn join(&self) {
        EpollReactor::join(self)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        unsafe { libc::close(self.ep) };
    }
}
