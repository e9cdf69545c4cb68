//! kqueue backend (macOS and the BSDs).

use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::process;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace, warn};

use super::{Callback, Event, EventQueue};

const MAX_EVENTS: usize = 1024;

/// Wait timeout for the dispatch loop; bounds shutdown latency.
const WAIT_TIMEOUT: libc::timespec = libc::timespec {
    tv_sec: 0,
    tv_nsec: 2_000_000,
};

/// Timeout for registration/removal change calls.
const CONTROL_TIMEOUT: libc::timespec = libc::timespec {
    tv_sec: 0,
    tv_nsec: 1_000_000,
};

/// Registration key: descriptor plus kevent filter (`EVFILT_READ` or
/// `EVFILT_WRITE`), so read and write interest on one descriptor are
/// independent registrations.
pub type FilterKey = (RawFd, i16);

struct Inner {
    kq: RawFd,
    handlers: RwLock<HashMap<FilterKey, Callback>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

/// Cheap clonable handle over the shared reactor state; the dispatch thread
/// holds one clone.
#[derive(Clone)]
pub struct KqueueReactor {
    inner: Arc<Inner>,
}

impl KqueueReactor {
    pub fn new() -> io::Result<Self> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(KqueueReactor {
            inner: Arc::new(Inner {
                kq,
                handlers: RwLock::new(HashMap::new()),
                thread: Mutex::new(None),
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    pub fn register(&self, key: FilterKey, callback: Callback) -> io::Result<()> {
        let (fd, filter) = key;
        self.change(fd, filter, libc::EV_ADD | libc::EV_ENABLE)?;
        self.inner
            .handlers
            .write()
            .expect("reactor handler lock")
            .insert(key, callback);
        trace!(fd, filter, "registered");
        Ok(())
    }

    pub fn unregister(&self, key: FilterKey) -> io::Result<()> {
        let (fd, filter) = key;
        match self.change(fd, filter, libc::EV_DELETE) {
            // Unknown to the kernel: fine, unregister is idempotent.
            Err(err) if err.raw_os_error() == Some(libc::ENOENT) => {}
            other => other?,
        }
        self.inner
            .handlers
            .write()
            .expect("reactor handler lock")
            .remove(&key);
        trace!(fd, filter, "unregistered");
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

    /// Apply one change to the kernel interest set.
    fn change(&self, fd: RawFd, filter: i16, flags: u16) -> io::Result<()> {
        let change = libc::kevent {
            ident: fd as usize,
            filter,
            flags,
            fflags: 0,
            data: 0,
            udata: ptr::null_mut(),
        };
        let rc = unsafe {
            libc::kevent(
                self.inner.kq,
                &change,
                1,
                ptr::null_mut(),
                0,
                &CONTROL_TIMEOUT,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn dispatch_loop(&self) {
        debug!(kq = self.inner.kq, "dispatch loop started");
        let mut events: [libc::kevent; MAX_EVENTS] = unsafe { mem::zeroed() };

        while !self.inner.shutdown.load(Ordering::Acquire) {
            let count = unsafe {
                libc::kevent(
                    self.inner.kq,
                    ptr::null(),
                    0,
                    events.as_mut_ptr(),
                    MAX_EVENTS as libc::c_int,
                    &WAIT_TIMEOUT,
                )
            };
            if count < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                // Anything else here is a programming bug, not a runtime
                // condition the caller can handle.
                error!(error = %err, "kevent wait failed");
                process::exit(1);
            }

            for raw in events.iter().take(count as usize) {
                let fd = raw.ident as RawFd;
                let key = (fd, raw.filter);
                let callback = {
                    let handlers = self.inner.handlers.read().expect("reactor handler lock");
                    handlers.get(&key).cloned()
                };
                let Some(callback) = callback else {
                    trace!(fd, filter = raw.filter, "readiness for unregistered key");
                    continue;
                };

                if raw.flags & libc::EV_ERROR != 0 {
                    warn!(fd, data = raw.data, "kernel reported an event error");
                }
                let event = Event {
                    fd,
                    readable: raw.filter == libc::EVFILT_READ,
                    writable: raw.filter == libc::EVFILT_WRITE,
                    eof: raw.flags & libc::EV_EOF != 0,
                    available: (raw.filter == libc::EVFILT_READ)
                        .then_some(raw.data.max(0) as usize),
                };
                callback(&event, self);
            }
        }
        debug!("dispatch loop exited");
    }
}

impl EventQueue for KqueueReactor {
    type Key = FilterKey;
    type Interest = ();

    fn register(&self, key: FilterKey, _interest: (), callback: Callback) -> io::Result<()> {
        KqueueReactor::register(self, key, callback)
    }

    fn unregister(&self, key: FilterKey) -> io::Result<()> {
        KqueueReactor::unregister(self, key)
    }

    fn spawn(&self) -> io::Result<()> {
        KqueueReactor::spawn(self)
    }

    fn join(&self) {
        KqueueReactor::join(self)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        unsafe { libc::close(self.kq) };
    }
}
