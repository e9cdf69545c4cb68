//! Reactor lifecycle and dispatch behavior, driven through OS pipes.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use harbor_net::reactor::{Callback, Reactor};
#[cfg(target_os = "linux")]
use harbor_net::reactor::Interest;

fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0 as libc::c_int; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0, "pipe() failed");
    (fds[0], fds[1])
}

fn close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

#[cfg(target_os = "linux")]
fn register_read(reactor: &Reactor, fd: RawFd, callback: Callback) {
    reactor.register(fd, Interest::READABLE, callback).unwrap();
}

#[cfg(not(target_os = "linux"))]
fn register_read(reactor: &Reactor, fd: RawFd, callback: Callback) {
    reactor.register((fd, libc::EVFILT_READ), callback).unwrap();
}

#[cfg(target_os = "linux")]
fn unregister_read(reactor: &Reactor, fd: RawFd) {
    reactor.unregister(fd).unwrap();
}

#[cfg(not(target_os = "linux"))]
fn unregister_read(reactor: &Reactor, fd: RawFd) {
    reactor.unregister((fd, libc::EVFILT_READ)).unwrap();
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn join_without_spawn_is_a_noop() {
    let reactor = Reactor::new().unwrap();
    reactor.join();
    reactor.join();
}

#[test]
fn spawn_join_cycle_repeats() {
    let reactor = Reactor::new().unwrap();
    reactor.spawn().unwrap();
    reactor.join();
    // The shutdown flag was reset; a second cycle must work.
    reactor.spawn().unwrap();
    reactor.join();
}

#[test]
fn spawn_twice_without_join_fails() {
    let reactor = Reactor::new().unwrap();
    reactor.spawn().unwrap();
    assert!(reactor.spawn().is_err());
    reactor.join();
}

#[test]
fn readiness_reaches_the_callback() {
    let (read_fd, write_fd) = pipe();
    let reactor = Reactor::new().unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    register_read(
        &reactor,
        read_fd,
        Arc::new(move |event, _reactor| {
            assert!(event.readable);
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    reactor.spawn().unwrap();

    assert_eq!(unsafe { libc::write(write_fd, b"x".as_ptr().cast(), 1) }, 1);
    assert!(
        wait_until(Duration::from_secs(2), || hits.load(Ordering::SeqCst) > 0),
        "callback never fired"
    );

    unregister_read(&reactor, read_fd);
    reactor.join();
    close(read_fd);
    close(write_fd);
}

#[test]
fn unregistered_key_is_ignored_and_unregister_is_idempotent() {
    let (read_fd, write_fd) = pipe();
    let reactor = Reactor::new().unwrap();

    register_read(&reactor, read_fd, Arc::new(|_event, _reactor| {}));
    unregister_read(&reactor, read_fd);
    // Second removal of the same key must succeed quietly.
    unregister_read(&reactor, read_fd);

    reactor.spawn().unwrap();
    // Events for the unregistered descriptor are dropped without effect.
    assert_eq!(unsafe { libc::write(write_fd, b"x".as_ptr().cast(), 1) }, 1);
    std::thread::sleep(Duration::from_millis(20));
    reactor.join();
    close(read_fd);
    close(write_fd);
}

#[test]
fn callback_can_register_reentrantly() {
    let (first_read, first_write) = pipe();
    let (second_read, second_write) = pipe();
    let reactor = Reactor::new().unwrap();

    let second_hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&second_hits);
    let second_callback: Callback = Arc::new(move |_event, _reactor| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // The first callback registers the second descriptor from inside the
    // dispatch thread.
    register_read(
        &reactor,
        first_read,
        Arc::new(move |_event, reactor| {
            register_read(reactor, second_read, Arc::clone(&second_callback));
        }),
    );
    reactor.spawn().unwrap();

    assert_eq!(unsafe { libc::write(first_write, b"x".as_ptr().cast(), 1) }, 1);
    assert_eq!(unsafe { libc::write(second_write, b"y".as_ptr().cast(), 1) }, 1);
    assert!(
        wait_until(Duration::from_secs(2), || {
            second_hits.load(Ordering::SeqCst) > 0
        }),
        "re-entrantly registered callback never fired"
    );

    reactor.join();
    for fd in [first_read, first_write, second_read, second_write] {
        close(fd);
    }
}

#[test]
fn replacing_a_registration_swaps_the_callback() {
    let (read_fd, write_fd) = pipe();
    let reactor = Reactor::new().unwrap();

    let old_hits = Arc::new(AtomicUsize::new(0));
    let new_hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&old_hits);
    register_read(
        &reactor,
        read_fd,
        Arc::new(move |_event, _reactor| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let counter = Arc::clone(&new_hits);
    register_read(
        &reactor,
        read_fd,
        Arc::new(move |_event, _reactor| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    reactor.spawn().unwrap();
    assert_eq!(unsafe { libc::write(write_fd, b"x".as_ptr().cast(), 1) }, 1);
    assert!(
        wait_until(Duration::from_secs(2), || new_hits.load(Ordering::SeqCst) > 0),
        "replacement callback never fired"
    );
    assert_eq!(old_hits.load(Ordering::SeqCst), 0);

    reactor.join();
    close(read_fd);
    close(write_fd);
}
