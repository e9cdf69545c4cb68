//! Readiness-driven TCP server.
//!
//! The server binds a non-blocking listener, registers an accept handler
//! with the reactor, and keeps one [`Connection`] per client keyed by raw
//! descriptor. All handlers run on the reactor's dispatch thread; they reach
//! shared state through the context argument rather than owning it, which
//! keeps connections and the server free of reference cycles.

mod connection;
mod socket;

pub use connection::{ConnectionHandler, HandlerFactory};

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr;
use std::sync::{Arc, Mutex};

use socket2::Socket;
use tracing::{debug, info, warn};

use crate::buffer::ByteBuffer;
use crate::reactor::{Callback, Event, Reactor};
#[cfg(target_os = "linux")]
use crate::reactor::Interest;

use connection::Connection;

const READ_CHUNK: usize = 4096;
const WRITE_CHUNK: usize = 4096;

/// Suppress SIGPIPE when the peer has already gone away; the write error is
/// handled inline. BSD targets get the same via SO_NOSIGPIPE at accept.
#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

/// Shared state reached by the reactor callbacks.
struct ServerContext {
    factory: HandlerFactory,
    connections: Mutex<HashMap<RawFd, Connection>>,
}

pub struct TcpServer {
    addr: SocketAddr,
    reactor: Reactor,
    context: Arc<ServerContext>,
    listener: Mutex<Option<Socket>>,
}

impl TcpServer {
    pub fn new(addr: SocketAddr, factory: HandlerFactory) -> io::Result<Self> {
        Ok(TcpServer {
            addr,
            reactor: Reactor::new()?,
            context: Arc::new(ServerContext {
                factory,
                connections: Mutex::new(HashMap::new()),
            }),
            listener: Mutex::new(None),
        })
    }

    /// Bind, listen, register the accept handler, and start the reactor.
    pub fn serve(&self) -> io::Result<()> {
        let listener = socket::create_listener(self.addr)?;
        let listen_fd = listener.as_raw_fd();

        let context = Arc::clone(&self.context);
        let accept: Callback =
            Arc::new(move |event, reactor| accept_ready(&context, reactor, event));

        #[cfg(target_os = "linux")]
        self.reactor.register(listen_fd, Interest::READABLE, accept)?;
        #[cfg(not(target_os = "linux"))]
        self.reactor.register((listen_fd, libc::EVFILT_READ), accept)?;

        *self.listener.lock().expect("listener lock") = Some(listener);
        self.reactor.spawn()?;
        info!(addr = %self.addr, fd = listen_fd, "server listening");
        Ok(())
    }

    /// The bound address; differs from the requested one when port 0 was
    /// asked for.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        let guard = self.listener.lock().expect("listener lock");
        let Some(listener) = guard.as_ref() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "server is not serving",
            ));
        };
        listener
            .local_addr()?
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "listener has no inet address"))
    }

    /// Stop the reactor's dispatch thread and wait for it.
    pub fn join(&self) {
        self.reactor.join();
    }

    /// Stop the reactor, then tear down every open connection and the
    /// listener.
    pub fn shutdown(&self) {
        self.reactor.join();

        let mut connections = self.context.connections.lock().expect("connection table lock");
        for (fd, _) in connections.drain() {
            unregister_connection_keys(&self.reactor, fd);
            unsafe { libc::close(fd) };
        }
        drop(connections);

        if let Some(listener) = self.listener.lock().expect("listener lock").take() {
            let fd = listener.as_raw_fd();
            #[cfg(target_os = "linux")]
            let _ = self.reactor.unregister(fd);
            #[cfg(not(target_os = "linux"))]
            let _ = self.reactor.unregister((fd, libc::EVFILT_READ));
        }
        info!("server shut down");
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read readiness on the listener: accept until the kernel runs dry,
/// registering each new client for read and write readiness.
fn accept_ready(context: &Arc<ServerContext>, reactor: &Reactor, event: &Event) {
    loop {
        let client_fd = match accept_client(event.fd) {
            Ok(Some(fd)) => fd,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "accept failed");
                break;
            }
        };

        context
            .connections
            .lock()
            .expect("connection table lock")
            .insert(client_fd, Connection::new((context.factory)()));

        if let Err(err) = register_connection(reactor, context, client_fd) {
            warn!(fd = client_fd, error = %err, "failed to register connection");
            context
                .connections
                .lock()
                .expect("connection table lock")
                .remove(&client_fd);
            unsafe { libc::close(client_fd) };
            continue;
        }
        debug!(fd = client_fd, "connection accepted");
    }
}

#[cfg(target_os = "linux")]
fn accept_client(listen_fd: RawFd) -> io::Result<Option<RawFd>> {
    let fd = unsafe {
        libc::accept4(
            listen_fd,
            ptr::null_mut(),
            ptr::null_mut(),
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    };
    if fd < 0 {
        let err = io::Error::last_os_error();
        return match err.kind() {
            io::ErrorKind::WouldBlock => Ok(None),
            _ => Err(err),
        };
    }
    Ok(Some(fd))
}

#[cfg(not(target_os = "linux"))]
fn accept_client(listen_fd: RawFd) -> io::Result<Option<RawFd>> {
    let fd = unsafe { libc::accept(listen_fd, ptr::null_mut(), ptr::null_mut()) };
    if fd < 0 {
        let err = io::Error::last_os_error();
        return match err.kind() {
            io::ErrorKind::WouldBlock => Ok(None),
            _ => Err(err),
        };
    }
    // No accept4 here; set the flags after the fact.
    let nonblock = unsafe { libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK) };
    let cloexec = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
    let on: libc::c_int = 1;
    let nosigpipe = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_NOSIGPIPE,
            (&on as *const libc::c_int).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if nonblock < 0 || cloexec < 0 || nosigpipe < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }
    Ok(Some(fd))
}

#[cfg(target_os = "linux")]
fn register_connection(
    reactor: &Reactor,
    context: &Arc<ServerContext>,
    fd: RawFd,
) -> io::Result<()> {
    let ctx = Arc::clone(context);
    reactor.register(
        fd,
        Interest::READ_WRITE,
        Arc::new(move |event: &Event, reactor: &Reactor| {
            if event.readable {
                read_ready(&ctx, reactor, event);
            } else if event.writable {
                write_ready(&ctx, reactor, event);
            }
        }),
    )
}

#[cfg(not(target_os = "linux"))]
fn register_connection(
    reactor: &Reactor,
    context: &Arc<ServerContext>,
    fd: RawFd,
) -> io::Result<()> {
    let ctx = Arc::clone(context);
    reactor.register(
        (fd, libc::EVFILT_READ),
        Arc::new(move |event: &Event, reactor: &Reactor| read_ready(&ctx, reactor, event)),
    )?;
    let ctx = Arc::clone(context);
    reactor.register(
        (fd, libc::EVFILT_WRITE),
        Arc::new(move |event: &Event, reactor: &Reactor| write_ready(&ctx, reactor, event)),
    )
}

#[cfg(target_os = "linux")]
fn unregister_connection_keys(reactor: &Reactor, fd: RawFd) {
    if let Err(err) = reactor.unregister(fd) {
        warn!(fd, error = %err, "failed to unregister connection");
    }
}

#[cfg(not(target_os = "linux"))]
fn unregister_connection_keys(reactor: &Reactor, fd: RawFd) {
    for filter in [libc::EVFILT_READ, libc::EVFILT_WRITE] {
        if let Err(err) = reactor.unregister((fd, filter)) {
            warn!(fd, filter, error = %err, "failed to unregister connection");
        }
    }
}

enum SocketState {
    Open,
    Closed,
}

/// Read readiness on a client: drain the socket into the read buffer, give
/// the handler exactly one `poll`, then flush whatever it queued.
fn read_ready(context: &Arc<ServerContext>, reactor: &Reactor, event: &Event) {
    let mut connections = context.connections.lock().expect("connection table lock");
    let Some(connection) = connections.get_mut(&event.fd) else {
        return;
    };

    if let SocketState::Closed = drain_socket(event, &mut connection.read_buffer) {
        connections.remove(&event.fd);
        drop(connections);
        close_connection(reactor, event.fd);
        return;
    }

    connection
        .handler
        .poll(&mut connection.read_buffer, &mut connection.write_buffer);
    flush_write_buffer(event.fd, &mut connection.write_buffer);
}

/// Write readiness is currently informational; draining happens at the end
/// of the read path.
fn write_ready(_context: &Arc<ServerContext>, _reactor: &Reactor, _event: &Event) {}

/// Pull everything the kernel has for this event into `buffer`. On kqueue
/// the event carries the available byte count and an EOF flag; on epoll we
/// read until `EWOULDBLOCK` or the zero-byte read that signals EOF. An EOF
/// flag that arrives together with unread bytes does not close here: those
/// bytes still get their `poll`, and the follow-up event with nothing left
/// to read does the close.
fn drain_socket(event: &Event, buffer: &mut ByteBuffer) -> SocketState {
    let mut scratch = [0u8; READ_CHUNK];
    let mut remaining = event.available;
    let mut appended = 0usize;

    loop {
        if remaining == Some(0) {
            return if event.eof && appended == 0 {
                SocketState::Closed
            } else {
                SocketState::Open
            };
        }
        let n = unsafe { libc::read(event.fd, scratch.as_mut_ptr().cast(), scratch.len()) };
        if n == 0 {
            return SocketState::Closed;
        }
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return SocketState::Open;
            }
            warn!(fd = event.fd, error = %err, "read failed");
            return SocketState::Closed;
        }
        buffer.append(&scratch[..n as usize]);
        appended += n as usize;
        if let Some(rem) = remaining.as_mut() {
            *rem = rem.saturating_sub(n as usize);
        }
    }
}

/// Drain the write buffer to the socket until it is empty or the kernel
/// stops taking bytes. A partially written chunk re-queues its remainder;
/// the buffer holds nothing else at that point, so order is preserved.
fn flush_write_buffer(fd: RawFd, buffer: &mut ByteBuffer) {
    loop {
        let requeue = {
            let Some(chunk) = buffer.get_slice(WRITE_CHUNK) else {
                return;
            };
            let written = unsafe { libc::send(fd, chunk.as_ptr().cast(), chunk.len(), SEND_FLAGS) };
            if written >= 0 && written as usize == chunk.len() {
                None
            } else if written >= 0 {
                Some(chunk[written as usize..].to_vec())
            } else {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::WouldBlock {
                    warn!(fd, error = %err, "write failed");
                }
                Some(chunk.to_vec())
            }
        };
        if let Some(rest) = requeue {
            buffer.append(&rest);
            return;
        }
    }
}

/// Remove the kernel registrations and close the descriptor.
fn close_connection(reactor: &Reactor, fd: RawFd) {
    unregister_connection_keys(reactor, fd);
    unsafe { libc::close(fd) };
    debug!(fd, "connection closed");
}
