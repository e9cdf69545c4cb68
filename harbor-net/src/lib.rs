//! harbor-net: streaming buffers, a readiness-driven event reactor, and a
//! TCP server built on top of them.
//!
//! The reactor runs one dispatch thread over the platform's event queue
//! (kqueue on macOS/BSD, epoll on Linux) and invokes registered callbacks on
//! that thread. The server layers an accept loop and per-connection
//! [`ByteBuffer`] pairs on top, handing each read-readiness event to a user
//! [`ConnectionHandler`].

pub mod buffer;
mod error;
pub mod reactor;
pub mod server;

pub use buffer::{ByteBuffer, RingBuffer};
pub use error::RingError;
pub use server::{ConnectionHandler, HandlerFactory, TcpServer};
