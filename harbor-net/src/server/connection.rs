//! Per-connection state and the user handler contract.

use crate::buffer::ByteBuffer;

/// Application callback driven by the server.
///
/// `poll` runs on the reactor thread, at most once per read-readiness event.
/// It may consume any prefix of `read` and append any bytes to `write`; it
/// must not block, and must not retain references to either buffer past the
/// call.
pub trait ConnectionHandler: Send {
    fn poll(&mut self, read: &mut ByteBuffer, write: &mut ByteBuffer);
}

/// Builds one handler per accepted connection.
pub type HandlerFactory = Box<dyn Fn() -> Box<dyn ConnectionHandler> + Send + Sync>;

/// Server-side record for one client: the buffer pair plus the handler. The
/// connection owns both buffers; the handler only sees them during `poll`.
pub(crate) struct Connection {
    pub(crate) read_buffer: ByteBuffer,
    pub(crate) write_buffer: ByteBuffer,
    pub(crate) handler: Box<dyn ConnectionHandler>,
}

impl Connection {
    pub(crate) fn new(handler: Box<dyn ConnectionHandler>) -> Self {
        Connection {
            read_buffer: ByteBuffer::new(),
            write_buffer: ByteBuffer::new(),
            handler,
        }
    }
}
