//! Streaming buffers backing per-connection I/O.

mod byte_buffer;
mod ring;

pub use byte_buffer::ByteBuffer;
pub use ring::RingBuffer;
