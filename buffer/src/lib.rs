//! Bounds-checked byte buffer and primitive codecs for the hpcrpc wire protocol.
//!
//! This crate provides [`ByteBuffer`], the growable read/write cursor every
//! higher layer packs into and unpacks from.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are checked against the write cursor before
//!   any byte is consumed or allocated.
//! - **Network byte order** - Multi-byte integers are big-endian on every protocol version.
//! - **No domain knowledge** - This crate knows nothing about headers or message types.
//!
//! # Example
//!
//! ```
//! use buffer::ByteBuffer;
//!
//! let mut buf = ByteBuffer::new();
//! buf.write_u16(0x2800).unwrap();
//! buf.write_str("node[001-128]").unwrap();
//!
//! let mut buf = ByteBuffer::from_vec(buf.into_vec());
//! assert_eq!(buf.read_u16().unwrap(), 0x2800);
//! assert_eq!(buf.read_string().unwrap(), "node[001-128]");
//! ```

mod error;
mod primitive;
mod reader;
mod writer;

pub use error::{BufferError, BufferResult};
pub use primitive::Primitive;
pub use writer::{ByteBuffer, Checkpoint, DEFAULT_CAPACITY, MAX_BUFFER_BYTES};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roundtrip() {
        let buf = ByteBuffer::new();
        let bytes = buf.into_vec();
        assert!(bytes.is_empty());

        let buf = ByteBuffer::from_vec(bytes);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn mixed_roundtrip() {
        let mut buf = ByteBuffer::new();
        buf.write_u8(7).unwrap();
        buf.write_u16(0xBEEF).unwrap();
        buf.write_u32(1_000_000).unwrap();
        buf.write_u64(u64::MAX).unwrap();
        buf.write_i32(-5).unwrap();
        buf.write_bytes(&[1, 2, 3]).unwrap();
        buf.write_str("compute").unwrap();

        let mut buf = ByteBuffer::from_vec(buf.into_vec());
        assert_eq!(buf.read_u8().unwrap(), 7);
        assert_eq!(buf.read_u16().unwrap(), 0xBEEF);
        assert_eq!(buf.read_u32().unwrap(), 1_000_000);
        assert_eq!(buf.read_u64().unwrap(), u64::MAX);
        assert_eq!(buf.read_i32().unwrap(), -5);
        assert_eq!(buf.read_bytes().unwrap(), vec![1, 2, 3]);
        assert_eq!(buf.read_string().unwrap(), "compute");
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn same_buffer_read_after_write() {
        let mut buf = ByteBuffer::new();
        buf.write_u32(11).unwrap();
        assert_eq!(buf.read_u32().unwrap(), 11);
        buf.write_u32(12).unwrap();
        assert_eq!(buf.read_u32().unwrap(), 12);
        assert!(buf.read_u8().is_err());
    }
}
