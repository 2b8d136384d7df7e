//! Unpacking half of the [`ByteBuffer`] API.
//!
//! Every read is bounds-checked against the write cursor before any byte is
//! consumed or any allocation is made, and a failed read leaves the read
//! cursor untouched.

use crate::error::{BufferError, BufferResult};
use crate::primitive::Primitive;
use crate::writer::ByteBuffer;

impl ByteBuffer {
    /// Bytes consumed so far (the read cursor).
    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Bytes written but not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.processed
    }

    /// The unconsumed bytes.
    #[must_use]
    pub fn unread(&self) -> &[u8] {
        &self.data[self.processed..]
    }

    /// Moves the read cursor to an absolute offset.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidOffset`] if `offset` is beyond the write cursor.
    pub fn seek(&mut self, offset: usize) -> BufferResult<()> {
        if offset > self.data.len() {
            return Err(BufferError::InvalidOffset {
                offset,
                len: self.data.len(),
            });
        }
        self.processed = offset;
        Ok(())
    }

    /// Consumes `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> BufferResult<&[u8]> {
        self.ensure(len)?;
        let start = self.processed;
        self.processed += len;
        Ok(&self.data[start..start + len])
    }

    /// Reads one fixed-width value in network byte order.
    pub fn read<T: Primitive>(&mut self) -> BufferResult<T> {
        let bytes = self.read_raw(T::WIDTH)?;
        Ok(T::get(bytes))
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> BufferResult<u8> {
        self.read()
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> BufferResult<u16> {
        self.read()
    }

    /// Reads a big-endian `u32`, the width of byte-string lengths.
    pub fn read_u32(&mut self) -> BufferResult<u32> {
        self.read()
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> BufferResult<u64> {
        self.read()
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> BufferResult<i32> {
        self.read()
    }

    /// Reads a big-endian `i64`.
    pub fn read_i64(&mut self) -> BufferResult<i64> {
        self.read()
    }

    /// Reads a `u32` length followed by that many bytes.
    pub fn read_bytes(&mut self) -> BufferResult<Vec<u8>> {
        self.restoring(|buf| -> BufferResult<Vec<u8>> {
            let len = buf.read_u32()? as usize;
            Ok(buf.read_raw(len)?.to_vec())
        })
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> BufferResult<String> {
        self.restoring(|buf| -> BufferResult<String> {
            let len = buf.read_u32()? as usize;
            let offset = buf.processed;
            let bytes = buf.read_raw(len)?;
            String::from_utf8(bytes.to_vec()).map_err(|_| BufferError::InvalidUtf8 { offset })
        })
    }

    /// Reads a `u32` count followed by that many fixed-width elements.
    pub fn read_array<T: Primitive>(&mut self) -> BufferResult<Vec<T>> {
        self.restoring(|buf| -> BufferResult<Vec<T>> {
            let count = buf.read_u32()? as usize;
            let len = count
                .checked_mul(T::WIDTH)
                .ok_or(BufferError::LengthOverflow { length: count })?;
            let bytes = buf.read_raw(len)?;
            Ok(bytes.chunks_exact(T::WIDTH).map(T::get).collect())
        })
    }

    /// Reads a `u32` count followed by that many length-prefixed strings.
    pub fn read_str_array(&mut self) -> BufferResult<Vec<String>> {
        self.restoring(|buf| -> BufferResult<Vec<String>> {
            let count = buf.read_u32()? as usize;
            // Each string needs at least its 4-byte prefix.
            buf.ensure(count.saturating_mul(4))?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(buf.read_string()?);
            }
            Ok(items)
        })
    }

    /// Runs `read`, putting the read cursor back where it was if it fails.
    pub fn restoring<T, E>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let start = self.processed;
        let result = read(self);
        if result.is_err() {
            self.processed = start;
        }
        result
    }

    fn ensure(&self, len: usize) -> BufferResult<()> {
        let available = self.remaining();
        if len > available {
            return Err(BufferError::EndOfBuffer {
                requested: len,
                available,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_from_empty_fails() {
        let mut buf = ByteBuffer::from_vec(Vec::new());
        let err = buf.read_u8().unwrap_err();
        assert_eq!(
            err,
            BufferError::EndOfBuffer {
                requested: 1,
                available: 0
            }
        );
    }

    #[test]
    fn short_read_leaves_cursor_unchanged() {
        let mut buf = ByteBuffer::from_vec(vec![0x00, 0x01, 0x02]);
        assert_eq!(buf.read_u16().unwrap(), 1);
        assert!(buf.read_u32().is_err());
        assert_eq!(buf.processed(), 2);
        assert_eq!(buf.read_u8().unwrap(), 2);
    }

    #[test]
    fn truncated_bytes_restore_cursor_past_prefix() {
        // Declares 10 bytes but carries 2.
        let mut buf = ByteBuffer::from_vec(vec![0, 0, 0, 10, 1, 2]);
        let err = buf.read_bytes().unwrap_err();
        assert!(matches!(err, BufferError::EndOfBuffer { requested: 10, .. }));
        assert_eq!(buf.processed(), 0);
    }

    #[test]
    fn huge_declared_length_does_not_allocate() {
        let mut buf = ByteBuffer::from_vec(vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(buf.read_bytes().is_err());
        assert!(buf.read_array::<u64>().is_err());
        assert!(buf.read_str_array().is_err());
        assert_eq!(buf.processed(), 0);
    }

    #[test]
    fn invalid_utf8_rejected() {
        let mut buf = ByteBuffer::from_vec(vec![0, 0, 0, 2, 0xC3, 0x28]);
        let err = buf.read_string().unwrap_err();
        assert_eq!(err, BufferError::InvalidUtf8 { offset: 4 });
        assert_eq!(buf.processed(), 0);
    }

    #[test]
    fn read_array_roundtrip() {
        let mut buf = ByteBuffer::with_capacity(0);
        buf.write_array(&[10u32, 20, 30]).unwrap();
        assert_eq!(buf.read_array::<u32>().unwrap(), vec![10, 20, 30]);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn read_str_array_roundtrip() {
        let mut buf = ByteBuffer::with_capacity(0);
        buf.write_str_array(&["node[01-04]", "", "login1"]).unwrap();
        let items = buf.read_str_array().unwrap();
        assert_eq!(items, vec!["node[01-04]", "", "login1"]);
    }

    #[test]
    fn partial_str_array_failure_restores_cursor() {
        let mut buf = ByteBuffer::with_capacity(0);
        buf.write_u32(2).unwrap();
        buf.write_str("a").unwrap();
        buf.write_u32(5).unwrap();
        buf.write_raw(b"xy").unwrap();
        assert!(buf.read_str_array().is_err());
        assert_eq!(buf.processed(), 0);
    }

    #[test]
    fn seek_within_bounds() {
        let mut buf = ByteBuffer::from_vec(vec![1, 2, 3]);
        buf.seek(2).unwrap();
        assert_eq!(buf.read_u8().unwrap(), 3);
        assert!(buf.seek(4).is_err());
    }

    #[test]
    fn unread_tracks_cursor() {
        let mut buf = ByteBuffer::from_vec(vec![1, 2, 3]);
        buf.read_u8().unwrap();
        assert_eq!(buf.unread(), &[2, 3]);
    }
}
