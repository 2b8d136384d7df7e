//! Growable byte buffer and the packing half of its API.

use crate::error::{BufferError, BufferResult};
use crate::primitive::Primitive;

/// Hard ceiling on the size of a single buffer.
pub const MAX_BUFFER_BYTES: usize = 0xffff_0000;

/// Initial allocation for [`ByteBuffer::new`].
pub const DEFAULT_CAPACITY: usize = 16 * 1024;

/// A write position captured by [`ByteBuffer::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(usize);

impl Checkpoint {
    /// Byte offset of the checkpoint from the start of the buffer.
    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }
}

/// A growable, bounds-checked byte buffer with an append cursor and a read cursor.
///
/// The write cursor is the buffer length; the read cursor ("processed") only
/// moves forward over bytes that have already been written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    pub(crate) data: Vec<u8>,
    pub(crate) processed: usize,
}

impl ByteBuffer {
    /// Creates an empty buffer with [`DEFAULT_CAPACITY`] bytes pre-allocated.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty buffer with `bytes` of pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes.min(MAX_BUFFER_BYTES)),
            processed: 0,
        }
    }

    /// Wraps received bytes for unpacking, read cursor at the start.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, processed: 0 }
    }

    /// Number of bytes written (the write cursor).
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Currently allocated capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// All written bytes, regardless of the read cursor.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer and returns the written bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Discards all bytes and resets both cursors.
    pub fn clear(&mut self) {
        self.data.clear();
        self.processed = 0;
    }

    /// Captures the current write cursor.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.data.len())
    }

    /// Truncates the buffer back to `checkpoint`, discarding everything appended since.
    ///
    /// Rewinding to a checkpoint beyond the write cursor is a no-op. The read
    /// cursor is clamped so it never points past the new end.
    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        self.data.truncate(checkpoint.0);
        self.processed = self.processed.min(self.data.len());
    }

    /// Overwrites a previously written `u32` at `at` without moving the cursors.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidOffset`] if the four bytes at `at` were not written yet.
    pub fn patch_u32(&mut self, at: Checkpoint, value: u32) -> BufferResult<()> {
        let end = at.0.checked_add(4).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(BufferError::InvalidOffset {
                offset: at.0,
                len: self.data.len(),
            });
        };
        self.data[at.0..end].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Appends one fixed-width value in network byte order.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::BufferOverflow`] if the buffer would exceed [`MAX_BUFFER_BYTES`].
    pub fn write<T: Primitive>(&mut self, value: T) -> BufferResult<()> {
        self.grow_for(T::WIDTH)?;
        value.put(&mut self.data);
        Ok(())
    }

    /// Appends one byte.
    pub fn write_u8(&mut self, value: u8) -> BufferResult<()> {
        self.write(value)
    }

    /// Appends a big-endian `u16`.
    pub fn write_u16(&mut self, value: u16) -> BufferResult<()> {
        self.write(value)
    }

    /// Appends a big-endian `u32`.
    pub fn write_u32(&mut self, value: u32) -> BufferResult<()> {
        self.write(value)
    }

    /// Appends a big-endian `u64`.
    pub fn write_u64(&mut self, value: u64) -> BufferResult<()> {
        self.write(value)
    }

    /// Appends a big-endian two's-complement `i32`.
    pub fn write_i32(&mut self, value: i32) -> BufferResult<()> {
        self.write(value)
    }

    /// Appends a big-endian two's-complement `i64`.
    pub fn write_i64(&mut self, value: i64) -> BufferResult<()> {
        self.write(value)
    }

    /// Appends bytes verbatim, without a length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> BufferResult<()> {
        self.grow_for(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends a `u32` length followed by the bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::LengthOverflow`] if `bytes` is longer than `u32::MAX`.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> BufferResult<()> {
        let len = wire_len(bytes.len())?;
        self.grow_for(4 + bytes.len())?;
        len.put(&mut self.data);
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends a length-prefixed string (no terminator).
    pub fn write_str(&mut self, value: &str) -> BufferResult<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Appends a `u32` count followed by each element.
    pub fn write_array<T: Primitive>(&mut self, items: &[T]) -> BufferResult<()> {
        let count = wire_len(items.len())?;
        let body = items
            .len()
            .checked_mul(T::WIDTH)
            .ok_or(BufferError::LengthOverflow {
                length: items.len(),
            })?;
        self.grow_for(body.saturating_add(4))?;
        count.put(&mut self.data);
        for item in items {
            item.put(&mut self.data);
        }
        Ok(())
    }

    /// Appends a `u32` count followed by each length-prefixed string.
    ///
    /// On failure the buffer is rewound to where the array started.
    pub fn write_str_array<S: AsRef<str>>(&mut self, items: &[S]) -> BufferResult<()> {
        let start = self.checkpoint();
        let result: BufferResult<()> = (|| {
            self.write_u32(wire_len(items.len())?)?;
            for item in items {
                self.write_str(item.as_ref())?;
            }
            Ok(())
        })();
        if result.is_err() {
            self.rewind(start);
        }
        result
    }

    fn grow_for(&mut self, additional: usize) -> BufferResult<()> {
        let room = MAX_BUFFER_BYTES.saturating_sub(self.data.len());
        if additional > room {
            return Err(BufferError::BufferOverflow {
                attempted: additional,
                capacity: room,
            });
        }
        self.data.reserve(additional);
        Ok(())
    }
}

fn wire_len(len: usize) -> BufferResult<u32> {
    u32::try_from(len).map_err(|_| BufferError::LengthOverflow { length: len })
}
