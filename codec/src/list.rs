//! Count-prefixed lists with a size ceiling.

use buffer::ByteBuffer;
use tracing::debug;
use wire::ProtocolVersion;

use crate::error::{CodecError, CodecResult, LimitKind};
use crate::limits::CodecLimits;

/// Outcome of [`pack_list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPacked {
    /// Every element was written.
    Complete { written: u32 },
    /// The size ceiling was hit; only the first `written` elements were kept.
    Truncated { written: u32 },
}

impl ListPacked {
    /// Number of elements on the wire.
    #[must_use]
    pub const fn written(self) -> u32 {
        match self {
            Self::Complete { written } | Self::Truncated { written } => written,
        }
    }

    #[must_use]
    pub const fn is_truncated(self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

/// Packs `elements` as a `u32` count followed by each element.
///
/// After each element the whole buffer length is compared with `max_bytes`;
/// the element that crosses it is rewound and the count patched to what was
/// kept, so the output is always a well-formed list. If `encode` fails the
/// whole list, count included, is rewound and the error returned.
pub fn pack_list<I, F>(
    elements: I,
    mut encode: F,
    buf: &mut ByteBuffer,
    version: ProtocolVersion,
    max_bytes: usize,
) -> CodecResult<ListPacked>
where
    I: IntoIterator,
    F: FnMut(I::Item, &mut ByteBuffer, ProtocolVersion) -> CodecResult<()>,
{
    let start = buf.checkpoint();
    buf.write_u32(0)?;

    let mut written: u32 = 0;
    for element in elements {
        let before = buf.checkpoint();
        if let Err(err) = encode(element, buf, version) {
            buf.rewind(start);
            return Err(err);
        }
        if buf.len() > max_bytes {
            buf.rewind(before);
            buf.patch_u32(start, written)?;
            debug!(written, max_bytes, "list truncated at size ceiling");
            return Ok(ListPacked::Truncated { written });
        }
        written = match written.checked_add(1) {
            Some(next) => next,
            None => {
                buf.rewind(start);
                return Err(CodecError::LimitsExceeded {
                    kind: LimitKind::ListElements,
                    limit: u32::MAX as usize,
                    actual: (u32::MAX as usize).saturating_add(1),
                });
            }
        };
    }

    buf.patch_u32(start, written)?;
    Ok(ListPacked::Complete { written })
}

/// Upper bound on the memory reserved up front by [`unpack_list`].
const PREALLOC_BYTES: usize = 64 * 1024;

/// Unpacks a list written by [`pack_list`].
///
/// The count is checked against `limits.max_list_len` before anything is
/// decoded. On failure every decoded element is dropped and the read cursor
/// is restored.
pub fn unpack_list<T, F>(
    buf: &mut ByteBuffer,
    mut decode: F,
    version: ProtocolVersion,
    limits: &CodecLimits,
) -> CodecResult<Vec<T>>
where
    F: FnMut(&mut ByteBuffer, ProtocolVersion) -> CodecResult<T>,
{
    buf.restoring(|buf| -> CodecResult<Vec<T>> {
        let count = buf.read_u32()? as usize;
        if count > limits.max_list_len {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::ListElements,
                limit: limits.max_list_len,
                actual: count,
            });
        }
        // The count is untrusted: reserve no more than the unread bytes could
        // hold, and never more than PREALLOC_BYTES of elements.
        let per_item = std::mem::size_of::<T>().max(1);
        let mut items =
            Vec::with_capacity(count.min(buf.remaining()).min(PREALLOC_BYTES / per_item));
        for _ in 0..count {
            items.push(decode(buf, version)?);
        }
        Ok(items)
    })
}
