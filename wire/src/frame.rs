//! Length-prefixed stream framing.
//!
//! Every message on a stream connection is preceded by a big-endian `u32`
//! holding the length of what follows.

use crate::error::{WireError, WireResult};
use crate::limits::Limits;

/// Size of the length prefix.
pub const FRAME_PREFIX_LEN: usize = 4;

/// Decodes a length prefix, rejecting frames above `limits.max_frame_bytes`.
pub fn frame_len(prefix: [u8; FRAME_PREFIX_LEN], limits: &Limits) -> WireResult<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    check_frame_len(len, limits)?;
    Ok(len)
}

/// Encodes the length prefix for a frame of `len` bytes.
pub fn encode_frame_prefix(len: usize, limits: &Limits) -> WireResult<[u8; FRAME_PREFIX_LEN]> {
    check_frame_len(len, limits)?;
    let len = u32::try_from(len).map_err(|_| WireError::OversizeMessage {
        len,
        limit: u32::MAX as usize,
    })?;
    Ok(len.to_be_bytes())
}

/// Splits one complete frame off the front of `bytes`.
///
/// Returns `Ok(None)` if more bytes are needed, otherwise the frame body and
/// the remaining bytes.
pub fn split_frame<'a>(bytes: &'a [u8], limits: &Limits) -> WireResult<Option<(&'a [u8], &'a [u8])>> {
    if bytes.len() < FRAME_PREFIX_LEN {
        return Ok(None);
    }
    let (prefix, rest) = bytes.split_at(FRAME_PREFIX_LEN);
    let mut raw = [0u8; FRAME_PREFIX_LEN];
    raw.copy_from_slice(prefix);
    let len = frame_len(raw, limits)?;
    if rest.len() < len {
        return Ok(None);
    }
    Ok(Some(rest.split_at(len)))
}

fn check_frame_len(len: usize, limits: &Limits) -> WireResult<()> {
    if len > limits.max_frame_bytes {
        return Err(WireError::OversizeMessage {
            len,
            limit: limits.max_frame_bytes,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_big_endian() {
        let prefix = encode_frame_prefix(0x0102_0304, &Limits::unlimited()).unwrap();
        assert_eq!(prefix, [1, 2, 3, 4]);
        assert_eq!(frame_len(prefix, &Limits::unlimited()).unwrap(), 0x0102_0304);
    }

    #[test]
    fn oversize_prefix_rejected() {
        let limits = Limits::for_testing();
        let err = frame_len((64 * 1024 + 1u32).to_be_bytes(), &limits).unwrap_err();
        assert_eq!(
            err,
            WireError::OversizeMessage {
                len: 64 * 1024 + 1,
                limit: 64 * 1024,
            }
        );
        assert!(encode_frame_prefix(64 * 1024 + 1, &limits).is_err());
    }

    #[test]
    fn split_needs_whole_frame() {
        let limits = Limits::default();
        assert_eq!(split_frame(&[0, 0], &limits).unwrap(), None);
        assert_eq!(split_frame(&[0, 0, 0, 3, 9, 9], &limits).unwrap(), None);

        let bytes = [0, 0, 0, 2, 7, 8, 0xFF];
        let (body, rest) = split_frame(&bytes, &limits).unwrap().unwrap();
        assert_eq!(body, &[7, 8]);
        assert_eq!(rest, &[0xFF]);
    }

    #[test]
    fn empty_frame() {
        let (body, rest) = split_frame(&[0, 0, 0, 0], &Limits::default())
            .unwrap()
            .unwrap();
        assert!(body.is_empty());
        assert!(rest.is_empty());
    }
}
