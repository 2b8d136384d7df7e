//! Whole-message stream frames: length prefix plus packed envelope.

use buffer::ByteBuffer;
use wire::{encode_frame_prefix, split_frame, FRAME_PREFIX_LEN};

use crate::dispatch::{Dispatcher, Envelope};
use crate::error::{CodecError, CodecResult};

/// Packs `envelope` behind a big-endian length prefix.
pub fn encode_frame(dispatcher: &Dispatcher, envelope: &mut Envelope) -> CodecResult<Vec<u8>> {
    let mut buf = ByteBuffer::new();
    let prefix_at = buf.checkpoint();
    buf.write_u32(0)?;
    dispatcher.dispatch_pack(envelope, &mut buf)?;

    let prefix = encode_frame_prefix(buf.len() - FRAME_PREFIX_LEN, dispatcher.wire_limits())?;
    buf.patch_u32(prefix_at, u32::from_be_bytes(prefix))?;
    Ok(buf.into_vec())
}

/// Decodes the first complete frame in `bytes`.
///
/// Returns `Ok(None)` if `bytes` does not yet hold a whole frame, otherwise the
/// envelope and the number of bytes the frame occupied.
pub fn decode_frame(
    dispatcher: &Dispatcher,
    bytes: &[u8],
) -> CodecResult<Option<(Envelope, usize)>> {
    let Some((body, rest)) = split_frame(bytes, dispatcher.wire_limits())? else {
        return Ok(None);
    };
    let envelope = decode_frame_body(dispatcher, body.to_vec())?;
    Ok(Some((envelope, bytes.len() - rest.len())))
}

/// Decodes a frame body that has already been split off its prefix.
///
/// The body must hold exactly one message.
pub fn decode_frame_body(dispatcher: &Dispatcher, body: Vec<u8>) -> CodecResult<Envelope> {
    let mut buf = ByteBuffer::from_vec(body);
    let envelope = dispatcher.dispatch_unpack(&mut buf)?;
    if buf.remaining() > 0 {
        return Err(CodecError::TrailingFrameBytes {
            remaining: buf.remaining(),
        });
    }
    Ok(envelope)
}
