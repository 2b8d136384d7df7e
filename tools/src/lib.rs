//! Inspection and ping tools for the hpcrpc protocol.
//!
//! - Inspect captured frames: header fields, forwarding block, return items
//!   and the decoded body
//! - Ping a peer and report its return code
//! - Answer pings, one connection at a time
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to see what is on the wire.

use std::fs;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use buffer::ByteBuffer;
use codec::{decode_frame_body, encode_frame, Dispatcher, Envelope, Ping, ReturnCode};
use glob::Pattern;
use serde::Serialize;
use tracing::{debug, warn};
use transport::TransportConfig;
use wire::{
    split_frame, take_deferred_type, unpack_header, Header, HeaderFlags, ProtocolVersion,
};

/// Return code sent for anything other than a ping.
pub const RC_UNEXPECTED_MESSAGE: i32 = 1;

/// Everything `inspect` learns about one frame.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    /// Bytes the frame occupies, prefix included.
    pub frame_len: usize,
    /// Routing copy of the message type on a deferred connection.
    pub deferred_type: Option<u16>,
    pub header: HeaderSummary,
    /// Length of the credential blob, if one is present.
    pub auth_len: Option<usize>,
    pub body: BodySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeaderSummary {
    pub version: String,
    pub version_raw: u16,
    pub flags: u16,
    pub flag_names: Vec<&'static str>,
    pub msg_type: u16,
    pub body_length: u32,
    pub forward: Option<ForwardSummary>,
    pub returns: Vec<ReturnSummary>,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForwardSummary {
    pub count: u16,
    pub nodelist: String,
    pub timeout_ms: u32,
    pub tree_width: u16,
    pub tree_depth: u16,
    pub alias_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnSummary {
    pub err: u32,
    pub msg_type: u16,
    pub node_name: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BodySummary {
    Decoded { type_name: String, value: String },
    Undecoded { bytes: usize, error: String },
}

const FLAG_NAMES: [(u16, &str); 5] = [
    (HeaderFlags::GLOBAL_AUTH_KEY, "GLOBAL_AUTH_KEY"),
    (HeaderFlags::DEFERRED_CONNECTION, "DEFERRED_CONNECTION"),
    (HeaderFlags::KEEP_BUFFER, "KEEP_BUFFER"),
    (HeaderFlags::NO_AUTH_CRED, "NO_AUTH_CRED"),
    (HeaderFlags::PACK_ADDRS, "PACK_ADDRS"),
];

/// Names of the known flag bits set in `flags`.
#[must_use]
pub fn flag_names(flags: HeaderFlags) -> Vec<&'static str> {
    FLAG_NAMES
        .iter()
        .filter(|(bit, _)| flags.contains(*bit))
        .map(|(_, name)| *name)
        .collect()
}

/// Returns `true` if `body` starts with a deferred routing tag.
///
/// A deferred frame carries a message type before the version, so the first
/// word is not a supported version while the second one is.
#[must_use]
pub fn looks_deferred(body: &[u8]) -> bool {
    let word = |at: usize| {
        body.get(at..at + 2)
            .map(|bytes| ProtocolVersion::from_raw(u16::from_be_bytes([bytes[0], bytes[1]])))
    };
    match (word(0), word(2)) {
        (Some(first), Some(second)) => !first.is_supported() && second.is_supported(),
        _ => false,
    }
}

/// Inspects the single length-prefixed frame in `bytes`.
pub fn inspect_frame(bytes: &[u8], dispatcher: &Dispatcher) -> Result<InspectReport> {
    let (body, rest) = split_frame(bytes, dispatcher.wire_limits())
        .context("read frame prefix")?
        .context("incomplete frame")?;
    if !rest.is_empty() {
        bail!("{} bytes after the frame", rest.len());
    }
    let frame_len = bytes.len();
    let deferred = looks_deferred(body);
    let mut buf = ByteBuffer::from_vec(body.to_vec());

    let deferred_type = if deferred {
        Some(take_deferred_type(&mut buf).context("read deferred type")?.raw())
    } else {
        None
    };
    let header_at = buf.processed();
    let header = unpack_header(&mut buf, dispatcher, dispatcher.wire_limits())
        .context("unpack header")?;
    let auth_len = if header.flags.has_auth_cred() {
        Some(buf.read_bytes().context("read credential")?.len())
    } else {
        None
    };

    buf.seek(header_at)?;
    let body = match dispatcher.dispatch_unpack(&mut buf) {
        Ok(envelope) => BodySummary::Decoded {
            type_name: envelope.body.type_name().to_string(),
            value: format!("{:?}", envelope.body),
        },
        Err(err) => {
            debug!(%err, msg_type = %header.msg_type, "body not decoded");
            BodySummary::Undecoded {
                bytes: header.body_length as usize,
                error: err.to_string(),
            }
        }
    };

    Ok(InspectReport {
        frame_len,
        deferred_type,
        header: summarize_header(&header),
        auth_len,
        body,
    })
}

fn summarize_header(header: &Header<codec::Payload>) -> HeaderSummary {
    let forward = header.forward.is_forwarded().then(|| ForwardSummary {
        count: header.forward.count,
        nodelist: header.forward.nodelist.clone(),
        timeout_ms: header.forward.timeout_ms,
        tree_width: header.forward.tree_width,
        tree_depth: header.forward.tree_depth,
        alias_bytes: header.forward.alias_addrs.len(),
    });
    HeaderSummary {
        version: header.version.to_string(),
        version_raw: header.version.raw(),
        flags: header.flags.raw(),
        flag_names: flag_names(header.flags),
        msg_type: header.msg_type.raw(),
        body_length: header.body_length,
        forward,
        returns: header
            .returns
            .iter()
            .map(|item| ReturnSummary {
                err: item.err,
                msg_type: item.msg_type.raw(),
                node_name: item.node_name.clone(),
                payload: format!("{:?}", item.payload),
            })
            .collect(),
        origin: header.origin.map(|addr| addr.to_string()),
    }
}

/// A captured frame file found by [`collect_frame_entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEntry {
    pub path: PathBuf,
    pub size: u64,
}

/// Lists the regular files in `dir`, optionally filtered by a glob matched
/// against the path or the file name.
pub fn collect_frame_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<FrameEntry>> {
    let mut entries = Vec::new();
    let pattern = match glob {
        Some(value) => Some(Pattern::new(value).context("invalid glob pattern")?),
        None => None,
    };

    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_path = pattern.matches_path(&path);
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !matches_path && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(FrameEntry { path, size });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Orders entries largest first, ties by path.
pub fn sort_by_size(entries: &mut [FrameEntry]) {
    entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
}

/// Sends a [`Ping`] to `addr` and returns the peer's [`ReturnCode`].
pub fn ping(
    addr: SocketAddr,
    dispatcher: &Dispatcher,
    version: ProtocolVersion,
    timeout: Duration,
    config: &TransportConfig,
) -> Result<ReturnCode> {
    let mut stream =
        transport::connect(addr, timeout, config, None).with_context(|| format!("connect {addr}"))?;
    let mut request = Envelope::new(Ping, version);
    let frame = encode_frame(dispatcher, &mut request).context("encode ping")?;
    transport::send(&mut stream, &[frame.as_slice()], timeout, config).context("send ping")?;

    let body = transport::recv_framed(&mut stream, timeout, config).context("receive reply")?;
    let reply = decode_frame_body(dispatcher, body).context("decode reply")?;
    let msg_type = reply.msg_type();
    reply
        .body
        .into_message::<ReturnCode>()
        .with_context(|| format!("expected a return code, got message type {msg_type}"))
}

/// Answers one request on `stream`.
///
/// A ping gets [`ReturnCode::SUCCESS`]; any other message, or one that does
/// not decode, gets [`RC_UNEXPECTED_MESSAGE`]. Requests sent on a deferred
/// connection are accepted with their routing tag. Returns the code sent.
pub fn serve_connection(
    stream: &mut TcpStream,
    dispatcher: &Dispatcher,
    timeout: Duration,
    config: &TransportConfig,
) -> Result<ReturnCode> {
    let body = transport::recv_framed(stream, timeout, config).context("receive request")?;
    let (rc, version) = match decode_request(dispatcher, body) {
        Ok(request) if request.body.is::<Ping>() => (ReturnCode::SUCCESS, request.version()),
        Ok(request) => {
            warn!(msg_type = %request.msg_type(), "unexpected request");
            (ReturnCode::new(RC_UNEXPECTED_MESSAGE), request.version())
        }
        Err(err) => {
            warn!("undecodable request: {err:#}");
            (
                ReturnCode::new(RC_UNEXPECTED_MESSAGE),
                ProtocolVersion::CURRENT,
            )
        }
    };

    let mut reply = Envelope::new(rc, version);
    let frame = encode_frame(dispatcher, &mut reply).context("encode reply")?;
    transport::send(stream, &[frame.as_slice()], timeout, config).context("send reply")?;
    Ok(rc)
}

/// Decodes one request body, skipping the routing tag of a deferred frame.
fn decode_request(dispatcher: &Dispatcher, body: Vec<u8>) -> Result<Envelope> {
    if !looks_deferred(&body) {
        return Ok(decode_frame_body(dispatcher, body)?);
    }
    let mut buf = ByteBuffer::from_vec(body);
    let routed = take_deferred_type(&mut buf).context("read deferred type")?;
    let request = dispatcher.dispatch_unpack(&mut buf)?;
    if buf.remaining() > 0 {
        bail!("{} bytes after the request", buf.remaining());
    }
    if request.msg_type() != routed {
        bail!(
            "routing tag {routed} does not match message type {}",
            request.msg_type()
        );
    }
    debug!(msg_type = %routed, "deferred request");
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_names_in_bit_order() {
        let flags = HeaderFlags::default()
            .with(HeaderFlags::PACK_ADDRS)
            .with(HeaderFlags::GLOBAL_AUTH_KEY);
        assert_eq!(flag_names(flags), ["GLOBAL_AUTH_KEY", "PACK_ADDRS"]);
        assert!(flag_names(HeaderFlags::default()).is_empty());
    }

    #[test]
    fn deferred_detection() {
        let current = ProtocolVersion::CURRENT.raw().to_be_bytes();
        let mut deferred = 1008u16.to_be_bytes().to_vec();
        deferred.extend_from_slice(&current);
        assert!(looks_deferred(&deferred));
        assert!(!looks_deferred(&[current[0], current[1], 0, 0]));
        assert!(!looks_deferred(&[0x03]));
    }

    #[test]
    fn deferred_request_decodes_past_routing_tag() {
        let dispatcher = Dispatcher::new(codec::Registry::with_builtin());
        let mut request = Envelope::new(Ping, ProtocolVersion::GEN_39)
            .with_flags(HeaderFlags::default().with(HeaderFlags::DEFERRED_CONNECTION));
        let frame = encode_frame(&dispatcher, &mut request).unwrap();

        let decoded = decode_request(&dispatcher, frame[4..].to_vec()).unwrap();
        assert!(decoded.body.is::<Ping>());
        assert_eq!(decoded.version(), ProtocolVersion::GEN_39);

        let mut mismatched = frame[4..].to_vec();
        mismatched[..2].copy_from_slice(&8001u16.to_be_bytes());
        assert!(decode_request(&dispatcher, mismatched).is_err());
    }

    #[test]
    fn size_sort_breaks_ties_by_path() {
        let entry = |path: &str, size| FrameEntry {
            path: PathBuf::from(path),
            size,
        };
        let mut entries = vec![entry("b", 5), entry("a", 5), entry("c", 9)];
        sort_by_size(&mut entries);
        let order: Vec<_> = entries.iter().map(|e| e.path.to_str().unwrap()).collect();
        assert_eq!(order, ["c", "a", "b"]);
    }
}
