//! Versioned message header: types, packing and unpacking.
//!
//! The header is the envelope in front of every message body. Which optional
//! fields it carries depends on the negotiated [`ProtocolVersion`]; see
//! [`FieldSet`] for the per-generation table.

use std::net::SocketAddr;

use buffer::ByteBuffer;
use tracing::{debug, trace};

use crate::addr::{pack_addr, unpack_addr};
use crate::error::{LimitKind, WireError, WireResult};
use crate::fields::FieldSet;
use crate::forward::ForwardSpec;
use crate::limits::Limits;
use crate::version::ProtocolVersion;

/// Header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HeaderFlags(u16);

impl HeaderFlags {
    /// Credential was signed with the cluster-global key.
    pub const GLOBAL_AUTH_KEY: u16 = 1 << 0;

    /// The receiving end is a passthrough that routes on the message type
    /// before parsing the header; the type is sent a second time ahead of the version.
    pub const DEFERRED_CONNECTION: u16 = 1 << 1;

    /// Receiver should keep the raw body bytes after decoding.
    pub const KEEP_BUFFER: u16 = 1 << 2;

    /// No credential follows the header.
    pub const NO_AUTH_CRED: u16 = 1 << 6;

    /// Forwarding block carries pre-resolved destination addresses.
    pub const PACK_ADDRS: u16 = 1 << 7;

    /// Creates flags from a raw value. Unknown bits are preserved.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` if every bit of `bits` is set.
    #[must_use]
    pub const fn contains(self, bits: u16) -> bool {
        self.0 & bits == bits
    }

    /// Returns a copy with `bits` set.
    #[must_use]
    pub const fn with(self, bits: u16) -> Self {
        Self(self.0 | bits)
    }

    /// Returns a copy with `bits` cleared.
    #[must_use]
    pub const fn without(self, bits: u16) -> Self {
        Self(self.0 & !bits)
    }

    /// The message type is repeated ahead of the version for the passthrough.
    #[must_use]
    pub const fn is_deferred_connection(self) -> bool {
        self.contains(Self::DEFERRED_CONNECTION)
    }

    /// A credential follows the header unless `NO_AUTH_CRED` is set.
    #[must_use]
    pub const fn has_auth_cred(self) -> bool {
        !self.contains(Self::NO_AUTH_CRED)
    }

    /// Forwarded messages carry the aliased-address blob.
    #[must_use]
    pub const fn packs_addrs(self) -> bool {
        self.contains(Self::PACK_ADDRS)
    }
}

/// Message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageType(u16);

impl MessageType {
    /// Wraps a raw wire value. Any value is accepted; the registry decides
    /// which ones are known.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw wire value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One hop's answer, aggregated into the header of a forwarded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnItem<P> {
    /// Error code reported by the hop (0 on success).
    pub err: u32,
    /// Type of the nested payload.
    pub msg_type: MessageType,
    /// Node that produced the answer.
    pub node_name: String,
    /// Decoded nested payload.
    pub payload: P,
}

/// Message header.
///
/// `P` is the payload type of aggregated return items, supplied by the
/// [`PayloadCodec`] used to pack and unpack the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header<P> {
    pub version: ProtocolVersion,
    pub flags: HeaderFlags,
    pub msg_type: MessageType,
    /// Length of the body that follows the credential.
    pub body_length: u32,
    pub forward: ForwardSpec,
    pub returns: Vec<ReturnItem<P>>,
    /// Network address of the sender, if known.
    pub origin: Option<SocketAddr>,
}

impl<P> Header<P> {
    /// Creates a header for `msg_type` at the current protocol version.
    #[must_use]
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            version: ProtocolVersion::CURRENT,
            flags: HeaderFlags::default(),
            msg_type,
            body_length: 0,
            forward: ForwardSpec::none(),
            returns: Vec::new(),
            origin: None,
        }
    }

    /// Sets the protocol version the header is packed with.
    #[must_use]
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Sets the header flags.
    #[must_use]
    pub fn with_flags(mut self, flags: HeaderFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Packs and unpacks the nested payloads of return items.
///
/// This is the seam through which the header framer calls back into the
/// message dispatcher.
pub trait PayloadCodec {
    /// Decoded payload type.
    type Payload;
    /// Error type; must absorb framing errors.
    type Error: From<WireError>;

    fn pack_payload(
        &self,
        msg_type: MessageType,
        payload: &Self::Payload,
        buf: &mut ByteBuffer,
        version: ProtocolVersion,
    ) -> Result<(), Self::Error>;

    fn unpack_payload(
        &self,
        msg_type: MessageType,
        buf: &mut ByteBuffer,
        version: ProtocolVersion,
    ) -> Result<Self::Payload, Self::Error>;
}

/// Packs `header` using the field set of `header.version`.
///
/// On failure the buffer is rewound to where the header started.
pub fn pack_header<C>(
    header: &Header<C::Payload>,
    buf: &mut ByteBuffer,
    codec: &C,
) -> Result<(), C::Error>
where
    C: PayloadCodec + ?Sized,
{
    let start = buf.checkpoint();
    let result = pack_fields(header, buf, codec);
    if result.is_err() {
        buf.rewind(start);
    }
    result
}

fn pack_fields<C>(
    header: &Header<C::Payload>,
    buf: &mut ByteBuffer,
    codec: &C,
) -> Result<(), C::Error>
where
    C: PayloadCodec + ?Sized,
{
    let fields = FieldSet::for_version(header.version)?;
    pack_prefix(header, fields, buf)?;

    let count = u16::try_from(header.returns.len()).map_err(|_| WireError::LimitsExceeded {
        kind: LimitKind::ReturnItems,
        limit: u16::MAX as usize,
        actual: header.returns.len(),
    })?;
    buf.write_u16(count).map_err(WireError::from)?;
    for item in &header.returns {
        pack_return_prefix(item, buf)?;
        codec.pack_payload(item.msg_type, &item.payload, buf, header.version)?;
    }

    pack_addr(header.origin.as_ref(), fields, buf)?;
    trace!(
        version = %header.version,
        msg_type = header.msg_type.raw(),
        returns = header.returns.len(),
        "packed header"
    );
    Ok(())
}

fn pack_prefix<P>(header: &Header<P>, fields: &FieldSet, buf: &mut ByteBuffer) -> WireResult<()> {
    if header.flags.is_deferred_connection() {
        // Read by the passthrough, never by unpack_header.
        buf.write_u16(header.msg_type.raw())?;
    }
    buf.write_u16(header.version.raw())?;
    buf.write_u16(header.flags.raw())?;
    buf.write_u16(header.msg_type.raw())?;
    buf.write_u32(header.body_length)?;
    header.forward.pack(fields, header.flags, buf)
}

fn pack_return_prefix<P>(item: &ReturnItem<P>, buf: &mut ByteBuffer) -> WireResult<()> {
    buf.write_u32(item.err)?;
    buf.write_u16(item.msg_type.raw())?;
    buf.write_str(&item.node_name)?;
    Ok(())
}

/// Unpacks a header, starting at its version field.
///
/// The version is read first and checked against the compatibility window
/// before anything else. On any failure the read cursor is restored to where
/// the header started, so a rejected version consumes no bytes.
pub fn unpack_header<C>(
    buf: &mut ByteBuffer,
    codec: &C,
    limits: &Limits,
) -> Result<Header<C::Payload>, C::Error>
where
    C: PayloadCodec + ?Sized,
{
    buf.restoring(|buf| unpack_fields(buf, codec, limits))
}

fn unpack_fields<C>(
    buf: &mut ByteBuffer,
    codec: &C,
    limits: &Limits,
) -> Result<Header<C::Payload>, C::Error>
where
    C: PayloadCodec + ?Sized,
{
    let version = ProtocolVersion::from_raw(buf.read_u16().map_err(WireError::from)?);
    let fields = FieldSet::for_version(version).map_err(|err| {
        debug!(version = version.raw(), "rejecting header outside the compatibility window");
        err
    })?;

    let flags = HeaderFlags::from_raw(buf.read_u16().map_err(WireError::from)?);
    let msg_type = MessageType::new(buf.read_u16().map_err(WireError::from)?);
    let body_length = buf.read_u32().map_err(WireError::from)?;
    let forward = ForwardSpec::unpack(buf, fields, flags, limits)?;

    let count = buf.read_u16().map_err(WireError::from)? as usize;
    if count > limits.max_return_items {
        return Err(WireError::LimitsExceeded {
            kind: LimitKind::ReturnItems,
            limit: limits.max_return_items,
            actual: count,
        }
        .into());
    }
    let mut returns = Vec::with_capacity(return_capacity(count, buf.remaining()));
    for _ in 0..count {
        let (err, item_type, node_name) = unpack_return_prefix(buf)?;
        let payload = codec.unpack_payload(item_type, buf, version)?;
        returns.push(ReturnItem {
            err,
            msg_type: item_type,
            node_name,
            payload,
        });
    }

    let origin = unpack_addr(buf, fields)?;
    Ok(Header {
        version,
        flags,
        msg_type,
        body_length,
        forward,
        returns,
        origin,
    })
}

/// Smallest encoding of a return item: error code, type and an empty node name.
const RETURN_ITEM_MIN_BYTES: usize = 4 + 2 + 4;

/// Slots to reserve for `count` return items, bounded by what `remaining`
/// unread bytes could hold.
fn return_capacity(count: usize, remaining: usize) -> usize {
    count.min(remaining / RETURN_ITEM_MIN_BYTES)
}

fn unpack_return_prefix(buf: &mut ByteBuffer) -> WireResult<(u32, MessageType, String)> {
    let err = buf.read_u32()?;
    let msg_type = MessageType::new(buf.read_u16()?);
    let node_name = buf.read_string()?;
    Ok((err, msg_type, node_name))
}

/// Reads the routing copy of the message type that precedes the version when
/// [`HeaderFlags::DEFERRED_CONNECTION`] is set.
///
/// Only the passthrough on a deferred connection calls this; it must do so
/// before [`unpack_header`].
pub fn take_deferred_type(buf: &mut ByteBuffer) -> WireResult<MessageType> {
    Ok(MessageType::new(buf.read_u16()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Return payloads as opaque length-prefixed blobs.
    struct BlobCodec;

    impl PayloadCodec for BlobCodec {
        type Payload = Vec<u8>;
        type Error = WireError;

        fn pack_payload(
            &self,
            _msg_type: MessageType,
            payload: &Vec<u8>,
            buf: &mut ByteBuffer,
            _version: ProtocolVersion,
        ) -> WireResult<()> {
            buf.write_bytes(payload)?;
            Ok(())
        }

        fn unpack_payload(
            &self,
            _msg_type: MessageType,
            buf: &mut ByteBuffer,
            _version: ProtocolVersion,
        ) -> WireResult<Vec<u8>> {
            Ok(buf.read_bytes()?)
        }
    }

    fn sample() -> Header<Vec<u8>> {
        let mut header = Header::new(MessageType::new(1008));
        header.body_length = 12;
        header.origin = Some("192.168.0.7:6817".parse().unwrap());
        header
    }

    #[test]
    fn flags_helpers() {
        let flags = HeaderFlags::default().with(HeaderFlags::NO_AUTH_CRED | HeaderFlags::PACK_ADDRS);
        assert!(!flags.has_auth_cred());
        assert!(flags.packs_addrs());
        assert!(!flags.is_deferred_connection());
        let flags = flags.without(HeaderFlags::NO_AUTH_CRED);
        assert!(flags.has_auth_cred());
        assert_eq!(flags.raw(), HeaderFlags::PACK_ADDRS);
    }

    #[test]
    fn unknown_flag_bits_preserved() {
        let flags = HeaderFlags::from_raw(0x8001);
        assert_eq!(flags.raw(), 0x8001);
    }

    #[test]
    fn minimal_layout() {
        let mut header: Header<Vec<u8>> = Header::new(MessageType::new(0x0102));
        header.body_length = 5;
        let mut buf = ByteBuffer::with_capacity(0);
        pack_header(&header, &mut buf, &BlobCodec).unwrap();
        assert_eq!(
            buf.as_slice(),
            &[
                0x28, 0x00, // version
                0x00, 0x00, // flags
                0x01, 0x02, // msg_type
                0x00, 0x00, 0x00, 0x05, // body_length
                0x00, 0x00, // forward count
                0x00, 0x00, // return count
                0x00, 0x00, // AF_UNSPEC
            ]
        );
    }

    #[test]
    fn deferred_connection_type_precedes_version() {
        let header = sample().with_flags(HeaderFlags::from_raw(HeaderFlags::DEFERRED_CONNECTION));
        let mut buf = ByteBuffer::with_capacity(0);
        pack_header(&header, &mut buf, &BlobCodec).unwrap();
        assert_eq!(&buf.as_slice()[..4], &[0x03, 0xF0, 0x28, 0x00]);

        assert_eq!(take_deferred_type(&mut buf).unwrap(), MessageType::new(1008));
        let decoded = unpack_header(&mut buf, &BlobCodec, &Limits::default()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn roundtrip_with_returns() {
        let mut header = sample();
        header.returns = vec![
            ReturnItem {
                err: 0,
                msg_type: MessageType::new(8001),
                node_name: "node001".to_string(),
                payload: vec![0, 0, 0, 0],
            },
            ReturnItem {
                err: 2,
                msg_type: MessageType::new(8001),
                node_name: "node002".to_string(),
                payload: vec![],
            },
        ];
        let mut buf = ByteBuffer::with_capacity(0);
        pack_header(&header, &mut buf, &BlobCodec).unwrap();
        let decoded = unpack_header(&mut buf, &BlobCodec, &Limits::default()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn version_rejected_without_consuming() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x2400u16.to_be_bytes());
        bytes.extend_from_slice(&[0xAA; 16]);
        let mut buf = ByteBuffer::from_vec(bytes);
        let err = unpack_header(&mut buf, &BlobCodec, &Limits::default()).unwrap_err();
        assert_eq!(err, WireError::UnsupportedVersion { found: 0x2400 });
        assert_eq!(buf.processed(), 0);
    }

    #[test]
    fn pack_rejects_unsupported_version() {
        let header = sample().with_version(ProtocolVersion::from_raw(0x2900));
        let mut buf = ByteBuffer::with_capacity(0);
        buf.write_u8(0xEE).unwrap();
        let err = pack_header(&header, &mut buf, &BlobCodec).unwrap_err();
        assert!(matches!(err, WireError::UnsupportedVersion { found: 0x2900 }));
        assert_eq!(buf.as_slice(), &[0xEE]);
    }

    #[test]
    fn truncated_header_restores_cursor() {
        let mut buf = ByteBuffer::with_capacity(0);
        pack_header(&sample(), &mut buf, &BlobCodec).unwrap();
        let mut bytes = buf.into_vec();
        bytes.truncate(bytes.len() - 3);
        let mut buf = ByteBuffer::from_vec(bytes);
        let err = unpack_header(&mut buf, &BlobCodec, &Limits::default()).unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
        assert_eq!(buf.processed(), 0);
    }

    #[test]
    fn return_item_limit_checked_before_iterating() {
        let mut header = sample();
        header.returns = (0..20)
            .map(|i| ReturnItem {
                err: 0,
                msg_type: MessageType::new(8001),
                node_name: format!("node{i:03}"),
                payload: Vec::new(),
            })
            .collect();
        let mut buf = ByteBuffer::with_capacity(0);
        pack_header(&header, &mut buf, &BlobCodec).unwrap();
        let err = unpack_header(&mut buf, &BlobCodec, &Limits::for_testing()).unwrap_err();
        assert_eq!(
            err,
            WireError::LimitsExceeded {
                kind: LimitKind::ReturnItems,
                limit: 16,
                actual: 20,
            }
        );
    }

    #[test]
    fn return_capacity_bounded_by_unread_bytes() {
        assert_eq!(return_capacity(65_535, 0), 0);
        assert_eq!(return_capacity(65_535, 25), 2);
        assert_eq!(return_capacity(3, 1000), 3);
    }

    #[test]
    fn huge_return_count_without_items_fails_cleanly() {
        let bytes = [
            0x28, 0x00, // version
            0x00, 0x00, // flags
            0x01, 0x02, // msg_type
            0x00, 0x00, 0x00, 0x00, // body_length
            0x00, 0x00, // forward count
            0xFF, 0xFF, // return count
        ];
        let mut buf = ByteBuffer::from_vec(bytes.to_vec());
        let err = unpack_header(&mut buf, &BlobCodec, &Limits::default()).unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
        assert_eq!(buf.processed(), 0);
    }
}
