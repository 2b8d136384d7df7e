//! Message dispatcher.
//!
//! Turns an [`Envelope`] into header, credential and body bytes and back,
//! routing the body through the [`Registry`].

use buffer::ByteBuffer;
use tracing::{debug, warn};
use wire::{
    pack_header, unpack_header, Header, HeaderFlags, Limits, MessageType, PayloadCodec,
    ProtocolVersion,
};

use crate::auth::{AuthCredential, AuthPlugin, NoAuth};
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::limits::CodecLimits;
use crate::registry::{Payload, Registry, WireMessage};

/// A message with its header, credential and decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub header: Header<Payload>,
    /// Credential; filled in by [`Dispatcher::dispatch_pack`] unless
    /// [`HeaderFlags::NO_AUTH_CRED`] is set.
    pub auth: Option<AuthCredential>,
    pub body: Payload,
}

impl Envelope {
    /// Wraps `message` at the given protocol version.
    pub fn new<M: WireMessage>(message: M, version: ProtocolVersion) -> Self {
        Self::from_payload(M::MSG_TYPE, Payload::new(message), version)
    }

    pub fn from_payload(msg_type: MessageType, body: Payload, version: ProtocolVersion) -> Self {
        Self {
            header: Header::new(msg_type).with_version(version),
            auth: None,
            body,
        }
    }

    /// Sets the header flags.
    #[must_use]
    pub fn with_flags(mut self, flags: HeaderFlags) -> Self {
        self.header.flags = flags;
        self
    }

    /// Negotiated protocol version of this message.
    #[must_use]
    pub const fn version(&self) -> ProtocolVersion {
        self.header.version
    }

    #[must_use]
    pub const fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }
}

/// Packs and unpacks envelopes through a codec registry.
///
/// Read-only once built; share it by reference between threads.
pub struct Dispatcher {
    registry: Registry,
    auth: Box<dyn AuthPlugin>,
    limits: CodecLimits,
    wire_limits: Limits,
}

impl Dispatcher {
    /// Creates a dispatcher with [`NoAuth`] and default limits.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            auth: Box::new(NoAuth),
            limits: CodecLimits::default(),
            wire_limits: Limits::default(),
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: impl AuthPlugin + 'static) -> Self {
        self.auth = Box::new(auth);
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_wire_limits(mut self, wire_limits: Limits) -> Self {
        self.wire_limits = wire_limits;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub const fn limits(&self) -> &CodecLimits {
        &self.limits
    }

    #[must_use]
    pub const fn wire_limits(&self) -> &Limits {
        &self.wire_limits
    }

    /// Packs `envelope` into `buf`.
    ///
    /// Computes the header's body length and, unless `NO_AUTH_CRED` is set,
    /// signs the body and stores the credential in the envelope. On failure
    /// both `buf` and `envelope` are left as they were.
    pub fn dispatch_pack(&self, envelope: &mut Envelope, buf: &mut ByteBuffer) -> CodecResult<()> {
        let version = envelope.header.version.check()?;
        let msg_type = envelope.header.msg_type;
        let codec = self.registry.get(msg_type)?;

        let mut body = ByteBuffer::new();
        codec.encode(&envelope.body, &mut body, version)?;
        self.check_body_bytes(body.len())?;
        let body_length = u32::try_from(body.len()).map_err(|_| CodecError::LimitsExceeded {
            kind: LimitKind::BodyBytes,
            limit: u32::MAX as usize,
            actual: body.len(),
        })?;
        let auth = if envelope.header.flags.has_auth_cred() {
            Some(self.auth.sign(body.as_slice())?)
        } else {
            None
        };

        let start = buf.checkpoint();
        let previous_length = std::mem::replace(&mut envelope.header.body_length, body_length);
        let previous_auth = std::mem::replace(&mut envelope.auth, auth);
        if let Err(err) = self.write_envelope(envelope, body.as_slice(), buf) {
            buf.rewind(start);
            envelope.header.body_length = previous_length;
            envelope.auth = previous_auth;
            return Err(err);
        }
        debug!(msg_type = msg_type.raw(), %version, body_length, "packed message");
        Ok(())
    }

    fn write_envelope(
        &self,
        envelope: &Envelope,
        body: &[u8],
        buf: &mut ByteBuffer,
    ) -> CodecResult<()> {
        pack_header(&envelope.header, buf, self)?;
        if let Some(credential) = &envelope.auth {
            buf.write_bytes(credential.as_bytes())?;
        }
        buf.write_raw(body)?;
        Ok(())
    }

    /// Unpacks one envelope from `buf`.
    ///
    /// On failure the read cursor is restored, so an unknown message type
    /// leaves the body unread.
    pub fn dispatch_unpack(&self, buf: &mut ByteBuffer) -> CodecResult<Envelope> {
        buf.restoring(|buf| self.unpack_envelope(buf))
    }

    fn unpack_envelope(&self, buf: &mut ByteBuffer) -> CodecResult<Envelope> {
        let header = unpack_header(buf, self, &self.wire_limits)?;
        let msg_type = header.msg_type;
        let auth = if header.flags.has_auth_cred() {
            Some(AuthCredential::new(buf.read_bytes()?))
        } else {
            None
        };

        let declared = header.body_length as usize;
        self.check_body_bytes(declared)?;
        if declared > buf.remaining() {
            return Err(CodecError::BodyLengthMismatch {
                msg_type,
                declared,
                actual: buf.remaining(),
            });
        }
        if let Some(credential) = &auth {
            self.auth.verify(credential, &buf.unread()[..declared])?;
        }

        let codec = self.registry.get(msg_type).map_err(|err| {
            warn!(msg_type = msg_type.raw(), "dropping message of unregistered type");
            err
        })?;
        let start = buf.processed();
        let body = codec.decode(buf, header.version)?;
        let consumed = buf.processed() - start;
        if consumed != declared {
            return Err(CodecError::BodyLengthMismatch {
                msg_type,
                declared,
                actual: consumed,
            });
        }

        debug!(
            msg_type = msg_type.raw(),
            version = %header.version,
            body_length = declared,
            "unpacked message"
        );
        Ok(Envelope { header, auth, body })
    }

    fn check_body_bytes(&self, len: usize) -> CodecResult<()> {
        if len > self.limits.max_body_bytes {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::BodyBytes,
                limit: self.limits.max_body_bytes,
                actual: len,
            });
        }
        Ok(())
    }
}

impl PayloadCodec for Dispatcher {
    type Payload = Payload;
    type Error = CodecError;

    fn pack_payload(
        &self,
        msg_type: MessageType,
        payload: &Payload,
        buf: &mut ByteBuffer,
        version: ProtocolVersion,
    ) -> CodecResult<()> {
        self.registry.get(msg_type)?.encode(payload, buf, version)
    }

    fn unpack_payload(
        &self,
        msg_type: MessageType,
        buf: &mut ByteBuffer,
        version: ProtocolVersion,
    ) -> CodecResult<Payload> {
        self.registry.get(msg_type)?.decode(buf, version)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("limits", &self.limits)
            .field("wire_limits", &self.wire_limits)
            .finish_non_exhaustive()
    }
}
