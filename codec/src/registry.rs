//! Message codec registry.
//!
//! Bodies are encoded by codecs looked up by [`MessageType`]. Codecs are
//! trait objects so the registry can hold any number of message shapes;
//! [`WireMessage`] is the typed way to write one.

use std::any::{self, Any};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use buffer::ByteBuffer;
use wire::{MessageType, ProtocolVersion};

use crate::builtin::{Ping, ReturnCode};
use crate::error::{CodecError, CodecResult};

/// Object-safe view of a decoded message body.
pub trait AnyMessage: Any + Send + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
    fn clone_box(&self) -> Box<dyn AnyMessage>;
    fn eq_dyn(&self, other: &dyn AnyMessage) -> bool;
    fn type_name(&self) -> &'static str;
}

impl<T> AnyMessage for T
where
    T: Any + Send + fmt::Debug + Clone + PartialEq,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn clone_box(&self) -> Box<dyn AnyMessage> {
        Box::new(self.clone())
    }

    fn eq_dyn(&self, other: &dyn AnyMessage) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn type_name(&self) -> &'static str {
        any::type_name::<T>()
    }
}

/// A type-erased message body.
///
/// Dropping a `Payload` releases everything the decoder built, including on
/// error paths where decoding stopped half way.
#[derive(Debug)]
pub struct Payload(Box<dyn AnyMessage>);

impl Payload {
    pub fn new<T: AnyMessage>(message: T) -> Self {
        Self(Box::new(message))
    }

    /// Returns `true` if the body is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.as_any().is::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Takes the body out as a `T`, or `None` if it is something else.
    #[must_use]
    pub fn into_message<T: Any>(self) -> Option<T> {
        self.0.into_any().downcast::<T>().ok().map(|message| *message)
    }

    /// Rust type name of the body, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }
}

impl Clone for Payload {
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_dyn(other.0.as_ref())
    }
}

/// Encodes and decodes one message type's body.
///
/// Implementations may hold their own state (for example a shared lookup
/// table behind a read lock); they are shared by every thread using the
/// dispatcher.
pub trait MessageCodec: Send + Sync {
    fn encode(
        &self,
        payload: &Payload,
        buf: &mut ByteBuffer,
        version: ProtocolVersion,
    ) -> CodecResult<()>;

    fn decode(&self, buf: &mut ByteBuffer, version: ProtocolVersion) -> CodecResult<Payload>;
}

/// A message body with a fixed type tag and its own encoding.
pub trait WireMessage: Any + Send + fmt::Debug + Clone + PartialEq {
    /// Wire tag of this message.
    const MSG_TYPE: MessageType;

    fn encode(&self, buf: &mut ByteBuffer, version: ProtocolVersion) -> CodecResult<()>;

    fn decode(buf: &mut ByteBuffer, version: ProtocolVersion) -> CodecResult<Self>;
}

/// Adapts a [`WireMessage`] into a [`MessageCodec`].
struct Typed<M>(PhantomData<fn() -> M>);

impl<M: WireMessage> MessageCodec for Typed<M> {
    fn encode(
        &self,
        payload: &Payload,
        buf: &mut ByteBuffer,
        version: ProtocolVersion,
    ) -> CodecResult<()> {
        let message = payload
            .downcast_ref::<M>()
            .ok_or_else(|| CodecError::PayloadTypeMismatch {
                msg_type: M::MSG_TYPE,
                expected: any::type_name::<M>(),
            })?;
        message.encode(buf, version)
    }

    fn decode(&self, buf: &mut ByteBuffer, version: ProtocolVersion) -> CodecResult<Payload> {
        M::decode(buf, version).map(Payload::new)
    }
}

/// Maps message types to their codecs.
///
/// Built once at start-up and read-only afterwards.
#[derive(Default)]
pub struct Registry {
    codecs: HashMap<MessageType, Box<dyn MessageCodec>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in protocol messages.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.insert_typed::<Ping>();
        registry.insert_typed::<ReturnCode>();
        registry
    }

    /// Registers the codec of a typed message.
    pub fn register<M: WireMessage>(&mut self) -> CodecResult<()> {
        self.register_codec(M::MSG_TYPE, Box::new(Typed::<M>(PhantomData)))
    }

    /// Registers a hand-written codec for `msg_type`.
    pub fn register_codec(
        &mut self,
        msg_type: MessageType,
        codec: Box<dyn MessageCodec>,
    ) -> CodecResult<()> {
        match self.codecs.entry(msg_type) {
            Entry::Occupied(_) => Err(CodecError::DuplicateRegistration { msg_type }),
            Entry::Vacant(slot) => {
                slot.insert(codec);
                Ok(())
            }
        }
    }

    /// Looks up the codec for `msg_type`.
    pub fn get(&self, msg_type: MessageType) -> CodecResult<&dyn MessageCodec> {
        self.codecs
            .get(&msg_type)
            .map(|codec| &**codec)
            .ok_or(CodecError::UnknownMessageType { msg_type })
    }

    #[must_use]
    pub fn contains(&self, msg_type: MessageType) -> bool {
        self.codecs.contains_key(&msg_type)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Registered message types in ascending order.
    #[must_use]
    pub fn message_types(&self) -> Vec<MessageType> {
        let mut types: Vec<_> = self.codecs.keys().copied().collect();
        types.sort_unstable();
        types
    }

    fn insert_typed<M: WireMessage>(&mut self) {
        self.codecs
            .insert(M::MSG_TYPE, Box::new(Typed::<M>(PhantomData)));
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("message_types", &self.message_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, RwLock};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct JobName {
        job_id: u32,
        name: String,
    }

    impl WireMessage for JobName {
        const MSG_TYPE: MessageType = MessageType::new(2001);

        fn encode(&self, buf: &mut ByteBuffer, _version: ProtocolVersion) -> CodecResult<()> {
            buf.write_u32(self.job_id)?;
            buf.write_str(&self.name)?;
            Ok(())
        }

        fn decode(buf: &mut ByteBuffer, _version: ProtocolVersion) -> CodecResult<Self> {
            Ok(Self {
                job_id: buf.read_u32()?,
                name: buf.read_string()?,
            })
        }
    }

    /// Sends partition names as indexes into a shared table.
    struct PartitionCodec {
        names: Arc<RwLock<Vec<String>>>,
    }

    impl MessageCodec for PartitionCodec {
        fn encode(
            &self,
            payload: &Payload,
            buf: &mut ByteBuffer,
            _version: ProtocolVersion,
        ) -> CodecResult<()> {
            let name = payload
                .downcast_ref::<String>()
                .ok_or_else(|| CodecError::custom("expected a partition name"))?;
            let names = self.names.read().map_err(|_| CodecError::custom("poisoned"))?;
            let index = names
                .iter()
                .position(|known| known == name)
                .ok_or_else(|| CodecError::custom(format!("unknown partition {name}")))?;
            buf.write_u32(index as u32)?;
            Ok(())
        }

        fn decode(&self, buf: &mut ByteBuffer, _version: ProtocolVersion) -> CodecResult<Payload> {
            let index = buf.read_u32()? as usize;
            let names = self.names.read().map_err(|_| CodecError::custom("poisoned"))?;
            names
                .get(index)
                .cloned()
                .map(Payload::new)
                .ok_or_else(|| CodecError::custom(format!("no partition {index}")))
        }
    }

    #[test]
    fn builtin_registry_has_ping_and_rc() {
        let registry = Registry::with_builtin();
        assert_eq!(
            registry.message_types(),
            vec![MessageType::new(1008), MessageType::new(8001)]
        );
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = Registry::new();
        registry.register::<JobName>().unwrap();
        assert_eq!(
            registry.register::<JobName>(),
            Err(CodecError::DuplicateRegistration {
                msg_type: JobName::MSG_TYPE
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_type_lookup_fails() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get(MessageType::new(7)),
            Err(CodecError::UnknownMessageType { .. })
        ));
    }

    #[test]
    fn typed_codec_roundtrip() {
        let mut registry = Registry::new();
        registry.register::<JobName>().unwrap();
        let codec = registry.get(JobName::MSG_TYPE).unwrap();

        let message = JobName {
            job_id: 77,
            name: "relion".to_string(),
        };
        let mut buf = ByteBuffer::with_capacity(0);
        codec
            .encode(&Payload::new(message.clone()), &mut buf, ProtocolVersion::CURRENT)
            .unwrap();
        let decoded = codec.decode(&mut buf, ProtocolVersion::CURRENT).unwrap();
        assert_eq!(decoded.into_message::<JobName>(), Some(message));
    }

    #[test]
    fn typed_codec_rejects_wrong_payload() {
        let mut registry = Registry::new();
        registry.register::<JobName>().unwrap();
        let codec = registry.get(JobName::MSG_TYPE).unwrap();
        let mut buf = ByteBuffer::with_capacity(0);
        let err = codec
            .encode(&Payload::new(5u32), &mut buf, ProtocolVersion::CURRENT)
            .unwrap_err();
        assert!(matches!(err, CodecError::PayloadTypeMismatch { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn stateful_codec_reads_shared_table() {
        let names = Arc::new(RwLock::new(vec!["debug".to_string(), "gpu".to_string()]));
        let mut registry = Registry::new();
        registry
            .register_codec(
                MessageType::new(3001),
                Box::new(PartitionCodec {
                    names: Arc::clone(&names),
                }),
            )
            .unwrap();
        let codec = registry.get(MessageType::new(3001)).unwrap();

        let mut buf = ByteBuffer::with_capacity(0);
        codec
            .encode(&Payload::new("gpu".to_string()), &mut buf, ProtocolVersion::CURRENT)
            .unwrap();
        assert_eq!(buf.as_slice(), &[0, 0, 0, 1]);

        names.write().unwrap().insert(0, "long".to_string());
        let decoded = codec.decode(&mut buf, ProtocolVersion::CURRENT).unwrap();
        assert_eq!(decoded.downcast_ref::<String>().unwrap(), "debug");
    }

    #[test]
    fn payload_equality_and_clone() {
        let a = Payload::new(ReturnCode { rc: 3 });
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, Payload::new(ReturnCode { rc: 4 }));
        assert_ne!(a, Payload::new(Ping));
        assert!(a.is::<ReturnCode>());
        assert!(a.type_name().ends_with("ReturnCode"));
        assert_eq!(Payload::new(Ping).into_message::<ReturnCode>(), None);
    }
}
