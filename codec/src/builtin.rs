//! Built-in protocol messages.

use buffer::ByteBuffer;
use wire::{MessageType, ProtocolVersion};

use crate::error::CodecResult;
use crate::registry::WireMessage;

/// Liveness check. Empty body; answered with a [`ReturnCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ping;

impl WireMessage for Ping {
    const MSG_TYPE: MessageType = MessageType::new(1008);

    fn encode(&self, _buf: &mut ByteBuffer, _version: ProtocolVersion) -> CodecResult<()> {
        Ok(())
    }

    fn decode(_buf: &mut ByteBuffer, _version: ProtocolVersion) -> CodecResult<Self> {
        Ok(Self)
    }
}

/// Generic status reply; also the usual payload of a forwarded return item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReturnCode {
    pub rc: i32,
}

impl ReturnCode {
    pub const SUCCESS: Self = Self { rc: 0 };

    #[must_use]
    pub const fn new(rc: i32) -> Self {
        Self { rc }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.rc == 0
    }
}

impl WireMessage for ReturnCode {
    const MSG_TYPE: MessageType = MessageType::new(8001);

    fn encode(&self, buf: &mut ByteBuffer, _version: ProtocolVersion) -> CodecResult<()> {
        buf.write_i32(self.rc)?;
        Ok(())
    }

    fn decode(buf: &mut ByteBuffer, _version: ProtocolVersion) -> CodecResult<Self> {
        Ok(Self {
            rc: buf.read_i32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_has_empty_body() {
        let mut buf = ByteBuffer::with_capacity(0);
        Ping.encode(&mut buf, ProtocolVersion::CURRENT).unwrap();
        assert!(buf.is_empty());
        assert_eq!(Ping::decode(&mut buf, ProtocolVersion::CURRENT).unwrap(), Ping);
    }

    #[test]
    fn return_code_is_signed_big_endian() {
        let mut buf = ByteBuffer::with_capacity(0);
        ReturnCode::new(-2)
            .encode(&mut buf, ProtocolVersion::MIN_SUPPORTED)
            .unwrap();
        assert_eq!(buf.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFE]);
        let decoded = ReturnCode::decode(&mut buf, ProtocolVersion::MIN_SUPPORTED).unwrap();
        assert_eq!(decoded, ReturnCode::new(-2));
        assert!(!decoded.is_success());
    }

    #[test]
    fn short_return_code_fails() {
        let mut buf = ByteBuffer::from_vec(vec![0, 0]);
        assert!(ReturnCode::decode(&mut buf, ProtocolVersion::CURRENT).is_err());
        assert_eq!(buf.processed(), 0);
    }
}
