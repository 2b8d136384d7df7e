//! Message registry, dispatcher and list serializer for hpcrpc.
//!
//! This crate ties the byte buffer and the header framer together: it routes
//! message bodies through a registry of codecs, packs and verifies the
//! credential blob, and serializes bounded lists.
//!
//! # Features
//!
//! - Codec registry keyed by message type, with typed [`WireMessage`] adapters
//! - Envelope pack/unpack with body-length and credential checks
//! - Count-prefixed lists that truncate cleanly at a size ceiling
//! - Built-in [`Ping`] and [`ReturnCode`] messages
//!
//! # Design Principles
//!
//! - **No partial output** - Failed packs rewind the buffer; failed unpacks
//!   restore the read cursor and drop whatever was built.
//! - **Bounded decoding** - Counts and lengths are checked against
//!   [`CodecLimits`] before iteration.
//! - **Pluggable edges** - Message bodies and credentials are supplied by the
//!   caller through [`MessageCodec`] and [`AuthPlugin`].

mod auth;
mod builtin;
mod dispatch;
mod error;
mod frame;
mod limits;
mod list;
mod registry;

pub use auth::{AuthCredential, AuthPlugin, NoAuth};
pub use builtin::{Ping, ReturnCode};
pub use dispatch::{Dispatcher, Envelope};
pub use error::{CodecError, CodecResult, LimitKind};
pub use frame::{decode_frame, decode_frame_body, encode_frame};
pub use limits::CodecLimits;
pub use list::{pack_list, unpack_list, ListPacked};
pub use registry::{AnyMessage, MessageCodec, Payload, Registry, WireMessage};
pub use wire::Limits as WireLimits;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = Registry::with_builtin();
        let _ = Dispatcher::new(Registry::new());
        let _ = CodecLimits::default();
        let _ = WireLimits::default();
        let _ = ListPacked::Complete { written: 0 };
        let _ = NoAuth;
        let _ = Payload::new(Ping);

        let _: CodecResult<()> = Ok(());
    }

    #[test]
    fn builtin_types_match_protocol() {
        assert_eq!(Ping::MSG_TYPE.raw(), 1008);
        assert_eq!(ReturnCode::MSG_TYPE.raw(), 8001);
    }
}
