//! Versioned message headers and stream framing for hpcrpc.
//!
//! This crate owns the envelope in front of every message body: the protocol
//! version, flags, message type, multi-hop forwarding block, aggregated return
//! items and origin address. It knows nothing about message bodies; nested
//! return payloads go through the [`PayloadCodec`] callback.
//!
//! # Design Principles
//!
//! - **Version first** - The version is the first field read, and nothing else
//!   is parsed for a version outside the compatibility window.
//! - **Table-driven gating** - Optional fields are selected from [`FIELD_SETS`],
//!   never from scattered version comparisons.
//! - **Bounded decoding** - Counts and lengths are checked against [`Limits`]
//!   before anything is allocated.

mod addr;
mod error;
mod fields;
mod forward;
mod frame;
mod header;
mod limits;
mod version;

pub use addr::{AF_INET, AF_INET6, AF_UNSPEC};
pub use error::{LimitKind, WireError, WireResult};
pub use fields::{FieldSet, FIELD_SETS};
pub use forward::ForwardSpec;
pub use frame::{encode_frame_prefix, frame_len, split_frame, FRAME_PREFIX_LEN};
pub use header::{
    pack_header, take_deferred_type, unpack_header, Header, HeaderFlags, MessageType,
    PayloadCodec, ReturnItem,
};
pub use limits::Limits;
pub use version::{select, ProtocolVersion};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = ProtocolVersion::CURRENT;
        let _ = ProtocolVersion::WINDOW;
        let _ = FIELD_SETS;
        let _ = FRAME_PREFIX_LEN;
        let _ = HeaderFlags::default();
        let _ = ForwardSpec::none();
        let _ = Limits::default();
        let _: Header<()> = Header::new(MessageType::new(1));
        let _ = (AF_UNSPEC, AF_INET, AF_INET6);

        let _: WireResult<()> = Ok(());
    }

    #[test]
    fn limits_default_is_reasonable() {
        let limits = Limits::default();
        assert!(limits.max_frame_bytes >= 1024 * 1024);
        assert!(limits.max_return_items >= 1024);
    }

    #[test]
    fn current_version_is_newest_in_window() {
        assert_eq!(ProtocolVersion::WINDOW[0], ProtocolVersion::CURRENT);
        assert_eq!(FIELD_SETS[0].0, ProtocolVersion::CURRENT);
    }
}
