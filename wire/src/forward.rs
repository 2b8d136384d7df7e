//! Multi-hop forwarding descriptor.

use buffer::ByteBuffer;

use crate::error::{LimitKind, WireError, WireResult};
use crate::fields::FieldSet;
use crate::header::HeaderFlags;
use crate::limits::Limits;

/// Describes relaying one request to many worker nodes through a fan-out tree.
///
/// A `count` of zero means the message is not forwarded and none of the
/// other fields are put on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardSpec {
    /// Number of destination nodes.
    pub count: u16,
    /// Compressed host list of the destinations, e.g. `node[001-064]`.
    pub nodelist: String,
    /// Per-hop timeout in milliseconds.
    pub timeout_ms: u32,
    /// Fan-out width of the relay tree.
    pub tree_width: u16,
    /// Depth of the relay tree.
    pub tree_depth: u16,
    /// Pre-resolved destination addresses, sent when `PACK_ADDRS` is set.
    pub alias_addrs: Vec<u8>,
}

impl ForwardSpec {
    /// A descriptor for a message that is not forwarded.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Forward to `count` nodes named by `nodelist`.
    #[must_use]
    pub fn to_nodes(nodelist: impl Into<String>, count: u16, timeout_ms: u32, tree_width: u16) -> Self {
        Self {
            count,
            nodelist: nodelist.into(),
            timeout_ms,
            tree_width,
            ..Self::default()
        }
    }

    /// Returns `true` if the message fans out to other nodes.
    #[must_use]
    pub const fn is_forwarded(&self) -> bool {
        self.count > 0
    }

    pub(crate) fn pack(
        &self,
        fields: &FieldSet,
        flags: HeaderFlags,
        buf: &mut ByteBuffer,
    ) -> WireResult<()> {
        buf.write_u16(self.count)?;
        if !self.is_forwarded() {
            return Ok(());
        }
        buf.write_str(&self.nodelist)?;
        buf.write_u32(self.timeout_ms)?;
        buf.write_u16(self.tree_width)?;
        if fields.forward_tree_depth {
            buf.write_u16(self.tree_depth)?;
        }
        if fields.forward_alias_addrs && flags.packs_addrs() {
            buf.write_bytes(&self.alias_addrs)?;
        }
        Ok(())
    }

    pub(crate) fn unpack(
        buf: &mut ByteBuffer,
        fields: &FieldSet,
        flags: HeaderFlags,
        limits: &Limits,
    ) -> WireResult<Self> {
        let count = buf.read_u16()?;
        if count == 0 {
            return Ok(Self::none());
        }
        let nodelist = buf.read_string()?;
        check_len(LimitKind::NodelistBytes, limits.max_nodelist_bytes, nodelist.len())?;
        let timeout_ms = buf.read_u32()?;
        let tree_width = buf.read_u16()?;
        let tree_depth = if fields.forward_tree_depth {
            buf.read_u16()?
        } else {
            0
        };
        let alias_addrs = if fields.forward_alias_addrs && flags.packs_addrs() {
            let blob = buf.read_bytes()?;
            check_len(LimitKind::AliasBytes, limits.max_alias_bytes, blob.len())?;
            blob
        } else {
            Vec::new()
        };
        Ok(Self {
            count,
            nodelist,
            timeout_ms,
            tree_width,
            tree_depth,
            alias_addrs,
        })
    }
}

fn check_len(kind: LimitKind, limit: usize, actual: usize) -> WireResult<()> {
    if actual > limit {
        return Err(WireError::LimitsExceeded {
            kind,
            limit,
            actual,
        });
    }
    Ok(())
}
