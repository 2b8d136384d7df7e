//! Origin address record.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use buffer::ByteBuffer;

use crate::error::{WireError, WireResult};
use crate::fields::FieldSet;

/// Address family of an absent origin.
pub const AF_UNSPEC: u16 = 0;
/// IPv4 address family.
pub const AF_INET: u16 = 2;
/// IPv6 address family.
pub const AF_INET6: u16 = 10;

/// Packs `addr` as `u16 family` followed by the address and port.
///
/// Peers whose field set predates IPv6 origins get an unspecified record.
pub(crate) fn pack_addr(
    addr: Option<&SocketAddr>,
    fields: &FieldSet,
    buf: &mut ByteBuffer,
) -> WireResult<()> {
    match addr {
        Some(SocketAddr::V4(v4)) => {
            buf.write_u16(AF_INET)?;
            buf.write_u32(u32::from(*v4.ip()))?;
            buf.write_u16(v4.port())?;
        }
        Some(SocketAddr::V6(v6)) if fields.origin_ipv6 => {
            buf.write_u16(AF_INET6)?;
            buf.write_raw(&v6.ip().octets())?;
            buf.write_u16(v6.port())?;
        }
        Some(SocketAddr::V6(_)) | None => buf.write_u16(AF_UNSPEC)?,
    }
    Ok(())
}

pub(crate) fn unpack_addr(buf: &mut ByteBuffer, fields: &FieldSet) -> WireResult<Option<SocketAddr>> {
    let family = buf.read_u16()?;
    let ip = match family {
        AF_UNSPEC => return Ok(None),
        AF_INET => IpAddr::V4(Ipv4Addr::from(buf.read_u32()?)),
        AF_INET6 if fields.origin_ipv6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(buf.read_raw(16)?);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return Err(WireError::InvalidAddressFamily { family }),
    };
    let port = buf.read_u16()?;
    Ok(Some(SocketAddr::new(ip, port)))
}
