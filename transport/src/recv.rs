//! Deadline-bounded receives.

use std::io;
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};
use wire::{frame_len, FRAME_PREFIX_LEN};

use crate::config::TransportConfig;
use crate::deadline::Deadline;
use crate::error::{TransportError, TransportResult};
use crate::send::broken;
use crate::socket::{Interest, Readiness, StreamSocket};

/// Fills `buf` completely before `timeout` elapses.
pub fn recv<S>(
    sock: &mut S,
    buf: &mut [u8],
    timeout: Duration,
    config: &TransportConfig,
) -> TransportResult<()>
where
    S: StreamSocket + ?Sized,
{
    let deadline = Deadline::after(timeout);
    recv_until(sock, buf, &deadline, config, "recv")
}

/// Reads one length-prefixed frame and returns its body.
///
/// The prefix is checked against `config.max_frame_bytes` before the body
/// buffer is allocated. Prefix and body share one deadline.
pub fn recv_framed<S>(
    sock: &mut S,
    timeout: Duration,
    config: &TransportConfig,
) -> TransportResult<Vec<u8>>
where
    S: StreamSocket + ?Sized,
{
    let deadline = Deadline::after(timeout);
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    recv_until(sock, &mut prefix, &deadline, config, "recv_framed")?;
    let len = frame_len(prefix, &config.frame_limits()).map_err(|err| {
        debug!(%err, "rejecting frame");
        TransportError::from(err)
    })?;

    let mut body = vec![0u8; len];
    recv_until(sock, &mut body, &deadline, config, "recv_framed")?;
    Ok(body)
}

fn recv_until<S>(
    sock: &mut S,
    buf: &mut [u8],
    deadline: &Deadline,
    config: &TransportConfig,
    operation: &'static str,
) -> TransportResult<()>
where
    S: StreamSocket + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let Some(wait) = deadline.next_wait(config.poll_quantum) else {
            debug!(filled, wanted = buf.len(), "{operation} timed out");
            return Err(TransportError::timeout(operation, deadline.timeout()));
        };
        match sock.poll_ready(Interest::Read, wait) {
            Ok(Readiness::Idle) => continue,
            Ok(Readiness::Broken) => return Err(broken(sock, operation)),
            Ok(Readiness::Ready) => {}
            Err(err) => return Err(TransportError::socket(operation, err)),
        }

        match sock.recv(&mut buf[filled..]) {
            Ok(0) => {
                debug!(filled, wanted = buf.len(), "peer closed mid-{operation}");
                return Err(TransportError::ConnectionClosed { operation });
            }
            Ok(read) => {
                filled += read;
                trace!(read, filled, wanted = buf.len(), "{operation} progress");
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(config.would_block_backoff.min(deadline.remaining()));
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(TransportError::socket(operation, err)),
        }
    }
    Ok(())
}
