//! Deadline-bounded sends.

use std::io::{self, IoSlice};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};
use wire::encode_frame_prefix;

use crate::config::TransportConfig;
use crate::deadline::Deadline;
use crate::error::{TransportError, TransportResult};
use crate::socket::{Interest, Readiness, StreamSocket};

/// Position inside a list of byte ranges.
struct RangeCursor<'a> {
    ranges: &'a [&'a [u8]],
    index: usize,
    offset: usize,
}

impl<'a> RangeCursor<'a> {
    fn new(ranges: &'a [&'a [u8]]) -> Self {
        let mut cursor = Self {
            ranges,
            index: 0,
            offset: 0,
        };
        cursor.skip_empty();
        cursor
    }

    fn is_done(&self) -> bool {
        self.index >= self.ranges.len()
    }

    /// The unsent parts of every range.
    fn pending(&self) -> Vec<IoSlice<'a>> {
        self.ranges
            .get(self.index..)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, range)| {
                let start = if i == 0 { self.offset } else { 0 };
                IoSlice::new(&range[start..])
            })
            .collect()
    }

    fn advance(&mut self, mut written: usize) {
        while written > 0 && !self.is_done() {
            let left = self.ranges[self.index].len() - self.offset;
            if written < left {
                self.offset += written;
                return;
            }
            written -= left;
            self.index += 1;
            self.offset = 0;
        }
        self.skip_empty();
    }

    fn skip_empty(&mut self) {
        while !self.is_done() && self.ranges[self.index].len() == self.offset {
            self.index += 1;
            self.offset = 0;
        }
    }
}

/// Sends every byte of `ranges`, in order, before `timeout` elapses.
///
/// Partial writes resume where they stopped. Returns the number of bytes
/// sent, which on success is the total length of `ranges`.
pub fn send<S>(
    sock: &mut S,
    ranges: &[&[u8]],
    timeout: Duration,
    config: &TransportConfig,
) -> TransportResult<usize>
where
    S: StreamSocket + ?Sized,
{
    let deadline = Deadline::after(timeout);
    let total: usize = ranges.iter().map(|range| range.len()).sum();
    let guard = sock
        .no_sigpipe()
        .map_err(|err| TransportError::socket("send", err))?;
    let mut cursor = RangeCursor::new(ranges);
    let mut sent = 0;

    while !cursor.is_done() {
        let Some(wait) = deadline.next_wait(config.poll_quantum) else {
            debug!(sent, total, "send timed out");
            return Err(TransportError::timeout("send", deadline.timeout()));
        };
        match sock.poll_ready(Interest::Write, wait) {
            Ok(Readiness::Idle) => continue,
            Ok(Readiness::Broken) => return Err(broken(sock, "send")),
            Ok(Readiness::Ready) => {}
            Err(err) => return Err(TransportError::socket("send", err)),
        }
        if sock
            .peer_closed()
            .map_err(|err| TransportError::socket("send", err))?
        {
            return Err(TransportError::ConnectionClosed { operation: "send" });
        }

        match sock.send_vectored(&cursor.pending(), guard.send_flags()) {
            Ok(0) => return Err(TransportError::ConnectionClosed { operation: "send" }),
            Ok(written) => {
                cursor.advance(written);
                sent += written;
                trace!(written, sent, total, "send progress");
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                trace!(sent, total, "send would block");
                thread::sleep(config.would_block_backoff.min(deadline.remaining()));
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(TransportError::socket("send", err)),
        }
    }
    Ok(sent)
}

/// Sends `body` behind a big-endian length prefix in one vectored send.
pub fn send_framed<S>(
    sock: &mut S,
    body: &[u8],
    timeout: Duration,
    config: &TransportConfig,
) -> TransportResult<()>
where
    S: StreamSocket + ?Sized,
{
    let prefix = encode_frame_prefix(body.len(), &config.frame_limits())?;
    send(sock, &[prefix.as_slice(), body], timeout, config)?;
    Ok(())
}

/// Error for a socket that poll reported as failed or hung up.
pub(crate) fn broken<S: StreamSocket + ?Sized>(sock: &S, operation: &'static str) -> TransportError {
    match sock.take_error() {
        Ok(Some(err)) => TransportError::socket(operation, err),
        _ => TransportError::ConnectionClosed { operation },
    }
}
