//! Deadline-bounded connect and accept.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::ops::RangeInclusive;
use std::os::fd::AsFd;
use std::time::Duration;

use nix::errno::Errno;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::deadline::Deadline;
use crate::error::{TransportError, TransportResult};
use crate::socket::{poll_fd, Interest, Readiness};

/// Source of local ports for connect retries.
///
/// Seeded once and handed to [`connect`] by `&mut`, so tests can replay a
/// sequence with [`PortPicker::seeded`].
#[derive(Debug, Clone)]
pub struct PortPicker {
    rng: StdRng,
    range: RangeInclusive<u16>,
}

impl PortPicker {
    /// A picker seeded from OS entropy.
    #[must_use]
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            range,
        }
    }

    /// A deterministic picker.
    #[must_use]
    pub fn seeded(seed: u64, range: RangeInclusive<u16>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            range,
        }
    }

    #[must_use]
    pub fn range(&self) -> &RangeInclusive<u16> {
        &self.range
    }

    /// The next port, or `None` when the range is empty.
    pub fn pick(&mut self) -> Option<u16> {
        if self.range.is_empty() {
            return None;
        }
        Some(self.rng.gen_range(self.range.clone()))
    }
}

/// Connects to `addr` before `timeout` elapses and returns a blocking stream.
///
/// With a `ports` picker, a refused or timed-out attempt is retried from a
/// fresh socket bound to a random local port, up to
/// `config.connect_retries` extra attempts within the same deadline.
pub fn connect(
    addr: SocketAddr,
    timeout: Duration,
    config: &TransportConfig,
    mut ports: Option<&mut PortPicker>,
) -> TransportResult<TcpStream> {
    let deadline = Deadline::after(timeout);
    let mut local_port = None;
    let mut retries = 0;

    loop {
        let err = match connect_once(addr, local_port, &deadline, config) {
            Ok(stream) => {
                debug!(%addr, ?local_port, retries, "connected");
                return Ok(stream);
            }
            Err(err) => err,
        };
        let Some(picker) = ports.as_deref_mut() else {
            return Err(err);
        };
        if !is_transient(&err) || retries >= config.connect_retries || deadline.is_expired() {
            return Err(err);
        }
        retries += 1;
        local_port = picker.pick();
        warn!(%addr, %err, retries, ?local_port, "retrying connect");
    }
}

fn connect_once(
    addr: SocketAddr,
    local_port: Option<u16>,
    deadline: &Deadline,
    config: &TransportConfig,
) -> TransportResult<TcpStream> {
    let fail = |err| TransportError::socket("connect", err);
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(fail)?;
    if let Some(port) = local_port {
        let any = match addr.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        socket
            .bind(&SocketAddr::new(any, port).into())
            .map_err(fail)?;
    }
    socket.set_nonblocking(true).map_err(fail)?;

    match socket.connect(&addr.into()) {
        Ok(()) => {}
        Err(err) if in_progress(&err) => wait_connected(&socket, deadline, config)?,
        Err(err) => return Err(fail(err)),
    }

    socket.set_nonblocking(false).map_err(fail)?;
    Ok(socket.into())
}

fn wait_connected(
    socket: &Socket,
    deadline: &Deadline,
    config: &TransportConfig,
) -> TransportResult<()> {
    loop {
        let Some(wait) = deadline.next_wait(config.poll_quantum) else {
            return Err(TransportError::timeout("connect", deadline.timeout()));
        };
        let readiness = poll_fd(socket.as_fd(), Interest::Write, wait)
            .map_err(|err| TransportError::socket("connect", err))?;
        if readiness == Readiness::Idle {
            continue;
        }
        return match socket.take_error() {
            Ok(Some(err)) | Err(err) => Err(TransportError::socket("connect", err)),
            Ok(None) if readiness == Readiness::Ready => Ok(()),
            Ok(None) => Err(TransportError::ConnectionClosed {
                operation: "connect",
            }),
        };
    }
}

/// Waits for a pending connection on `listener` and accepts it.
///
/// The returned stream is in blocking mode.
pub fn accept(
    listener: &TcpListener,
    timeout: Duration,
    config: &TransportConfig,
) -> TransportResult<(TcpStream, SocketAddr)> {
    let deadline = Deadline::after(timeout);
    loop {
        let Some(wait) = deadline.next_wait(config.poll_quantum) else {
            return Err(TransportError::timeout("accept", deadline.timeout()));
        };
        match poll_fd(listener.as_fd(), Interest::Read, wait) {
            Ok(Readiness::Idle) => continue,
            Ok(Readiness::Broken) => {
                return Err(match listener.take_error() {
                    Ok(Some(err)) | Err(err) => TransportError::socket("accept", err),
                    Ok(None) => TransportError::ConnectionClosed {
                        operation: "accept",
                    },
                })
            }
            Ok(Readiness::Ready) => {}
            Err(err) => return Err(TransportError::socket("accept", err)),
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                stream
                    .set_nonblocking(false)
                    .map_err(|err| TransportError::socket("accept", err))?;
                debug!(%peer, "accepted");
                return Ok((stream, peer));
            }
            // Another acceptor may have taken the connection.
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::ConnectionAborted
                ) => {}
            Err(err) => return Err(TransportError::socket("accept", err)),
        }
    }
}

fn in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::EINPROGRESS as i32) || err.kind() == io::ErrorKind::WouldBlock
}

fn is_transient(err: &TransportError) -> bool {
    [Errno::ECONNREFUSED, Errno::ETIMEDOUT, Errno::EADDRINUSE]
        .iter()
        .any(|errno| err.code() == Some(*errno as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[test]
    fn seeded_pickers_agree() {
        let mut a = PortPicker::seeded(7, 20000..=20010);
        let mut b = PortPicker::seeded(7, 20000..=20010);
        for _ in 0..32 {
            let port = a.pick().unwrap();
            assert_eq!(Some(port), b.pick());
            assert!((20000..=20010).contains(&port));
        }
    }

    #[test]
    #[allow(clippy::reversed_empty_ranges)]
    fn empty_range_picks_nothing() {
        let mut picker = PortPicker::seeded(1, 10..=9);
        assert_eq!(picker.pick(), None);
    }

    #[test]
    fn connect_and_accept_loopback() {
        let config = TransportConfig::for_testing();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = connect(addr, Duration::from_secs(2), &config, None).unwrap();
        let (server, peer) = accept(&listener, Duration::from_secs(2), &config).unwrap();
        assert_eq!(peer, client.local_addr().unwrap());
        assert_eq!(server.peer_addr().unwrap(), client.local_addr().unwrap());
    }

    #[test]
    fn refused_connect_reports_errno() {
        let config = TransportConfig::for_testing();
        let err = connect(closed_port(), Duration::from_secs(2), &config, None).unwrap_err();
        assert_eq!(err.code(), Some(Errno::ECONNREFUSED as i32));
    }

    #[test]
    fn refused_connect_retries_from_picked_ports() {
        let config = TransportConfig {
            connect_retries: 2,
            ..TransportConfig::for_testing()
        };
        let mut ports = PortPicker::seeded(42, config.ephemeral_ports.clone());
        let err = connect(
            closed_port(),
            Duration::from_secs(2),
            &config,
            Some(&mut ports),
        )
        .unwrap_err();
        assert!(matches!(
            err.code(),
            Some(code) if code == Errno::ECONNREFUSED as i32 || code == Errno::EADDRINUSE as i32
        ));
    }

    #[test]
    fn accept_times_out_without_clients() {
        let config = TransportConfig::for_testing();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let err = accept(&listener, Duration::from_millis(50), &config).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Timeout {
                operation: "accept",
                ..
            }
        ));
    }
}
