//! The socket operations the transport loops are built from.

use std::io::{self, IoSlice};
use std::net::TcpStream;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{getsockopt, recv, sendmsg, sockopt, MsgFlags};

use crate::sigpipe::NoSigPipe;

/// Direction a caller is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// Result of one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The wait elapsed or was interrupted.
    Idle,
    /// The socket can make progress in the requested direction.
    Ready,
    /// Poll reported an error or hang-up.
    Broken,
}

/// A connected stream socket.
///
/// Implemented for the standard stream types and `socket2::Socket`; tests
/// substitute scripted sockets to force partial writes.
pub trait StreamSocket {
    /// Blocks for at most `wait` until the socket is ready for `interest`.
    fn poll_ready(&self, interest: Interest, wait: Duration) -> io::Result<Readiness>;

    /// Writes from `bufs` in order; may write fewer bytes than offered.
    fn send_vectored(&mut self, bufs: &[IoSlice<'_>], flags: MsgFlags) -> io::Result<usize>;

    /// Reads into `buf`; `Ok(0)` means the peer closed its side.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Peeks without consuming data to see whether the peer has closed.
    fn peer_closed(&self) -> io::Result<bool>;

    /// Takes the pending `SO_ERROR`, if any.
    fn take_error(&self) -> io::Result<Option<io::Error>>;

    /// Enters a scope in which writes cannot raise `SIGPIPE`.
    fn no_sigpipe(&self) -> io::Result<NoSigPipe> {
        Ok(NoSigPipe::inactive())
    }
}

macro_rules! impl_stream_socket {
    ($($ty:ty),* $(,)?) => {$(
        impl StreamSocket for $ty {
            fn poll_ready(&self, interest: Interest, wait: Duration) -> io::Result<Readiness> {
                poll_fd(self.as_fd(), interest, wait)
            }

            fn send_vectored(&mut self, bufs: &[IoSlice<'_>], flags: MsgFlags) -> io::Result<usize> {
                sendmsg::<()>(self.as_raw_fd(), bufs, &[], flags, None).map_err(io::Error::from)
            }

            fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                recv(self.as_raw_fd(), buf, MsgFlags::empty()).map_err(io::Error::from)
            }

            fn peer_closed(&self) -> io::Result<bool> {
                peek_closed(self.as_fd())
            }

            fn take_error(&self) -> io::Result<Option<io::Error>> {
                pending_error(self.as_fd())
            }

            fn no_sigpipe(&self) -> io::Result<NoSigPipe> {
                NoSigPipe::enter(self.as_fd())
            }
        }
    )*};
}

impl_stream_socket!(TcpStream, UnixStream, socket2::Socket);

/// Polls one descriptor for `interest` for at most `wait`.
pub(crate) fn poll_fd(fd: BorrowedFd<'_>, interest: Interest, wait: Duration) -> io::Result<Readiness> {
    let wanted = match interest {
        Interest::Read => PollFlags::POLLIN,
        Interest::Write => PollFlags::POLLOUT,
    };
    // Round up so a sub-millisecond remainder still blocks.
    let millis = u16::try_from(wait.as_micros().div_ceil(1000)).unwrap_or(u16::MAX);
    let mut fds = [PollFd::new(fd, wanted)];
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) | Err(Errno::EINTR) => Ok(Readiness::Idle),
        Ok(_) => {
            let revents = fds[0].revents().unwrap_or_else(PollFlags::empty);
            if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
                Ok(Readiness::Broken)
            } else if revents.intersects(wanted) {
                Ok(Readiness::Ready)
            } else if revents.contains(PollFlags::POLLHUP) {
                Ok(Readiness::Broken)
            } else {
                Ok(Readiness::Idle)
            }
        }
        Err(errno) => Err(errno.into()),
    }
}

fn peek_closed(fd: BorrowedFd<'_>) -> io::Result<bool> {
    let mut peeked = [0u8; 1];
    match recv(
        fd.as_raw_fd(),
        &mut peeked,
        MsgFlags::MSG_PEEK | MsgFlags::MSG_DONTWAIT,
    ) {
        Ok(0) => Ok(true),
        Ok(_) | Err(Errno::EINTR) => Ok(false),
        Err(errno) if errno == Errno::EAGAIN || errno == Errno::EWOULDBLOCK => Ok(false),
        Err(errno) => Err(errno.into()),
    }
}

fn pending_error(fd: BorrowedFd<'_>) -> io::Result<Option<io::Error>> {
    let code = getsockopt(&fd, sockopt::SocketError)?;
    Ok((code != 0).then(|| io::Error::from_raw_os_error(code)))
}
