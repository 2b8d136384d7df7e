//! Broken-pipe signal suppression for one send.
//!
//! Linux and Android pass `MSG_NOSIGNAL` with every write. Apple targets have
//! no such flag, so the guard turns on `SO_NOSIGPIPE` for the duration of
//! the send and puts the previous value back when dropped.

use std::io;
use std::os::fd::BorrowedFd;

use nix::sys::socket::MsgFlags;

/// Scope in which writes to one socket cannot raise `SIGPIPE`.
#[derive(Debug, Default)]
pub struct NoSigPipe {
    #[cfg(target_vendor = "apple")]
    restore: Option<(socket2::Socket, bool)>,
}

impl NoSigPipe {
    /// A guard that changes no socket state.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Enters the scope for the socket behind `fd`.
    #[cfg(target_vendor = "apple")]
    pub fn enter(fd: BorrowedFd<'_>) -> io::Result<Self> {
        // Socket options live on the socket, so a duplicate descriptor sees them.
        let socket = socket2::Socket::from(fd.try_clone_to_owned()?);
        let previous = socket.nosigpipe()?;
        socket.set_nosigpipe(true)?;
        Ok(Self {
            restore: Some((socket, previous)),
        })
    }

    /// Enters the scope for the socket behind `fd`.
    #[cfg(not(target_vendor = "apple"))]
    pub fn enter(fd: BorrowedFd<'_>) -> io::Result<Self> {
        let _ = fd;
        Ok(Self::inactive())
    }

    /// Flags every write inside the scope must carry.
    #[must_use]
    pub fn send_flags(&self) -> MsgFlags {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            MsgFlags::MSG_NOSIGNAL
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            MsgFlags::empty()
        }
    }
}

#[cfg(target_vendor = "apple")]
impl Drop for NoSigPipe {
    fn drop(&mut self) {
        if let Some((socket, previous)) = self.restore.take() {
            if let Err(err) = socket.set_nosigpipe(previous) {
                tracing::warn!(%err, "failed to restore SO_NOSIGPIPE");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn enter_succeeds_on_stream_socket() {
        let (a, _b) = UnixStream::pair().unwrap();
        let guard = NoSigPipe::enter(a.as_fd()).unwrap();
        drop(guard);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn linux_uses_msg_nosignal() {
        assert!(NoSigPipe::inactive()
            .send_flags()
            .contains(MsgFlags::MSG_NOSIGNAL));
    }
}
