//! Deadline-bounded blocking socket transport for hpcrpc.
//!
//! Every operation takes a timeout that is turned into one [`Deadline`] at
//! entry; retries, partial writes and interrupted waits all draw on that same
//! deadline. Sockets stay in blocking mode between calls.
//!
//! # Design Principles
//!
//! - **One deadline per call** - Waits are split into polls of at most
//!   [`TransportConfig::poll_quantum`] and never outlive the caller's timeout.
//! - **No process-wide state** - Configuration and the port picker are
//!   passed in explicitly.
//! - **No `SIGPIPE`** - Writes run inside a [`NoSigPipe`] scope and a closed
//!   peer surfaces as [`TransportError::ConnectionClosed`].

mod config;
mod connect;
mod deadline;
mod error;
mod recv;
mod send;
mod sigpipe;
mod socket;

pub use config::TransportConfig;
pub use connect::{accept, connect, PortPicker};
pub use deadline::Deadline;
pub use error::{TransportError, TransportResult};
pub use recv::{recv, recv_framed};
pub use send::{send, send_framed};
pub use sigpipe::NoSigPipe;
pub use socket::{Interest, Readiness, StreamSocket};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = TransportConfig::default();
        let _ = Deadline::after(Duration::from_millis(1));
        let _ = NoSigPipe::inactive();
        let _ = PortPicker::seeded(0, 10001..=65535);
        let _ = (Interest::Read, Readiness::Idle);

        let _: TransportResult<()> = Ok(());
    }
}
