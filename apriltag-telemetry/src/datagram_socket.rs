use std::net::UdpSocket;
use tracing::{error, warn};

use crate::{Error, Result};

pub(crate) trait SendComplete {
    /// Send a whole datagram to the connected peer.
    ///
    /// Transient failures (no listener, full buffer) drop the data with a
    /// warning and return `Ok`.
    fn send_complete(&self, x: &[u8]) -> Result<()>;
}

impl SendComplete for UdpSocket {
    fn send_complete(&self, x: &[u8]) -> Result<()> {
        match self.send(x) {
            Ok(sz) => {
                if sz != x.len() {
                    return Err(Error::Publish(format!(
                        "incomplete send: {sz} of {} bytes",
                        x.len()
                    )));
                }
            }
            Err(err) => match err.kind() {
                std::io::ErrorKind::WouldBlock => {
                    warn!("WouldBlock: dropping telemetry datagram");
                }
                std::io::ErrorKind::ConnectionRefused => {
                    warn!("ConnectionRefused: dropping telemetry datagram");
                }
                _ => {
                    error!("error sending telemetry datagram: {:?}", err);
                    return Err(Error::Publish(err.to_string()));
                }
            },
        }
        Ok(())
    }
}
