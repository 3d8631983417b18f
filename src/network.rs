//! UDP broadcast transmission.
//!
//! Each send opens its own socket, enables broadcast, transmits one datagram
//! and closes the socket again. Sends happen at most once per interval per
//! interface, so nothing is pooled and no descriptor outlives a send.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::NetworkError;

/// Largest payload that fits one unfragmented datagram on a 1500-byte MTU.
pub const MAX_DATAGRAM_SIZE: usize = 1472;

/// Sends one datagram to one broadcast destination.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Sends `payload` to `destination`, returning the number of bytes sent.
    ///
    /// The socket family follows the destination address.
    async fn send(&self, destination: SocketAddr, payload: &[u8]) -> Result<usize, NetworkError>;
}

/// [`Broadcaster`] over real UDP sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpBroadcaster;

#[async_trait]
impl Broadcaster for UdpBroadcaster {
    async fn send(&self, destination: SocketAddr, payload: &[u8]) -> Result<usize, NetworkError> {
        let local: SocketAddr = match destination {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await.map_err(NetworkError::Open)?;
        socket.set_broadcast(true).map_err(NetworkError::SetOption)?;

        let sent = socket
            .send_to(payload, destination)
            .await
            .map_err(|source| NetworkError::Send { destination, source })?;
        trace!("Sent {} bytes to {}", sent, destination);
        Ok(sent)
    }
}
