//! Identity-addressed datagram transport
//!
//! Every frame carries the sender's identity ahead of the payload:
//!
//! ```text
//! [identity length: u8][identity: UTF-8][payload]
//! ```
//!
//! The UDP adapter learns `identity -> address` routes from the frames it
//! receives, so a server can only reach identities that have spoken to it.
//! Learned routes expire after [`ROUTE_IDLE_TIMEOUT`] without traffic.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::debug;

use super::protocol::Identity;

/// Largest datagram accepted by the UDP adapter
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Learned routes with no traffic for this long are forgotten
pub const ROUTE_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// A payload together with the identity that sent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub peer: Identity,
    pub payload: Vec<u8>,
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Frame(&'static str),

    #[error("identity is {0} bytes, frames allow at most 255")]
    IdentityTooLong(usize),

    #[error("transport closed")]
    Closed,
}

/// Connectionless, identity-addressed message delivery
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Wait up to `timeout` for one message; `Ok(None)` on timeout
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Datagram>, TransportError>;

    /// Fire-and-forget delivery to `recipient`
    async fn send(&mut self, recipient: &Identity, payload: &[u8]) -> Result<(), TransportError>;
}

/// Prefix a payload with the sender identity
pub fn encode_frame(sender: &Identity, payload: &[u8]) -> Result<Bytes, TransportError> {
    let id = sender.as_str().as_bytes();
    let len = u8::try_from(id.len()).map_err(|_| TransportError::IdentityTooLong(id.len()))?;

    let mut frame = BytesMut::with_capacity(1 + id.len() + payload.len());
    frame.put_u8(len);
    frame.put_slice(id);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Split a frame into sender identity and payload
pub fn decode_frame(mut frame: &[u8]) -> Result<(Identity, &[u8]), TransportError> {
    if !frame.has_remaining() {
        return Err(TransportError::Frame("empty datagram"));
    }

    let len = frame.get_u8() as usize;
    if len == 0 {
        return Err(TransportError::Frame("empty identity"));
    }
    if frame.remaining() < len {
        return Err(TransportError::Frame("truncated identity"));
    }

    let (id, payload) = frame.split_at(len);
    let id = std::str::from_utf8(id).map_err(|_| TransportError::Frame("identity is not UTF-8"))?;
    Ok((Identity::new(id), payload))
}

/// Transport statistics
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Sends dropped because the recipient never spoke to us
    pub unroutable: u64,
    /// Learned routes dropped after going idle
    pub routes_expired: u64,
}

#[derive(Clone, Copy, Debug)]
struct Route {
    addr: SocketAddr,
    /// `None` for routes added by hand, which never expire
    last_seen: Option<Instant>,
}

/// UDP adapter
pub struct UdpTransport {
    socket: UdpSocket,
    identity: Identity,
    routes: HashMap<Identity, Route>,
    next_prune: Instant,
    recv_buffer: Vec<u8>,
    stats: TransportStats,
}

impl UdpTransport {
    /// Bind a socket that answers as `identity`
    pub async fn bind(addr: SocketAddr, identity: Identity) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            identity,
            routes: HashMap::new(),
            next_prune: Instant::now() + ROUTE_IDLE_TIMEOUT,
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE],
            stats: TransportStats::default(),
        })
    }

    /// Bind locally and pre-register the route to the server
    pub async fn connect(
        local: SocketAddr,
        server: SocketAddr,
        identity: Identity,
    ) -> Result<Self, TransportError> {
        let mut transport = Self::bind(local, identity).await?;
        transport.add_route(Identity::server(), server);
        Ok(transport)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Pin a route that is never expired
    pub fn add_route(&mut self, peer: Identity, addr: SocketAddr) {
        self.routes.insert(
            peer,
            Route {
                addr,
                last_seen: None,
            },
        );
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    fn learn_route(&mut self, peer: Identity, addr: SocketAddr, now: Instant) {
        let route = self.routes.entry(peer).or_insert(Route {
            addr,
            last_seen: Some(now),
        });
        route.addr = addr;
        if route.last_seen.is_some() {
            route.last_seen = Some(now);
        }
    }

    /// Forget learned routes idle for longer than [`ROUTE_IDLE_TIMEOUT`]
    fn prune_routes(&mut self, now: Instant) {
        if now < self.next_prune {
            return;
        }
        self.next_prune = now + ROUTE_IDLE_TIMEOUT;

        let before = self.routes.len();
        self.routes.retain(|_, route| match route.last_seen {
            Some(seen) => now.duration_since(seen) < ROUTE_IDLE_TIMEOUT,
            None => true,
        });

        let expired = (before - self.routes.len()) as u64;
        if expired > 0 {
            debug!(expired, remaining = self.routes.len(), "Expired idle routes");
            self.stats.routes_expired += expired;
        }
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }
}

impl Transport for UdpTransport {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Datagram>, TransportError> {
        let (len, addr) =
            match tokio::time::timeout(timeout, self.socket.recv_from(&mut self.recv_buffer)).await
            {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            };

        self.stats.packets_received += 1;
        self.stats.bytes_received += len as u64;

        let (peer, payload) = decode_frame(&self.recv_buffer[..len])?;
        let payload = payload.to_vec();

        let now = Instant::now();
        self.learn_route(peer.clone(), addr, now);
        self.prune_routes(now);

        Ok(Some(Datagram { peer, payload }))
    }

    async fn send(&mut self, recipient: &Identity, payload: &[u8]) -> Result<(), TransportError> {
        let Some(addr) = self.routes.get(recipient).map(|route| route.addr) else {
            debug!(identity = %recipient, "No route to recipient, dropping message");
            self.stats.unroutable += 1;
            return Ok(());
        };

        let frame = encode_frame(&self.identity, payload)?;
        let sent = self.socket.send_to(&frame, addr).await?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += sent as u64;
        Ok(())
    }
}

type Mailboxes = Arc<Mutex<HashMap<Identity, mpsc::UnboundedSender<Datagram>>>>;

/// In-process switchboard handing out connected [`ChannelTransport`]s
#[derive(Clone, Default)]
pub struct ChannelHub {
    mailboxes: Mailboxes,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint answering as `identity`
    pub async fn endpoint(&self, identity: Identity) -> ChannelTransport {
        let (tx, inbox) = mpsc::unbounded_channel();
        self.mailboxes.lock().await.insert(identity.clone(), tx);
        ChannelTransport {
            identity,
            inbox,
            mailboxes: self.mailboxes.clone(),
        }
    }
}

/// In-memory transport endpoint
pub struct ChannelTransport {
    identity: Identity,
    inbox: mpsc::UnboundedReceiver<Datagram>,
    mailboxes: Mailboxes,
}

impl ChannelTransport {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl Transport for ChannelTransport {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Datagram>, TransportError> {
        match tokio::time::timeout(timeout, self.inbox.recv()).await {
            Ok(Some(datagram)) => Ok(Some(datagram)),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn send(&mut self, recipient: &Identity, payload: &[u8]) -> Result<(), TransportError> {
        let mailboxes = self.mailboxes.lock().await;
        let Some(mailbox) = mailboxes.get(recipient) else {
            debug!(identity = %recipient, "No route to recipient, dropping message");
            return Ok(());
        };

        mailbox
            .send(Datagram {
                peer: self.identity.clone(),
                payload: payload.to_vec(),
            })
            .map_err(|_| TransportError::Closed)
    }
}
