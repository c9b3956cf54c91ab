//! Wire protocol and transport

pub mod protocol;
pub mod transport;

pub use protocol::{ClientMsg, DecodeError, Identity, PlayerRecord, ServerMsg, Will};
pub use transport::{
    ChannelHub, ChannelTransport, Datagram, Transport, TransportError, UdpTransport,
};
