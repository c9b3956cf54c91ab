//! Arena Robots - authoritative turn-based robot arena
//!
//! The server runs a registration -> game -> results cycle over an
//! identity-addressed datagram transport. Clients receive a situation report
//! every turn, pass it to a decision function and send back their orders.

pub mod client;
pub mod config;
pub mod game;
pub mod net;
pub mod util;
