//! Game simulation modules

pub mod combat;
pub mod r#match;
pub mod registry;
pub mod server;
pub mod world;

pub use r#match::{MatchState, Outbound, Phase, PhaseKind};
pub use registry::PlayerRegistry;
pub use server::{isolate, GameServer, ServerError};
pub use world::{Action, Point, Robot, World};
