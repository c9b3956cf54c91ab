//! Arena Robots Server - authoritative robot arena
//!
//! Binds the identity-addressed UDP transport as `"server"` and runs the
//! registration/game/results cycle until the process is stopped.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;
use tracing::info;

use arena_robots::config::Config;
use arena_robots::game::{GameServer, MatchState};
use arena_robots::net::{Identity, UdpTransport};
use arena_robots::util::telemetry::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Arena Robots server");

    let transport = UdpTransport::bind(config.server_addr, Identity::server()).await?;
    info!(addr = %transport.local_addr()?, "Server listening");

    let rng = match config.world_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let state = MatchState::new(config.timings, rng, Instant::now());
    let server = GameServer::new(transport, state);

    tokio::select! {
        _ = server.run() => {}
        _ = shutdown_signal() => {}
    }

    info!("Server shutdown complete");
    Ok(())
}
