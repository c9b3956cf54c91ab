//! Sample robot client: registers, then always shoots the first rival robot

use tracing::info;

use arena_robots::client::{first_rival, ClientState, RobotClient};
use arena_robots::config::ClientConfig;
use arena_robots::net::{Identity, UdpTransport};
use arena_robots::util::telemetry::{init_tracing, shutdown_signal};
use arena_robots::util::time::RECV_TIMEOUT;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env()?;
    init_tracing(&config.log_level);

    let identity = Identity::generate();
    let transport =
        UdpTransport::connect(config.bind_addr, config.server_addr, identity.clone()).await?;
    info!(
        identity = %identity,
        server = %config.server_addr,
        "Connected to arena server"
    );

    let state = ClientState::new(identity, config.nick.as_deref(), config.want, first_rival);
    let client = RobotClient::new(transport, state, RECV_TIMEOUT);

    tokio::select! {
        _ = client.run() => {}
        _ = shutdown_signal() => {}
    }

    Ok(())
}
