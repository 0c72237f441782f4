//! Logs in, joins a server, and logs what the server reports.
//!
//! ```text
//! MIKMAK_USERNAME=me MIKMAK_PASSWORD=secret RUST_LOG=info cargo run -p login-probe
//! ```
//!
//! `MIKMAK_SERVER` picks the server by name (default קיווי); set it to an
//! empty string to stop after the server list. Ctrl-C disconnects.

use std::env;
use std::process::ExitCode;

use mikmak::prelude::*;

fn config_from_env() -> Result<ClientConfig, String> {
    let var = |name: &str| env::var(name).map_err(|_| format!("{name} is not set"));

    let mut config = ClientConfig {
        username: var("MIKMAK_USERNAME")?,
        password: var("MIKMAK_PASSWORD")?,
        ..ClientConfig::default()
    };
    if let Ok(server) = env::var("MIKMAK_SERVER") {
        config.server_to_join = (!server.is_empty()).then_some(server);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    mikmak::logging::init("info");

    let config = match config_from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut client = ClientBuilder::from_config(config).build();

    client
        .events()
        .on_server_list(|servers| {
            for server in servers {
                tracing::info!(
                    id = server.id,
                    name = %server.name,
                    address = %format!("{}:{}", server.ip, server.port),
                    load = server.capacity,
                    "server"
                );
            }
        })
        .on_room_list(|rooms| tracing::info!(rooms = rooms.len(), "room list"))
        .on_login_result(|result| tracing::info!(fields = result.len(), "login result"))
        .on_achievements(|entries, is_update| {
            tracing::info!(entries = entries.len(), is_update, "achievements")
        })
        .on_inventory(|items| tracing::info!(items = items.len(), "inventory"));

    let shutdown = client.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, disconnecting");
            shutdown.disconnect();
        }
    });

    match client.connect().await {
        Ok(end) => {
            let state = client.state();
            tracing::info!(
                ?end,
                user = ?state.username,
                user_id = ?state.user_id,
                rank = ?state.rank,
                xp = ?state.xp,
                achievements = state.achievements.len(),
                "session over"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %MikmakError::from(e), "could not start session");
            ExitCode::FAILURE
        }
    }
}
