//! Follows a coach's roster from the command line.
//!
//! Loads the roster once, then logs every change the live feed brings in until
//! interrupted.

use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use coach_roster::config::WatchConfig;
use coach_roster::sync::{HttpDirectory, RosterState, RosterSync};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = WatchConfig::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Watching roster at {}", config.server_url);

    let directory = HttpDirectory::new(
        config.server_url.clone(),
        config.api_psk.as_deref(),
        &config.session_token,
    )?;
    let sync = RosterSync::new(std::sync::Arc::new(directory), config.identity_ttl);

    // A failed load is recorded in the state and shown below
    if let Err(e) = sync.load().await {
        tracing::error!("Initial load failed: {}", e);
    }
    let listener = sync.start_listener();

    let mut updates = WatchStream::new(sync.subscribe());
    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(state) => report(&state),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    listener.close();
    Ok(())
}

fn report(state: &RosterState) {
    if state.loading {
        return;
    }
    if let Some(error) = &state.error {
        tracing::warn!(clients = state.clients.len(), "Roster error: {}", error);
        return;
    }

    tracing::info!(clients = state.clients.len(), "Roster updated");
    for client in &state.clients {
        tracing::info!(
            id = %client.id,
            status = client.status.as_str(),
            completion = client.completion,
            "  {}",
            client.name
        );
    }
}
