//! # Join Pauser Library
//!
//! Keeps a game server paused while any player is still downloading the map
//! and resumes it once nobody is joining. It watches the server's log for
//! peer state changes and drives the server through its remote console.
//!
//! ## Pipeline
//!
//! ```text
//! log lines -> LogEventParser -> mpsc(1) -> PeerLoadCoordinator -> ConsoleClient -> server
//! ```
//!
//! ### Startup Gate (`gate`)
//! Polls the console port until it accepts connections. Refused connections
//! are retried on a fixed interval; a deadline or attempt cap bounds the wait.
//!
//! ### Log Source (`log_source`)
//! Container logs (`docker logs --follow --tail 0`), a file, or stdin, all
//! behind the [`log_source::LineSource`] trait.
//!
//! ### Events (`events`)
//! Lazily extracts [`shared::PeerStateEvent`]s from log lines and forwards them
//! from a producer task, always finishing with one terminal element.
//!
//! ### Coordinator (`coordinator`)
//! Owns the set of loading peers and issues pause/unpause on its empty and
//! non-empty edges.
//!
//! ## Shutdown
//!
//! Cancelling the token passed to [`run`] stops the gate or the log reader;
//! the coordinator then returns [`coordinator::StopReason::Cancelled`]. No
//! command is sent on the way out, so the server keeps whatever pause state
//! it was last driven to.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod gate;
pub mod log_source;

use crate::config::Settings;
use crate::coordinator::{PeerLoadCoordinator, StopReason};
use crate::error::Result;
use crate::events::{spawn_producer, LogEventParser};
use log::info;
use rcon::ConsoleClient;
use tokio_util::sync::CancellationToken;

/// Waits for the console, verifies it, then coordinates pauses until the log
/// ends, the token is cancelled, or a fatal error occurs.
pub async fn run(settings: &Settings, cancel: CancellationToken) -> Result<StopReason> {
    info!("Waiting for RCON server at {}", settings.server);
    tokio::select! {
        result = gate::wait_reachable(&settings.server, &settings.wait) => {
            let retries = result?;
            info!("RCON server reachable after {} retries", retries);
        }
        _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
    }

    let console = ConsoleClient::connect(
        &settings.server,
        &settings.password,
        settings.io_timeout,
        settings.retry,
    )
    .await?;

    let source = settings.log_source.open().await?;
    let (events, reader) = spawn_producer(LogEventParser::new(source), cancel);

    let mut coordinator = PeerLoadCoordinator::new(console);
    let outcome = coordinator.run(events).await;

    // The reader may still be blocked on a quiet log after a fatal command error.
    reader.abort();

    let stats = coordinator.stats();
    info!(
        "Processed {} peer events, {} pauses, {} unpauses, {} peers still loading",
        stats.events,
        stats.pauses,
        stats.unpauses,
        coordinator.loading_peers()
    );

    outcome
}
