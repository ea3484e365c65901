//! Peer load coordination
//!
//! Tracks which peers are currently downloading the map and keeps the game
//! paused for as long as at least one of them is. Only the edges of the set
//! issue commands:
//! - empty → non-empty: announce, then pause
//! - non-empty → empty: unpause
//!
//! Events are handled one at a time; a command completes before the next event
//! is read.

use crate::error::{PauserError, Result};
use crate::events::LogEvent;
use log::{debug, info};
use rcon::{Console, ConsoleClient, RconError};
use shared::{ConnectionState, PeerStateEvent};
use std::collections::HashMap;
use tokio::sync::mpsc;

pub const PAUSE_ANNOUNCEMENT: &str = "Pause the game for player loading.";

/// Why the event loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    LogEnded,
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub events: u64,
    pub pauses: u64,
    pub unpauses: u64,
}

pub struct PeerLoadCoordinator<C> {
    console: ConsoleClient<C>,
    /// Peers between `ConnectedDownloadingMap` and the end of their join.
    loading: HashMap<u64, PeerStateEvent>,
    stats: CoordinatorStats,
}

impl<C: Console> PeerLoadCoordinator<C> {
    pub fn new(console: ConsoleClient<C>) -> Self {
        Self {
            console,
            loading: HashMap::new(),
            stats: CoordinatorStats::default(),
        }
    }

    pub fn loading_peers(&self) -> usize {
        self.loading.len()
    }

    pub fn is_loading(&self, peer_id: u64) -> bool {
        self.loading.contains_key(&peer_id)
    }

    /// True while this process expects the server to be paused.
    pub fn holds_pause(&self) -> bool {
        !self.loading.is_empty()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn console(&self) -> &ConsoleClient<C> {
        &self.console
    }

    /// Consumes events until a terminal element arrives.
    pub async fn run(&mut self, mut events: mpsc::Receiver<LogEvent>) -> Result<StopReason> {
        while let Some(event) = events.recv().await {
            match event {
                LogEvent::Peer(event) => self.handle_event(event).await?,
                LogEvent::StreamError(e) => return Err(e.into()),
                LogEvent::Ended => return Ok(StopReason::LogEnded),
                LogEvent::Cancelled => return Ok(StopReason::Cancelled),
            }
        }

        Err(PauserError::ChannelClosed)
    }

    pub async fn handle_event(&mut self, event: PeerStateEvent) -> std::result::Result<(), RconError> {
        info!("Updated {}", event);
        self.stats.events += 1;

        match event.new_state {
            ConnectionState::ConnectedDownloadingMap => {
                let was_empty = self.loading.is_empty();
                self.loading.insert(event.peer_id, event);

                if was_empty {
                    info!("Execute Pause.");
                    self.console.announce(PAUSE_ANNOUNCEMENT).await?;
                    self.console.pause().await?;
                    self.stats.pauses += 1;
                }
            }
            ref state if state.ends_loading() => {
                let removed = self.loading.remove(&event.peer_id).is_some();

                if removed && self.loading.is_empty() {
                    info!("Execute UnPause.");
                    self.console.unpause().await?;
                    self.stats.unpauses += 1;
                } else if !removed {
                    debug!("Peer {} was not loading", event.peer_id);
                }
            }
            _ => {}
        }

        Ok(())
    }
}
