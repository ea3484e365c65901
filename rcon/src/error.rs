use shared::PacketError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RconError {
    #[error("RCON I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RCON protocol error: {0}")]
    Packet(#[from] PacketError),

    #[error("RCON authentication rejected by {0}")]
    Auth(String),

    #[error("RCON exchange timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found \"/{command}\" command.\nPlease install \"{required_mod}\" mod")]
    Capability {
        command: &'static str,
        required_mod: &'static str,
    },

    #[error("command {command:?} failed after {attempts} attempt(s): {source}")]
    Command {
        command: String,
        attempts: u32,
        #[source]
        source: Box<RconError>,
    },
}

impl RconError {
    /// True when the underlying connection can no longer be trusted and must
    /// be re-established before the next exchange.
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            RconError::Io(_) | RconError::Packet(_) | RconError::Timeout(_)
        )
    }

    /// Errors that another attempt cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RconError::Auth(_) | RconError::Capability { .. } | RconError::Command { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RconError>;
