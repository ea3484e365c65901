use crate::events::StreamError;
use crate::gate::GateError;
use rcon::RconError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PauserError {
    #[error("Startup wait failed: {0}")]
    Gate(#[from] GateError),

    #[error("Console error: {0}")]
    Console(#[from] RconError),

    #[error("Log stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Failed to open log source: {0}")]
    LogSource(#[from] std::io::Error),

    #[error("Event channel closed without a terminal event")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, PauserError>;
