use regex::Regex;
use std::fmt;
use std::num::ParseIntError;
use std::sync::LazyLock;

pub mod packet;

pub use packet::{Packet, PacketError};

pub const STATE_CHANGED_PATTERN: &str =
    r"received stateChanged peerID\((\d+)\) oldState\((\w+)\) newState\((\w+)\)";

static STATE_CHANGED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(STATE_CHANGED_PATTERN).expect("state change pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    ConnectedDownloadingMap,
    WaitingForCommandToStartSendingTickClosures,
    DisconnectScheduled,
    Other(String),
}

impl ConnectionState {
    pub fn from_token(token: &str) -> Self {
        match token {
            "ConnectedDownloadingMap" => ConnectionState::ConnectedDownloadingMap,
            "WaitingForCommandToStartSendingTickClosures" => {
                ConnectionState::WaitingForCommandToStartSendingTickClosures
            }
            "DisconnectScheduled" => ConnectionState::DisconnectScheduled,
            other => ConnectionState::Other(other.to_string()),
        }
    }

    pub fn as_token(&self) -> &str {
        match self {
            ConnectionState::ConnectedDownloadingMap => "ConnectedDownloadingMap",
            ConnectionState::WaitingForCommandToStartSendingTickClosures => {
                "WaitingForCommandToStartSendingTickClosures"
            }
            ConnectionState::DisconnectScheduled => "DisconnectScheduled",
            ConnectionState::Other(token) => token,
        }
    }

    /// True for the states that end a join, either by finishing the map
    /// download or by the peer leaving.
    pub fn ends_loading(&self) -> bool {
        matches!(
            self,
            ConnectionState::WaitingForCommandToStartSendingTickClosures
                | ConnectionState::DisconnectScheduled
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStateEvent {
    pub peer_id: u64,
    pub old_state: ConnectionState,
    pub new_state: ConnectionState,
}

impl fmt::Display for PeerStateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "peer {} {} -> {}",
            self.peer_id, self.old_state, self.new_state
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed peerID {digits:?}: {source}")]
pub struct MalformedPeerId {
    pub digits: String,
    #[source]
    pub source: ParseIntError,
}

/// Extracts a peer state change from one line of server output.
///
/// Lines without the state change marker yield `Ok(None)`. A marker whose
/// peer id does not fit in a `u64` is an error rather than a skip.
pub fn parse_state_change(line: &str) -> Result<Option<PeerStateEvent>, MalformedPeerId> {
    let Some(caps) = STATE_CHANGED.captures(line) else {
        return Ok(None);
    };

    let digits = &caps[1];
    let peer_id = digits.parse::<u64>().map_err(|source| MalformedPeerId {
        digits: digits.to_string(),
        source,
    })?;

    Ok(Some(PeerStateEvent {
        peer_id,
        old_state: ConnectionState::from_token(&caps[2]),
        new_state: ConnectionState::from_token(&caps[3]),
    }))
}
