//! Turns raw server log lines into peer state events.
//!
//! [`LogEventParser`] is the lazy sequence: it reads lines on demand, skips
//! the ones that are not state changes, and ends after exactly one terminal
//! element. [`spawn_producer`] runs it on its own task and hands each element
//! to the coordinator over a single-slot channel.

use crate::log_source::LineSource;
use log::{debug, warn};
use shared::{parse_state_change, MalformedPeerId, PeerStateEvent};
use std::io;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Error reading log: {0}")]
    Read(#[from] io::Error),

    #[error("failed parse peerID: {0}")]
    MalformedPeerId(#[from] MalformedPeerId),
}

/// One element of the event stream.
#[derive(Debug)]
pub enum LogEvent {
    Peer(PeerStateEvent),
    /// Fatal; nothing follows it.
    StreamError(StreamError),
    /// The log closed cleanly.
    Ended,
    /// The producer was asked to stop.
    Cancelled,
}

impl LogEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LogEvent::Peer(_))
    }
}

pub struct LogEventParser<S> {
    source: S,
    finished: bool,
    lines_read: u64,
}

impl<S: LineSource> LogEventParser<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            finished: false,
            lines_read: 0,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Next peer event. After the first error or end of stream every call
    /// returns `None`; a new parser is needed to read again.
    pub async fn next_event(&mut self) -> Option<Result<PeerStateEvent, StreamError>> {
        while !self.finished {
            let line = match self.source.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            };
            self.lines_read += 1;

            match parse_state_change(&line) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }

        None
    }
}

/// Runs `parser` on a dedicated task.
///
/// The channel holds a single element so the reader stays at most one event
/// ahead of the consumer. The last element sent is always terminal, unless
/// the receiver went away first.
pub fn spawn_producer<S>(
    mut parser: LogEventParser<S>,
    cancel: CancellationToken,
) -> (mpsc::Receiver<LogEvent>, JoinHandle<()>)
where
    S: LineSource + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    let handle = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => LogEvent::Cancelled,
                next = parser.next_event() => match next {
                    Some(Ok(event)) => LogEvent::Peer(event),
                    Some(Err(e)) => LogEvent::StreamError(e),
                    None => LogEvent::Ended,
                },
            };

            let terminal = event.is_terminal();
            if let LogEvent::Peer(ref peer) = event {
                debug!("Read {}", peer);
            }

            if tx.send(event).await.is_err() {
                warn!("Event consumer went away, stopping log reader");
                break;
            }
            if terminal {
                break;
            }
        }

        debug!("Log reader finished after {} lines", parser.lines_read());
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ConnectionState;
    use crate::log_source::{raw_lines, RawLines};
    use tokio::io::BufReader;

    fn parser_over(text: &'static str) -> LogEventParser<RawLines<BufReader<&'static [u8]>>> {
        parser_over_bytes(text.as_bytes())
    }

    fn parser_over_bytes(bytes: &'static [u8]) -> LogEventParser<RawLines<BufReader<&'static [u8]>>> {
        LogEventParser::new(raw_lines(BufReader::new(bytes)))
    }

    const JOIN_LOG: &str = "\
   0.000 2024-01-01 00:00:00; Factorio 1.1.100 (build 1, linux64, headless)
  10.500 Info ServerMultiplayerManager.cpp:1093: received stateChanged peerID(7) oldState(ConnectedWaitingForMap) newState(ConnectedDownloadingMap)
  11.000 Info GameActionHandler.cpp:5000: UpdateTick (1234) processed PlayerJoinGame
  12.250 Info ServerMultiplayerManager.cpp:1093: received stateChanged peerID(7) oldState(ConnectedLoadingMap) newState(WaitingForCommandToStartSendingTickClosures)
";

    #[tokio::test]
    async fn test_skips_unrelated_lines() {
        let mut parser = parser_over(JOIN_LOG);

        let first = parser.next_event().await.unwrap().unwrap();
        assert_eq!(first.peer_id, 7);
        assert_eq!(first.new_state, ConnectionState::ConnectedDownloadingMap);

        let second = parser.next_event().await.unwrap().unwrap();
        assert_eq!(
            second.new_state,
            ConnectionState::WaitingForCommandToStartSendingTickClosures
        );

        assert!(parser.next_event().await.is_none());
        assert_eq!(parser.lines_read(), 4);
    }

    #[tokio::test]
    async fn test_end_of_stream_is_fused() {
        let mut parser = parser_over("nothing to see\n");

        assert!(parser.next_event().await.is_none());
        assert!(parser.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_skipped() {
        let mut parser = parser_over_bytes(
            b"player \xff\xfe said hi\n\
              received stateChanged peerID(7) oldState(A) newState(ConnectedDownloadingMap)\n",
        );

        let event = parser.next_event().await.unwrap().unwrap();
        assert_eq!(event.peer_id, 7);
        assert_eq!(event.new_state, ConnectionState::ConnectedDownloadingMap);
        assert!(parser.next_event().await.is_none());
        assert_eq!(parser.lines_read(), 2);
    }

    #[tokio::test]
    async fn test_overflowing_peer_id_is_error() {
        let mut parser = parser_over(
            "received stateChanged peerID(99999999999999999999) oldState(A) newState(B)\n\
             received stateChanged peerID(1) oldState(A) newState(B)\n",
        );

        assert!(matches!(
            parser.next_event().await,
            Some(Err(StreamError::MalformedPeerId(_)))
        ));
        // Nothing is read past the error.
        assert!(parser.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_read_error_is_single_terminal_element() {
        let mock = tokio_test::io::Builder::new()
            .read(b"received stateChanged peerID(3) oldState(A) newState(ConnectedDownloadingMap)\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "log pipe reset"))
            .build();
        let mut parser = LogEventParser::new(raw_lines(BufReader::new(mock)));

        assert_eq!(parser.next_event().await.unwrap().unwrap().peer_id, 3);
        match parser.next_event().await {
            Some(Err(StreamError::Read(e))) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("Unexpected element: {:?}", other),
        }
        assert!(parser.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_producer_ends_with_terminal_element() {
        let (mut rx, handle) = spawn_producer(parser_over(JOIN_LOG), CancellationToken::new());

        assert!(matches!(rx.recv().await, Some(LogEvent::Peer(e)) if e.peer_id == 7));
        assert!(matches!(rx.recv().await, Some(LogEvent::Peer(_))));
        assert!(matches!(rx.recv().await, Some(LogEvent::Ended)));
        assert!(rx.recv().await.is_none());

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_producer_forwards_stream_error() {
        let mock = tokio_test::io::Builder::new()
            .read_error(io::Error::other("boom"))
            .build();
        let parser = LogEventParser::new(raw_lines(BufReader::new(mock)));
        let (mut rx, handle) = spawn_producer(parser, CancellationToken::new());

        assert!(matches!(rx.recv().await, Some(LogEvent::StreamError(StreamError::Read(_)))));
        assert!(rx.recv().await.is_none());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_producer_cancellation() {
        // A duplex with the write half held open never reaches end of stream.
        let (reader, _writer) = tokio::io::duplex(64);
        let parser = LogEventParser::new(raw_lines(BufReader::new(reader)));
        let cancel = CancellationToken::new();
        let (mut rx, handle) = spawn_producer(parser, cancel.clone());

        cancel.cancel();

        assert!(matches!(rx.recv().await, Some(LogEvent::Cancelled)));
        assert!(rx.recv().await.is_none());
        handle.await.unwrap();
    }

    #[test]
    fn test_terminal_classification() {
        let event = PeerStateEvent {
            peer_id: 1,
            old_state: ConnectionState::from_token("Ready"),
            new_state: ConnectionState::ConnectedDownloadingMap,
        };
        assert!(!LogEvent::Peer(event).is_terminal());
        assert!(LogEvent::Ended.is_terminal());
        assert!(LogEvent::Cancelled.is_terminal());
    }
}
