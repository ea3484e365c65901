//! TCP transport for the remote console.

use crate::console::Console;
use crate::error::{RconError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use shared::packet::{AUTH_FAILED_ID, SERVERDATA_AUTH_RESPONSE, SERVERDATA_RESPONSE_VALUE};
use shared::Packet;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const DEFAULT_ADDR: &str = "127.0.0.1:12345";
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated console connection.
///
/// A transport failure drops the socket; the next exchange dials and
/// authenticates again.
pub struct RconConnection {
    addr: String,
    password: String,
    io_timeout: Duration,
    stream: Option<TcpStream>,
    last_id: i32,
}

impl RconConnection {
    pub async fn connect(addr: &str, password: &str, io_timeout: Duration) -> Result<Self> {
        let mut connection = Self {
            addr: addr.to_string(),
            password: password.to_string(),
            io_timeout,
            stream: None,
            last_id: 0,
        };
        connection.reconnect().await?;
        info!("Connected RCON server at {}", addr);
        Ok(connection)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn next_id(&mut self) -> i32 {
        self.last_id = if self.last_id == i32::MAX {
            1
        } else {
            self.last_id + 1
        };
        self.last_id
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.stream = None;

        let mut stream = within(self.io_timeout, async {
            TcpStream::connect(&self.addr).await.map_err(RconError::from)
        })
        .await?;
        stream.set_nodelay(true)?;

        let request = Packet::auth(self.next_id(), &self.password);
        let response = within(
            self.io_timeout,
            round_trip(&mut stream, &request, SERVERDATA_AUTH_RESPONSE),
        )
        .await?;

        if response.id == AUTH_FAILED_ID {
            return Err(RconError::Auth(self.addr.clone()));
        }

        self.stream = Some(stream);
        Ok(())
    }

    async fn exchange(&mut self, command: &str) -> Result<String> {
        if self.stream.is_none() {
            warn!("RCON connection to {} lost, reconnecting", self.addr);
            self.reconnect().await?;
        }

        let request = Packet::command(self.next_id(), command);
        let io_timeout = self.io_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotConnected))?;

        let result = within(
            io_timeout,
            round_trip(stream, &request, SERVERDATA_RESPONSE_VALUE),
        )
        .await
        .and_then(|response| {
            if response.id == AUTH_FAILED_ID {
                Err(RconError::Auth(self.addr.clone()))
            } else {
                Ok(response.body)
            }
        });

        if let Err(e) = &result {
            if e.breaks_connection() {
                self.stream = None;
            }
        }

        result
    }
}

#[async_trait]
impl Console for RconConnection {
    async fn execute(&mut self, command: &str) -> Result<String> {
        debug!("RCON > {}", command);
        let response = self.exchange(command).await?;
        debug!("RCON < {}", response.trim_end());
        Ok(response)
    }
}

async fn within<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    timeout(limit, fut)
        .await
        .map_err(|_| RconError::Timeout(limit))?
}

/// Sends `request` and waits for the matching reply of `expected_kind`.
/// Replies to earlier, abandoned requests are discarded.
async fn round_trip(stream: &mut TcpStream, request: &Packet, expected_kind: i32) -> Result<Packet> {
    write_packet(stream, request).await?;

    loop {
        let response = read_packet(stream).await?;
        if response.kind == expected_kind
            && (response.id == request.id || response.id == AUTH_FAILED_ID)
        {
            return Ok(response);
        }
        debug!(
            "Discarding RCON packet id {} type {} while waiting for id {}",
            response.id, response.kind, request.id
        );
    }
}

pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await?;

    let len = Packet::frame_len(prefix)?;
    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;

    Ok(Packet::decode(&frame)?)
}

pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, packet: &Packet) -> Result<()> {
    writer.write_all(&packet.encode()?).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::packet::{SERVERDATA_AUTH, SERVERDATA_EXECCOMMAND};
    use tokio::net::TcpListener;

    /// Accepts one connection, authenticates it against `password` and echoes
    /// every command back, preceded by a stale reply with a foreign id.
    async fn spawn_echo_server(password: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let auth = read_packet(&mut socket).await.unwrap();
            assert_eq!(auth.kind, SERVERDATA_AUTH);
            let id = if auth.body == password { auth.id } else { AUTH_FAILED_ID };
            write_packet(&mut socket, &Packet::new(auth.id, SERVERDATA_RESPONSE_VALUE, ""))
                .await
                .unwrap();
            write_packet(&mut socket, &Packet::new(id, SERVERDATA_AUTH_RESPONSE, ""))
                .await
                .unwrap();

            while let Ok(request) = read_packet(&mut socket).await {
                assert_eq!(request.kind, SERVERDATA_EXECCOMMAND);
                let stale = Packet::new(request.id + 1000, SERVERDATA_RESPONSE_VALUE, "stale");
                write_packet(&mut socket, &stale).await.unwrap();
                let reply = Packet::new(request.id, SERVERDATA_RESPONSE_VALUE, request.body);
                write_packet(&mut socket, &reply).await.unwrap();
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_connect_and_execute() {
        let addr = spawn_echo_server("hunter2").await;

        let mut connection = RconConnection::connect(&addr, "hunter2", DEFAULT_IO_TIMEOUT)
            .await
            .unwrap();
        assert!(connection.is_connected());
        assert_eq!(connection.addr(), addr);

        assert_eq!(connection.execute("/help pause").await.unwrap(), "/help pause");
        assert_eq!(connection.execute("/unpause").await.unwrap(), "/unpause");
    }

    #[tokio::test]
    async fn test_wrong_password_is_auth_error() {
        let addr = spawn_echo_server("hunter2").await;

        let result = RconConnection::connect(&addr, "letmein", DEFAULT_IO_TIMEOUT).await;
        assert!(matches!(result, Err(RconError::Auth(a)) if a == addr));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let result = RconConnection::connect(&addr, "pw", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(RconError::Timeout(d)) if d == Duration::from_millis(100)));
    }

    #[test]
    fn test_id_wraps_to_one() {
        let mut connection = RconConnection {
            addr: String::new(),
            password: String::new(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            stream: None,
            last_id: i32::MAX - 1,
        };

        assert_eq!(connection.next_id(), i32::MAX);
        assert_eq!(connection.next_id(), 1);
    }

    #[tokio::test]
    async fn test_read_packet_across_partial_reads() {
        let packet = Packet::command(42, "/help pause");
        let bytes = packet.encode().unwrap();
        let mut reader = tokio_test::io::Builder::new()
            .read(&bytes[..3])
            .read(&bytes[3..9])
            .read(&bytes[9..])
            .build();

        assert_eq!(read_packet(&mut reader).await.unwrap(), packet);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let bytes = Packet::command(7, "/pause").encode().unwrap();
        let mut reader = tokio_test::io::Builder::new()
            .read(&bytes[..bytes.len() - 2])
            .build();

        match read_packet(&mut reader).await {
            Err(RconError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_packet_emits_whole_frame() {
        let packet = Packet::command(3, "/unpause");
        let mut writer = tokio_test::io::Builder::new()
            .write(&packet.encode().unwrap())
            .build();

        write_packet(&mut writer, &packet).await.unwrap();
    }
}
