//! Startup synchronization: wait until the console port accepts connections.

use log::info;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

#[derive(Error, Debug)]
pub enum GateError {
    #[error("console endpoint not reachable within {0:?}")]
    Timeout(Duration),

    #[error("console endpoint still refusing connections after {0} attempts")]
    AttemptsExhausted(u32),

    #[error("cannot reach console endpoint {addr}: {source}")]
    Connectivity {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// How long and how often to probe the console endpoint.
///
/// With neither `deadline` nor `max_attempts` set the gate waits forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub connect_timeout: Duration,
    pub deadline: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
            deadline: None,
            max_attempts: None,
        }
    }
}

/// Blocks until `addr` accepts a TCP connection. Returns the number of
/// refused attempts that preceded success.
pub async fn wait_reachable(addr: &str, policy: &WaitPolicy) -> Result<u32, GateError> {
    let connect_timeout = policy.connect_timeout;

    wait_with(addr, policy, move || async move {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))??;
        drop(stream);
        Ok::<(), io::Error>(())
    })
    .await
}

/// Drives `probe` under `policy`. Only `ConnectionRefused` is retried.
pub async fn wait_with<F, Fut>(addr: &str, policy: &WaitPolicy, probe: F) -> Result<u32, GateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let attempts = poll(addr, policy, probe);

    match policy.deadline {
        Some(deadline) => timeout(deadline, attempts)
            .await
            .map_err(|_| GateError::Timeout(deadline))?,
        None => attempts.await,
    }
}

async fn poll<F, Fut>(addr: &str, policy: &WaitPolicy, mut probe: F) -> Result<u32, GateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match probe().await {
            Ok(()) => return Ok(attempt - 1),
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                if policy.max_attempts.is_some_and(|max| attempt >= max) {
                    return Err(GateError::AttemptsExhausted(attempt));
                }
                info!("waiting rcon server at {}...", addr);
                sleep(policy.interval).await;
            }
            Err(source) => {
                return Err(GateError::Connectivity {
                    addr: addr.to_string(),
                    source,
                })
            }
        }
    }
}
