//! Capability-checked console client.
//!
//! Wraps any [`Console`] and refuses to start unless the server exposes both
//! `/pause` and `/unpause`. Every command is retried with bounded backoff
//! before the failure is escalated.

use crate::connection::RconConnection;
use crate::error::{RconError, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::time::Duration;
use tokio::time::sleep;

pub const REQUIRED_MOD: &str = "pause-commands";
pub const UNKNOWN_COMMAND_MARKER: &str = "Unknown command";

/// Anything that can run a console command and return its textual reply.
#[async_trait]
pub trait Console: Send {
    async fn execute(&mut self, command: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, failure is returned immediately.
    pub fn fail_fast() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub pause: bool,
    pub unpause: bool,
}

pub struct ConsoleClient<C> {
    console: C,
    retry: RetryPolicy,
    capabilities: Capabilities,
}

impl ConsoleClient<RconConnection> {
    pub async fn connect(
        addr: &str,
        password: &str,
        io_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let connection = RconConnection::connect(addr, password, io_timeout).await?;
        Self::verify(connection, retry).await
    }
}

impl<C: Console> ConsoleClient<C> {
    /// Checks that the server knows the pause commands before handing out a client.
    pub async fn verify(console: C, retry: RetryPolicy) -> Result<Self> {
        let mut client = Self {
            console,
            retry,
            capabilities: Capabilities {
                pause: false,
                unpause: false,
            },
        };

        client.capabilities.pause = client.has_command("pause").await?;
        if !client.capabilities.pause {
            return Err(RconError::Capability {
                command: "pause",
                required_mod: REQUIRED_MOD,
            });
        }

        client.capabilities.unpause = client.has_command("unpause").await?;
        if !client.capabilities.unpause {
            return Err(RconError::Capability {
                command: "unpause",
                required_mod: REQUIRED_MOD,
            });
        }

        info!("Server provides /pause and /unpause");
        Ok(client)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub async fn pause(&mut self) -> Result<()> {
        self.run("/pause").await.map(drop)
    }

    pub async fn unpause(&mut self) -> Result<()> {
        self.run("/unpause").await.map(drop)
    }

    /// Broadcasts `text` to every player.
    pub async fn announce(&mut self, text: &str) -> Result<()> {
        self.run(&format!("/shout {}", text)).await.map(drop)
    }

    async fn has_command(&mut self, name: &str) -> Result<bool> {
        let response = self.run(&format!("/help {}", name)).await?;
        Ok(response.contains(&format!("/{}", name)) && !response.contains(UNKNOWN_COMMAND_MARKER))
    }

    async fn run(&mut self, command: &str) -> Result<String> {
        let mut attempt = 1;

        loop {
            match self.console.execute(command).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) if attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff_after(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        command, attempt, self.retry.max_attempts, e, backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(RconError::Command {
                        command: command.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    })
                }
            }
        }
    }
}
