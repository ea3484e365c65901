//! # Remote Console Library
//!
//! Client side of the game server's remote console. It provides the TCP
//! transport, authentication, and a capability-checked wrapper that the
//! pauser drives.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! Owns the socket and speaks the packet framing from `shared::packet`:
//! - Authentication with the console password
//! - Request ids and discarding of stale replies
//! - Per-exchange timeouts and transparent reconnects after transport failures
//!
//! ### Console Module (`console`)
//! The [`console::Console`] seam and [`console::ConsoleClient`] on top of it:
//! - Verifies `/pause` and `/unpause` exist before anything else runs
//! - Exposes `pause`, `unpause` and `announce`
//! - Retries each command with bounded backoff before giving up
//!
//! ### Error Module (`error`)
//! A single [`error::RconError`] covering transport, protocol, authentication,
//! missing-capability and command failures.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rcon::console::{ConsoleClient, RetryPolicy};
//! use rcon::connection::DEFAULT_IO_TIMEOUT;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = ConsoleClient::connect(
//!         "127.0.0.1:12345",
//!         "password",
//!         DEFAULT_IO_TIMEOUT,
//!         RetryPolicy::default(),
//!     )
//!     .await?;
//!
//!     client.announce("Pause the game for player loading.").await?;
//!     client.pause().await?;
//!     client.unpause().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod console;
pub mod error;

pub use connection::RconConnection;
pub use console::{Console, ConsoleClient, RetryPolicy};
pub use error::RconError;
