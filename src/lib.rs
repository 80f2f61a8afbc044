//! Persistent-connection RPC client for the iTouch device server.
//!
//! One [`Client`] owns one WebSocket. Calls are JSON requests tagged with a
//! generated `requestId`; replies come back on the same socket as JSON or as
//! hybrid frames (length-prefixed JSON metadata followed by raw bytes). The
//! server can also push named events at any time.
//!
//! ```no_run
//! # async fn demo() -> Result<(), itouch::ClientError> {
//! let client = itouch::Client::new(itouch::ClientConfig::from_env());
//! client.connect().await?;
//! client.subscribe("screenChanged", |payload| println!("{payload:?}"));
//! let reply = client.invoke("ping", &()).await?;
//! println!("{:?}", reply.as_json());
//! client.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! MODULES
//! =======
//! - [`client`]: connection engine and the public handle.
//! - [`pending`]: request correlation table with per-call deadlines.
//! - [`events`]: named event listeners.
//! - [`reconnect`]: retry policy.
//! - [`transport`]: the socket seam and its WebSocket implementation.
//! - Wire codec lives in the `frames` crate.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod pending;
pub mod reconnect;
pub mod transport;

pub use client::{Client, ConnectionState, Notice};
pub use config::ClientConfig;
pub use error::{ClientError, TransportError};
pub use events::{EventDispatcher, Listener, ListenerId};
pub use frames::{Envelope, Payload};
pub use pending::PendingTable;
pub use reconnect::{Decision, ReconnectPolicy};
pub use transport::{Connector, Transport, WsConnector};
