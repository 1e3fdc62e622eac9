#![deny(unsafe_code)]

//! Client for the Avaya Proactive Contact Agent API.
//!
//! The agent server speaks a stateful, record-framed ASCII protocol over
//! TCP+TLS. This crate multiplexes many concurrent requests over one
//! connection: a single reader task owns the socket, a dispatcher fans
//! decoded events out to per-request inboxes keyed by invoke id, and
//! server-initiated notifications are delivered out of band on their own
//! stream.
//!
//! # Example
//!
//! ```ignore
//! use apc::{Client, ClientOptions};
//!
//! let (client, driver) = Client::connect("dialer.example.com:22700", ClientOptions::default()).await?;
//! let driver = tokio::spawn(driver.run());
//!
//! client.logon("agent1", "secret").await?;
//! let jobs = client.list_jobs(apc::JobType::All).await?;
//!
//! let mut notifications = client.notifications()?;
//! while let Some(notification) = notifications.recv().await {
//!     println!("{notification:?}");
//! }
//!
//! client.logoff().await?;
//! driver.await??; // Ok(()) after a graceful logoff
//! ```

mod client;
mod commands;
mod driver;
mod errors;
mod notify;
mod pool;
mod registry;
mod request;

pub use client::{Client, ClientOptions};
pub use commands::{AgentState, DataField, FieldValue, Job, JobStatus, JobType, ListType};
pub use driver::Driver;
pub use errors::{AvayaError, ClientError};
pub use notify::{Notification, NotificationStream};
pub use pool::InvokeIdPool;

// Re-export the layers below for callers that frame, decode, or dial
// themselves.
pub use apc_stream::{
    Connector, IdentityDecoder, StreamDecoder, TcpConnector, TlsConnector, TransportError,
    Windows1251Decoder,
};
pub use apc_wire::{DecodeError, EncodeError, Event, EventType, InvokeId};

/// Depth of a request's event inbox. The dispatcher is the only producer and
/// the owning command drains it promptly, so one slot is enough.
pub(crate) const REQUEST_INBOX_SIZE: usize = 1;

/// Depth of the notification slot's inbox and of the subscriber-facing
/// stream. The dispatcher never awaits on the slot, so the inbox absorbs
/// bursts while the subscriber catches up.
pub(crate) const NOTIFICATION_CHANNEL_SIZE: usize = 128;
