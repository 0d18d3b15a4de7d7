//! Transport Layer
//!
//! A managed connection to the chat server:
//! - `Connection`: self-healing handle (reconnect, outbound buffering)
//! - `WebSocketConnector`: production link over `ws://` / `wss://`
//! - `InProcessConnector`: channel link with a scriptable server side
//!
//! # Design Philosophy
//!
//! Connectors only open links. Everything stateful (identity, inbound sink,
//! buffer, reconnect timer) lives in one driver task per `Connection`, so
//! transient connectivity loss is recovered without the caller noticing.
//!
//! # Security
//!
//! - The identity token is only ever placed in the endpoint query string
//! - Identities redact themselves in logs

pub mod codec;
pub mod config;
pub mod connection;
pub mod in_process;
pub mod outbound;
pub mod traits;
pub mod websocket;

// Re-exports for convenience
pub use config::{ReconnectPolicy, TransportConfig, DEFAULT_ENDPOINT};
pub use connection::{Connection, ConnectionState, ConnectionStats, EventSink};
pub use in_process::{in_process_pair, InProcessConnector, InProcessServer, ServerLink};
pub use outbound::{OutboundBuffer, OverflowPolicy, PushOutcome, DEFAULT_OUTBOUND_CAPACITY};
pub use traits::{Connector, FrameSink, FrameStream, Link, TransportError};
pub use websocket::WebSocketConnector;
