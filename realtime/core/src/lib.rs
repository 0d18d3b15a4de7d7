//! Realtime Core - Session Layer for the Chat Client
//!
//! This crate keeps a chat UI talking to the assistant server over an
//! unreliable network. It owns the connection lifecycle, buffers outbound
//! requests while disconnected, turns the streamed response into ordered
//! turns, and correlates the session with server-side conversations. It has
//! no UI dependencies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         UI surface                           │
//! └──────────────┬───────────────────────────────▲───────────────┘
//!        submit / open / close             ClientUpdate
//! ┌──────────────▼───────────────────────────────┴───────────────┐
//! │                          ChatClient                          │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────────┐   │
//! │  │TurnAssembler │  │ SessionBinder │  │   TitleReveal    │   │
//! │  └──────▲───────┘  └───────▲───────┘  └──────────────────┘   │
//! │         └────── InboundEvent (codec) ─────┐                  │
//! │  ┌────────────────────────────────────────┴───────────────┐  │
//! │  │ Connection (driver task: link, buffer, reconnect timer) │  │
//! │  └────────────────────────────┬───────────────────────────┘  │
//! └───────────────────────────────┼──────────────────────────────┘
//!                        Connector (WebSocket / in-process)
//! ```
//!
//! # Key Types
//!
//! - [`ChatClient`]: Façade a UI drives
//! - [`Connection`]: Self-healing connection handle
//! - [`TurnAssembler`]: Folds token/done events into turns
//! - [`SessionBinder`]: Conversation list, binding and title guards
//! - [`InboundEvent`] / [`ChatRequest`]: Wire protocol
//!
//! # Quick Start
//!
//! ```ignore
//! use realtime_core::{load_config, ChatClient, ClientUpdate, Identity};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = ChatClient::new(load_config()?)?;
//!     client.open(Identity::new(token));
//!     client.submit("Plan a weekend in Oslo")?;
//!
//!     while let Some(update) = client.next_update().await {
//!         if let ClientUpdate::TurnCompleted { .. } = update {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`messages`]: Identifiers, inbound events and the outbound request
//! - [`transport`]: Connection driver, codec, buffer and connectors
//! - [`turns`]: Turn assembly
//! - [`binder`]: Session binding and conversation list
//! - [`title_reveal`]: Character-by-character title animation
//! - [`client`]: The client façade
//! - [`config`]: TOML/env configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod binder;
pub mod client;
pub mod config;
pub mod messages;
pub mod title_reveal;
pub mod transport;
pub mod turns;

// Re-exports for convenience
pub use binder::{
    BindingUpdate, ConversationEntry, ConversationSummary, RevealRequest, SessionBinder, UNTITLED,
};
pub use client::{ChatClient, ClientError, ClientUpdate};
pub use messages::{
    ChatRequest, ConversationId, Identity, InboundEvent, ResponseMode, Role, TurnId,
};
pub use title_reveal::{RevealStep, TitleReveal, DEFAULT_REVEAL_INTERVAL};
pub use transport::{
    Connection, ConnectionState, ConnectionStats, Connector, OverflowPolicy, ReconnectPolicy,
    TransportConfig, TransportError,
};
pub use turns::{Turn, TurnAssembler, TurnChange};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ClientConfigToml,
    ConfigError, ConfigSource,
};
