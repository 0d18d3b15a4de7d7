//! Transport Traits
//!
//! The seam between the connection driver and a concrete socket. A
//! [`Connector`] turns an [`Identity`] into a [`Link`]: a sink of outbound text
//! frames and a stream of inbound ones. The driver owns everything else
//! (buffering, reconnects, lifecycle), so connectors stay small.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, Stream};
use thiserror::Error;

use crate::messages::Identity;

/// Errors that can occur during transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection to the server failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to write a frame
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to read a frame
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Connect attempt did not finish in time
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// Endpoint could not be parsed or uses an unsupported scheme
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Outbound half of an established link
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of an established link
///
/// An `Err` item is a diagnostic; the link is considered closed only when the
/// stream ends.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An established, full-duplex text link
pub struct Link {
    /// Frames written here go to the server
    pub sink: FrameSink,
    /// Frames from the server
    pub stream: FrameStream,
}

impl Link {
    /// Pair a sink and a stream
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens links on behalf of the connection driver
///
/// Implementations must not retry internally; the driver decides when and how
/// often to reconnect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open one link authenticated as `identity`
    async fn connect(&self, identity: &Identity) -> Result<Link, TransportError>;
}
