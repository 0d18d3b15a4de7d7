//! In-Process Transport
//!
//! Channel-backed [`Connector`] with a matching server handle. Every connect
//! produces a fresh [`ServerLink`] on the [`InProcessServer`], which can push
//! frames to the client, read what the client sent, or drop the link to
//! simulate a network close.
//!
//! # Usage
//!
//! ```ignore
//! let (connector, mut server) = in_process_pair();
//! let connection = Connection::new(Arc::new(connector), TransportConfig::default());
//! connection.open(identity, events_tx);
//!
//! let mut link = server.accept().await.unwrap();
//! link.push_event(&InboundEvent::Done { message_id: "m1".into() });
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::messages::{ChatRequest, Identity, InboundEvent};

use super::traits::{Connector, Link, TransportError};

/// Create a connected connector/server pair
#[must_use]
pub fn in_process_pair() -> (InProcessConnector, InProcessServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let refusing = Arc::new(AtomicBool::new(false));

    let connector = InProcessConnector {
        accept_tx,
        refusing: Arc::clone(&refusing),
    };
    let server = InProcessServer {
        accept_rx,
        refusing,
    };

    (connector, server)
}

/// Client side of the in-process transport
#[derive(Clone)]
pub struct InProcessConnector {
    accept_tx: mpsc::UnboundedSender<ServerLink>,
    refusing: Arc<AtomicBool>,
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(&self, identity: &Identity) -> Result<Link, TransportError> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }

        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();

        self.accept_tx
            .send(ServerLink {
                identity: identity.clone(),
                outbound: to_client_tx,
                inbound: to_server_rx,
            })
            .map_err(|_| TransportError::ConnectionFailed("server gone".to_string()))?;

        let sink = futures::sink::unfold(
            to_server_tx,
            |tx: mpsc::UnboundedSender<String>, frame: String| async move {
                tx.send(frame)
                    .map_err(|_| TransportError::ConnectionClosed)?;
                Ok::<_, TransportError>(tx)
            },
        );
        let stream = UnboundedReceiverStream::new(to_client_rx);

        Ok(Link::new(Box::pin(sink), Box::pin(stream)))
    }
}

/// Server side of the in-process transport
pub struct InProcessServer {
    accept_rx: mpsc::UnboundedReceiver<ServerLink>,
    refusing: Arc<AtomicBool>,
}

impl InProcessServer {
    /// Wait for the next client connect
    pub async fn accept(&mut self) -> Option<ServerLink> {
        self.accept_rx.recv().await
    }

    /// Take a pending connect without waiting
    pub fn try_accept(&mut self) -> Option<ServerLink> {
        self.accept_rx.try_recv().ok()
    }

    /// Make subsequent connect attempts fail (or succeed again)
    pub fn refuse_connections(&self, refuse: bool) {
        self.refusing.store(refuse, Ordering::SeqCst);
    }
}

/// One accepted client link, seen from the server
///
/// Dropping it closes the link for the client.
pub struct ServerLink {
    identity: Identity,
    outbound: mpsc::UnboundedSender<Result<String, TransportError>>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl ServerLink {
    /// Identity the client connected with
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Send a raw frame to the client; false if the client side is gone
    pub fn push_frame(&self, raw: impl Into<String>) -> bool {
        self.outbound.send(Ok(raw.into())).is_ok()
    }

    /// Send a protocol event to the client
    pub fn push_event(&self, event: &InboundEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(raw) => self.push_frame(raw),
            Err(_) => false,
        }
    }

    /// Deliver a transport error to the client without closing the link
    pub fn push_error(&self, error: TransportError) -> bool {
        self.outbound.send(Err(error)).is_ok()
    }

    /// Wait for the next raw frame from the client
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Take a frame from the client without waiting
    pub fn try_recv_frame(&mut self) -> Option<String> {
        self.inbound.try_recv().ok()
    }

    /// Wait for the next frame and decode it as a request
    pub async fn recv_request(&mut self) -> Option<ChatRequest> {
        let raw = self.recv_frame().await?;
        serde_json::from_str(&raw).ok()
    }

    /// Close the link from the server side
    pub fn disconnect(self) {
        drop(self);
    }
}
