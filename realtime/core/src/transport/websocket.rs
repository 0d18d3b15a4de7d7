//! WebSocket Transport
//!
//! [`Connector`] over `tokio-tungstenite`. The identity token travels as the
//! `token` query parameter of the endpoint URL. Text frames pass through as-is,
//! binary frames are read as lossy UTF-8, and control frames are handled by
//! tungstenite.

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::messages::Identity;

use super::traits::{Connector, Link, TransportError};

/// Connects to the chat server over WebSocket
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    endpoint: Url,
}

impl WebSocketConnector {
    /// Validate `endpoint` (must be `ws://` or `wss://`)
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{endpoint}: {e}")))?;

        match endpoint.scheme() {
            "ws" | "wss" => Ok(Self { endpoint }),
            other => Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme '{other}', expected ws or wss"
            ))),
        }
    }

    /// Endpoint with the identity token attached
    #[must_use]
    pub fn url_for(&self, identity: &Identity) -> Url {
        let mut url = self.endpoint.clone();
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "token")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (key, value) in &retained {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("token", identity.token());
        }
        url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, identity: &Identity) -> Result<Link, TransportError> {
        let url = self.url_for(identity);
        tracing::debug!(
            host = self.endpoint.host_str().unwrap_or_default(),
            path = self.endpoint.path(),
            "Opening WebSocket"
        );

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (ws_write, ws_read) = ws_stream.split();

        let sink = ws_write
            .sink_map_err(|e| TransportError::SendFailed(e.to_string()))
            .with(|frame: String| future::ready(Ok::<_, TransportError>(Message::Text(frame.into()))));

        // Deliver the first read error, then end the stream: tungstenite does
        // not recover after one.
        let stream = ws_read
            .filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                    Ok(Message::Binary(bytes)) => {
                        Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "Server closed WebSocket");
                        None
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::ReceiveFailed(e.to_string()))),
                })
            })
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            });

        Ok(Link::new(Box::pin(sink), Box::pin(stream)))
    }
}
