// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WebSocket push transport.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, ProtocolError};

use super::{PushConnection, PushFrame, PushTransport};

/// Push transport over WebSocket.
///
/// The token is passed as the `accessToken` query parameter together with
/// a millisecond `timestamp`.
///
/// # Examples
///
/// ```no_run
/// use dreo_lib::push::{PushConnection, PushTransport, WebSocketTransport};
///
/// # async fn example() -> dreo_lib::Result<()> {
/// let transport = WebSocketTransport::new();
/// let mut connection = transport
///     .connect("wss://wsb-us.dreo-tech.com/websocket", "token")
///     .await?;
/// while let Some(frame) = connection.next_frame().await {
///     println!("{:?}", frame?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates a WebSocket transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn connect_url(url: &str, token: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!(
            "{url}{separator}accessToken={}&timestamp={}",
            urlencoding::encode(token),
            Utc::now().timestamp_millis()
        )
    }
}

impl PushTransport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn connect(&self, url: &str, token: &str) -> Result<WebSocketConnection, Error> {
        let request_url = Self::connect_url(url, token);
        tracing::debug!(url = %url, "Opening WebSocket");

        match tokio_tungstenite::connect_async(request_url.as_str()).await {
            Ok((stream, _response)) => Ok(WebSocketConnection { stream }),
            Err(tungstenite::Error::Http(response))
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                Err(Error::Auth(format!(
                    "WebSocket upgrade rejected with HTTP {}",
                    response.status().as_u16()
                )))
            }
            Err(e) => Err(ProtocolError::WebSocket(e).into()),
        }
    }
}

/// An open WebSocket push connection.
#[derive(Debug)]
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PushConnection for WebSocketConnection {
    async fn next_frame(&mut self) -> Option<Result<PushFrame, Error>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(PushFrame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(PushFrame::Text(text))),
                    Err(_) => tracing::debug!(len = data.len(), "Discarding non-UTF-8 binary frame"),
                },
                // tungstenite queues the pong reply itself
                Ok(Message::Ping(_) | Message::Pong(_)) => return Some(Ok(PushFrame::Heartbeat)),
                Ok(Message::Close(frame)) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
                    } else {
                        tracing::info!("WebSocket close frame received (no payload)");
                    }
                    return None;
                }
                Ok(Message::Frame(_)) => {}
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(ProtocolError::WebSocket(e).into())),
            }
        }
    }

    async fn ping(&mut self) -> Result<(), Error> {
        self.stream
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| ProtocolError::WebSocket(e).into())
    }
}
