/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Client side of a hub session, as used by the command line tools.

use crate::error::{HubError, HubResult, TransportError};
use crate::message::Message;
use crate::transport::listener::{DEBOUNCE_PARAM, FILTER_PARAM};
use crate::transport::{ws, Transport, WsTransport};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::MaybeTlsStream;

/// Session parameters sent with the handshake.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClientOptions {
    /// Filter clause JSON; empty means match everything.
    pub filter: String,
    pub debounce: Duration,
}

/// Connected hub session.
pub struct HubClient {
    transport: WsTransport<MaybeTlsStream<TcpStream>>,
}

/// Builds `ws://<host>:<port>/?filter=..&debounce=..`.
pub fn session_url(host: &str, port: u16, options: &ClientOptions) -> HubResult<url::Url> {
    url::Url::parse_with_params(
        &format!("ws://{host}:{port}/"),
        [
            (FILTER_PARAM, options.filter.clone()),
            (DEBOUNCE_PARAM, options.debounce.as_millis().to_string()),
        ],
    )
    .map_err(|err| TransportError::other(err.to_string()).into())
}

fn refusal_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response) => {
            let body = response
                .body()
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            TransportError::other(format!("{}: {}", response.status(), body.trim_end()))
        }
        other => ws::classify(other),
    }
}

impl HubClient {
    /// Connects to the hub listener on `localhost:<port>`.
    ///
    /// # Errors
    ///
    /// A refused handshake surfaces the status and body sent by the hub.
    pub async fn connect(port: u16, options: &ClientOptions) -> HubResult<Self> {
        Self::connect_to("localhost", port, options).await
    }

    pub async fn connect_to(host: &str, port: u16, options: &ClientOptions) -> HubResult<Self> {
        let url = session_url(host, port, options)?;
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(refusal_error)?;

        Ok(Self {
            transport: WsTransport::new(socket),
        })
    }

    /// Publishes a message.
    pub async fn send(&self, message: &Message) -> HubResult<()> {
        Ok(self.transport.send(message.raw()).await?)
    }

    /// Waits for one payload. `None` waits without deadline.
    pub async fn receive_once(&self, timeout: Option<Duration>) -> Result<Vec<u8>, TransportError> {
        self.transport.receive_within(timeout).await
    }

    /// Hands every payload to `callback` until the hub closes the session.
    ///
    /// # Errors
    ///
    /// Returns the first callback error, a read timeout, or any transport
    /// error other than end-of-stream.
    pub async fn receive<F>(&self, timeout: Option<Duration>, mut callback: F) -> HubResult<()>
    where
        F: FnMut(Vec<u8>) -> HubResult<()>,
    {
        loop {
            match self.receive_once(timeout).await {
                Ok(payload) => callback(payload)?,
                Err(err) if err.is_end_of_stream() => return Ok(()),
                Err(err) => return Err(HubError::Transport(err)),
            }
        }
    }

    pub async fn close(&self) -> HubResult<()> {
        Ok(self.transport.close().await?)
    }
}
