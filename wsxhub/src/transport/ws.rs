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

//! WebSocket adapter over `tokio-tungstenite` streams.

use super::Transport;
use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;

/// [`Transport`] backed by one WebSocket session.
///
/// Text and binary frames both carry payloads; ping/pong frames are answered
/// by `tungstenite` and skipped here.
pub struct WsTransport<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    read_timeout: Option<Duration>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(socket: WebSocketStream<S>) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            read_timeout: None,
        }
    }

    /// Fails each `receive` with a timeout error after `read_timeout` of silence.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Waits for the next payload frame, failing with a timeout error when
    /// `deadline` elapses first.
    pub async fn receive_within(
        &self,
        deadline: Option<Duration>,
    ) -> Result<Vec<u8>, TransportError> {
        let mut stream = self.stream.lock().await;

        loop {
            let next = match deadline {
                Some(deadline) => tokio::time::timeout(deadline, stream.next())
                    .await
                    .map_err(|_| TransportError::timeout())?,
                None => stream.next().await,
            };

            match next {
                None | Some(Ok(WsMessage::Close(_))) => {
                    return Err(TransportError::end_of_stream())
                }
                Some(Ok(WsMessage::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(WsMessage::Binary(data))) => return Ok(data),
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Err(classify(err)),
            }
        }
    }
}

pub(crate) fn classify(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::end_of_stream()
        }
        other => TransportError::other(other.to_string()),
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let frame = match String::from_utf8(payload.to_vec()) {
            Ok(text) => WsMessage::Text(text),
            Err(err) => WsMessage::Binary(err.into_bytes()),
        };

        self.sink.lock().await.send(frame).await.map_err(classify)
    }

    async fn receive(&self) -> Result<Vec<u8>, TransportError> {
        self.receive_within(self.read_timeout).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        match self.sink.lock().await.close().await {
            Ok(()) => Ok(()),
            Err(err) => match classify(err) {
                err if err.is_end_of_stream() => Ok(()),
                err => Err(err),
            },
        }
    }
}
