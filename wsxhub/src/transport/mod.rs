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

//! Session transports.
//!
//! [`Transport`] is the seam between routing and the wire: a connection only
//! needs to send a payload, receive the next payload and close. The WebSocket
//! adapter and listener live in submodules; tests provide in-memory fakes.

use crate::error::TransportError;
use async_trait::async_trait;

pub mod listener;
pub mod ws;

pub use listener::{Listener, Population, SessionParams};
pub use ws::WsTransport;

/// One bidirectional client session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmits one payload.
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Waits for the next inbound payload.
    ///
    /// Reports [`crate::error::TransportErrorKind::EndOfStream`] when the peer
    /// is gone and [`crate::error::TransportErrorKind::Timeout`] when a read
    /// deadline expires.
    async fn receive(&self) -> Result<Vec<u8>, TransportError>;

    /// Closes the session. Closing an already closed session succeeds.
    async fn close(&self) -> Result<(), TransportError>;
}
