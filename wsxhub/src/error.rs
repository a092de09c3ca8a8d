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

//! Error types shared by the routing engine, transports and client.

use std::fmt;
use thiserror::Error;

/// Result alias used across the crate.
pub type HubResult<T> = Result<T, HubError>;

/// Errors surfaced by filter parsing, message decoding, routing and transports.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to parse filter: {0}")]
    FilterParse(#[source] serde_json::Error),

    #[error("invalid regexp for key `{key}`: {source}")]
    InvalidRegex {
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("regexp filter values must be string, but key `{key}` has: {value}")]
    RegexValueNotString { key: String, value: serde_json::Value },

    #[error("failed to decode message: {0}")]
    MessageDecode(#[source] serde_json::Error),

    #[error("message must be map or map[]")]
    MessageShape,

    #[error("failed to parse debounce `{value}`: {source}")]
    InvalidDebounce {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("worker `{worker}` is stopped")]
    WorkerStopped { worker: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Classification of a transport failure, replacing ad-hoc error sniffing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    /// No frame arrived before the read deadline, or a write did not
    /// complete before the write deadline.
    Timeout,
    /// The peer closed the session or the stream ended.
    EndOfStream,
    /// Any other read/write/handshake failure.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::EndOfStream => "eof",
            TransportErrorKind::Other => "transport",
        };
        f.write_str(label)
    }
}

/// Transport failure with its kind and a human readable detail.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(TransportErrorKind::Timeout, "no message before read deadline")
    }

    pub fn write_timeout() -> Self {
        Self::new(TransportErrorKind::Timeout, "write deadline exceeded")
    }

    pub fn end_of_stream() -> Self {
        Self::new(TransportErrorKind::EndOfStream, "stream ended")
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.kind == TransportErrorKind::EndOfStream
    }
}
