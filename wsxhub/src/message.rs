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

//! Immutable relayed payload together with its decoded JSON objects.

use crate::error::{HubError, HubResult};
use serde_json::{Map, Value};
use std::io::Read;

/// A decoded JSON object.
pub type JsonObject = Map<String, Value>;

/// One transmission unit: either a single event object or a batch of objects.
///
/// `decoded` is never empty. The raw bytes are kept as received so subscribers
/// get exactly what the publisher sent.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    raw: Vec<u8>,
    decoded: Vec<JsonObject>,
}

impl Message {
    /// Decodes `raw` as a JSON object or a JSON array of objects.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::MessageDecode`] for invalid JSON and
    /// [`HubError::MessageShape`] for any shape other than object / array of
    /// objects, including an empty array.
    pub fn from_bytes(raw: impl Into<Vec<u8>>) -> HubResult<Self> {
        let raw = raw.into();
        let value: Value = serde_json::from_slice(&raw).map_err(HubError::MessageDecode)?;

        let decoded = match value {
            Value::Object(object) => vec![object],
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(object) => Ok(object),
                    _ => Err(HubError::MessageShape),
                })
                .collect::<HubResult<Vec<_>>>()?,
            _ => return Err(HubError::MessageShape),
        };

        if decoded.is_empty() {
            return Err(HubError::MessageShape);
        }

        Ok(Self { raw, decoded })
    }

    /// Reads the whole input and decodes it with [`Message::from_bytes`].
    pub fn from_reader(mut reader: impl Read) -> HubResult<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Self::from_bytes(raw)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn decoded(&self) -> &[JsonObject] {
        &self.decoded
    }

    /// `true` when the payload was an array of objects.
    pub fn is_batch(&self) -> bool {
        matches!(self.raw.iter().find(|b| !b.is_ascii_whitespace()), Some(b'['))
    }
}
