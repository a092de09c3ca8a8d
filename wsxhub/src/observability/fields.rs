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

//! Value-format helpers for structured log fields.

use crate::message::Message;

pub const NONE: &str = "none";
pub const PAYLOAD_PREVIEW_MAX_CHARS: usize = 120;

/// Renders a bounded, lossy UTF-8 preview of a payload for debug logs.
pub fn format_payload_preview(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut preview: String = text.chars().take(PAYLOAD_PREVIEW_MAX_CHARS).collect();
    if text.chars().count() > PAYLOAD_PREVIEW_MAX_CHARS {
        preview.push_str("...");
    }
    preview
}

pub fn format_message_preview(message: &Message) -> String {
    format_payload_preview(message.raw())
}

pub fn format_optional<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| NONE.to_string())
}
