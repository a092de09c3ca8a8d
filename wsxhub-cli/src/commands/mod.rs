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

//! Subcommand implementations. Each takes its input and output streams so
//! tests can drive them against an in-process hub.

pub(crate) mod notify;
pub(crate) mod ping;
pub(crate) mod receive;
pub(crate) mod send;
pub(crate) mod server;

use std::time::Duration;

/// `0` seconds means no read deadline.
pub(crate) fn read_deadline(timeout_secs: u64) -> Option<Duration> {
    (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs))
}
