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

use super::read_deadline;
use crate::error::CliResult;
use std::io::Write;
use std::time::Duration;
use wsxhub::{ClientOptions, HubClient, HubError};

/// Writes every received payload to `output`, one per line, until the hub
/// closes the session.
pub(crate) async fn run(
    port: u16,
    filter: String,
    debounce_ms: u64,
    timeout_secs: u64,
    output: &mut impl Write,
) -> CliResult<()> {
    let client = HubClient::connect(
        port,
        &ClientOptions {
            filter,
            debounce: Duration::from_millis(debounce_ms),
        },
    )
    .await?;

    client
        .receive(read_deadline(timeout_secs), |payload| {
            output.write_all(&payload)?;
            output.write_all(b"\n")?;
            output.flush()?;
            Ok::<_, HubError>(())
        })
        .await?;

    client.close().await?;
    Ok(())
}
