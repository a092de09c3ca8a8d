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
use std::io::{Read, Write};
use wsxhub::{ClientOptions, HubClient, HubError, Message};

/// Publishes one message read from `input` and writes the first reply that
/// passes `filter` to `output`. A session closed by the hub writes nothing.
pub(crate) async fn run(
    port: u16,
    filter: String,
    timeout_secs: u64,
    input: impl Read,
    output: &mut impl Write,
) -> CliResult<()> {
    let message = Message::from_reader(input)?;
    let client = HubClient::connect(
        port,
        &ClientOptions {
            filter,
            ..Default::default()
        },
    )
    .await?;

    client.send(&message).await?;

    let reply = client.receive_once(read_deadline(timeout_secs)).await;
    let closed = client.close().await;

    match reply {
        Ok(reply) => {
            output.write_all(&reply)?;
            output.flush()?;
        }
        Err(err) if err.is_end_of_stream() => {}
        Err(err) => return Err(HubError::Transport(err).into()),
    }

    closed?;
    Ok(())
}
