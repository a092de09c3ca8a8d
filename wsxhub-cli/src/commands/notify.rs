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

use crate::error::CliResult;
use std::io::Read;
use wsxhub::{ClientOptions, HubClient, Message};

/// Publishes one message read from `input` without waiting for a reply.
pub(crate) async fn run(port: u16, input: impl Read) -> CliResult<()> {
    let message = Message::from_reader(input)?;
    let client = HubClient::connect(port, &ClientOptions::default()).await?;
    client.send(&message).await?;
    client.close().await?;
    Ok(())
}
