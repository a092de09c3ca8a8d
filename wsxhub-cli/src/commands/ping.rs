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
use std::io::Write;
use wsxhub::{ClientOptions, HubClient};

/// Connects to the hub and prints `pong`.
pub(crate) async fn run(port: u16, output: &mut impl Write) -> CliResult<()> {
    let client = HubClient::connect(port, &ClientOptions::default()).await?;
    output.write_all(b"pong")?;
    output.flush()?;
    client.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::run;
    use crate::commands::test_support::{start_hub, unused_port};

    #[tokio::test]
    async fn prints_pong_when_hub_is_up() {
        let hub = start_hub().await;
        let mut output = Vec::new();

        run(hub.inside_addr().port(), &mut output)
            .await
            .expect("ping should succeed");

        assert_eq!(output, b"pong");
        hub.shutdown();
        hub.wait().await;
    }

    #[tokio::test]
    async fn fails_when_nothing_listens() {
        let mut output = Vec::new();

        assert!(run(unused_port(), &mut output).await.is_err());
        assert!(output.is_empty());
    }
}
