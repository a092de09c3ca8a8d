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
use std::future::Future;
use wsxhub::{Hub, HubConfig};

/// Runs the hub until `stop` resolves, then shuts it down.
pub(crate) async fn run(config: HubConfig, stop: impl Future<Output = ()>) -> CliResult<()> {
    let hub = Hub::start(config).await?;
    stop.await;

    hub.shutdown();
    hub.wait().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::run;
    use crate::commands::ping;
    use crate::commands::test_support::unused_port;
    use std::net::{Ipv4Addr, SocketAddr, TcpListener};
    use tokio::sync::oneshot;
    use wsxhub::{HubConfig, DEFAULT_OUTSIDE_ALLOW};

    #[tokio::test]
    async fn serves_until_stopped() {
        let inside_port = unused_port();
        let config = HubConfig {
            inside_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, inside_port)),
            outside_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            outside_allow: DEFAULT_OUTSIDE_ALLOW.to_string(),
        };
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(run(config, async move {
            let _ = stop_rx.await;
        }));

        let mut output = Vec::new();
        let mut attempts = 0;
        while ping::run(inside_port, &mut output).await.is_err() {
            attempts += 1;
            assert!(attempts < 50, "server never came up");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(output, b"pong");

        stop_tx.send(()).expect("server still waiting");
        server
            .await
            .expect("server task")
            .expect("server should stop cleanly");
    }

    #[tokio::test]
    async fn occupied_port_is_an_error() {
        let occupied = TcpListener::bind("127.0.0.1:0").expect("occupy port");
        let config = HubConfig {
            inside_addr: occupied.local_addr().expect("addr"),
            outside_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            outside_allow: DEFAULT_OUTSIDE_ALLOW.to_string(),
        };

        assert!(run(config, std::future::pending()).await.is_err());
    }
}
