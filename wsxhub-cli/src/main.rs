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

mod commands;
mod config;
mod error;

use crate::config::{Config, Overrides};
use crate::error::CliResult;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wsxhub::DEFAULT_INSIDE_PORT;

const COMPONENT: &str = "wsxhub_cli";

#[derive(Parser)]
#[command(name = "wsxhub", version, about = "Websocket relay between local tools and editors")]
struct HubArgs {
    /// Port of the inside listener.
    #[arg(long, global = true, value_name = "PORT")]
    port: Option<u16>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: HubCommand,
}

#[derive(Subcommand)]
enum HubCommand {
    /// Send a message read from stdin and print the first reply.
    Send {
        /// Filter clause JSON applied to replies.
        #[arg(long, default_value = "")]
        filter: String,
        /// Read deadline in seconds, 0 waits forever.
        #[arg(long, default_value_t = 0)]
        timeout: u64,
    },
    /// Send a message read from stdin without waiting for a reply.
    Notify,
    /// Print received messages, one per line.
    Receive {
        /// Debounce interval in milliseconds.
        #[arg(long, default_value_t = 0)]
        debounce: u64,
        /// Filter clause JSON applied to received messages.
        #[arg(long, default_value = "")]
        filter: String,
        /// Read deadline in seconds, 0 waits forever.
        #[arg(long, default_value_t = 0)]
        timeout: u64,
    },
    /// Check that the hub accepts connections.
    Ping,
    /// Run the hub.
    Server {
        /// Port of the outside listener.
        #[arg(long, value_name = "PORT")]
        outside: Option<u16>,
        /// Origin host pattern admitted on the outside listener.
        #[arg(long = "outside-allow", value_name = "PATTERN")]
        outside_allow: Option<String>,
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            component = COMPONENT,
            err = %err,
            "unable to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}

async fn run(args: HubArgs) -> CliResult<()> {
    let port = args.port.unwrap_or(DEFAULT_INSIDE_PORT);

    match args.command {
        HubCommand::Send { filter, timeout } => {
            commands::send::run(
                port,
                filter,
                timeout,
                std::io::stdin().lock(),
                &mut std::io::stdout().lock(),
            )
            .await
        }
        HubCommand::Notify => commands::notify::run(port, std::io::stdin().lock()).await,
        HubCommand::Receive {
            debounce,
            filter,
            timeout,
        } => {
            commands::receive::run(port, filter, debounce, timeout, &mut std::io::stdout().lock())
                .await
        }
        HubCommand::Ping => commands::ping::run(port, &mut std::io::stdout().lock()).await,
        HubCommand::Server {
            outside,
            outside_allow,
            config,
        } => {
            let file_config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            let hub_config = file_config.into_hub_config(Overrides {
                inside_port: args.port,
                outside_port: outside,
                outside_allow,
            });
            commands::server::run(hub_config, shutdown_signal()).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = HubArgs::parse();
    init_tracing(args.debug);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("wsxhub: {err}");
            ExitCode::FAILURE
        }
    }
}
