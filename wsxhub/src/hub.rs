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

//! Composition root: two workers wired as each other's target plus their
//! listeners.

use crate::error::HubResult;
use crate::observability::events;
use crate::transport::{Listener, Population};
use crate::worker::{Worker, WorkerHandle};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "hub";

pub const DEFAULT_INSIDE_PORT: u16 = 8002;
pub const DEFAULT_OUTSIDE_PORT: u16 = 8001;
pub const DEFAULT_OUTSIDE_ALLOW: &str = "localhost:8001";

pub const INSIDE: &str = "inside";
pub const OUTSIDE: &str = "outside";

/// Addresses and admission policy of a hub.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HubConfig {
    pub inside_addr: SocketAddr,
    pub outside_addr: SocketAddr,
    /// Origin host pattern admitted on the outside listener.
    pub outside_allow: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            inside_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_INSIDE_PORT)),
            outside_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_OUTSIDE_PORT)),
            outside_allow: DEFAULT_OUTSIDE_ALLOW.to_string(),
        }
    }
}

/// Running hub.
///
/// Inside sessions publish to outside subscribers and outside sessions
/// publish to inside subscribers; neither population hears its own traffic.
pub struct Hub {
    inside_addr: SocketAddr,
    outside_addr: SocketAddr,
    inside: WorkerHandle,
    outside: WorkerHandle,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    listeners: Vec<JoinHandle<()>>,
}

impl Hub {
    /// Binds both listeners, then spawns both worker loops and accept loops.
    ///
    /// Port 0 binds an ephemeral port; see [`Hub::inside_addr`] and
    /// [`Hub::outside_addr`] for the bound addresses.
    pub async fn start(config: HubConfig) -> HubResult<Self> {
        let (outside_worker, outside) = Worker::new(OUTSIDE);
        let (inside_worker, inside) = Worker::new(INSIDE);

        let outside_listener = Listener::bind(config.outside_addr).await?;
        let inside_listener = Listener::bind(config.inside_addr).await?;
        let outside_addr = outside_listener.local_addr()?;
        let inside_addr = inside_listener.local_addr()?;

        let outside_population = Population::new(
            OUTSIDE,
            outside.clone(),
            inside.clone(),
            &config.outside_allow,
        )?;
        let inside_population = Population::new(
            INSIDE,
            inside.clone(),
            outside.clone(),
            &regex::escape(&format!("localhost:{}", inside_addr.port())),
        )?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let workers = vec![
            tokio::spawn(outside_worker.run()),
            tokio::spawn(inside_worker.run()),
        ];
        let listeners = vec![
            tokio::spawn(outside_listener.serve(outside_population, shutdown_rx.clone())),
            tokio::spawn(inside_listener.serve(inside_population, shutdown_rx)),
        ];

        info!(
            event = events::HUB_STARTED,
            component = COMPONENT,
            inside_addr = %inside_addr,
            outside_addr = %outside_addr,
            "hub started"
        );

        Ok(Self {
            inside_addr,
            outside_addr,
            inside,
            outside,
            shutdown,
            workers,
            listeners,
        })
    }

    pub fn inside_addr(&self) -> SocketAddr {
        self.inside_addr
    }

    pub fn outside_addr(&self) -> SocketAddr {
        self.outside_addr
    }

    pub fn inside(&self) -> &WorkerHandle {
        &self.inside
    }

    pub fn outside(&self) -> &WorkerHandle {
        &self.outside
    }

    /// Stops accepting sessions and schedules both workers to finish.
    pub fn shutdown(&self) {
        info!(
            event = events::HUB_SHUTDOWN,
            component = COMPONENT,
            "hub shutting down"
        );
        if self.shutdown.send(true).is_err() {
            debug!(
                event = events::LISTENER_STOPPED,
                component = COMPONENT,
                "listeners already stopped"
            );
        }
        for worker in [&self.inside, &self.outside] {
            if let Err(err) = worker.finish() {
                debug!(
                    event = events::WORKER_STOPPED,
                    component = COMPONENT,
                    worker = worker.name(),
                    err = %err,
                    "worker already stopped"
                );
            }
        }
    }

    /// Resolves once both workers and both listeners have stopped.
    pub async fn wait(self) {
        for task in self.listeners.into_iter().chain(self.workers) {
            if let Err(err) = task.await {
                warn!(
                    event = events::HUB_TASK_FAILED,
                    component = COMPONENT,
                    err = %err,
                    "hub task ended abnormally"
                );
            }
        }
    }
}
