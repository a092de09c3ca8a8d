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

//! Per-population worker loop owning the connection registry.
//!
//! Every registry mutation and every fan-out happens inside [`Worker::run`].
//! Other tasks talk to the loop through a cloneable [`WorkerHandle`] that only
//! posts events, so posting never waits on routing work.

use crate::connection::{Connection, SendOutcome};
use crate::error::{HubError, HubResult, TransportError};
use crate::message::Message;
use crate::observability::{events, fields};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn, Level};

const COMPONENT: &str = "worker";

/// Events processed by the worker loop in arrival order.
pub(crate) enum WorkerEvent {
    Join(Arc<Connection>),
    Leave(String),
    Receive(Arc<Message>),
    SendResult {
        conn_id: String,
        result: Result<(), TransportError>,
    },
    Shutdown,
}

/// Connection registry of one population, keyed by connection id.
pub(crate) struct ConnectionRegistry {
    connections: HashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Creates an empty connection registry.
    pub(crate) fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, connection: Arc<Connection>) {
        self.connections
            .insert(connection.id().to_string(), connection);
    }

    pub(crate) fn remove(&mut self, conn_id: &str) -> Option<Arc<Connection>> {
        self.connections.remove(conn_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    /// Snapshot of the current members, so fan-out does not borrow the map.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.values().cloned().collect()
    }
}

/// Cloneable poster for one worker's event queue.
#[derive(Clone)]
pub struct WorkerHandle {
    name: Arc<str>,
    sender: UnboundedSender<WorkerEvent>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("stopped", &self.sender.is_closed())
            .finish()
    }
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once the worker loop has stopped and dropped its queue.
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    fn post(&self, event: WorkerEvent) -> HubResult<()> {
        self.sender
            .send(event)
            .map_err(|_| HubError::WorkerStopped {
                worker: self.name.to_string(),
            })
    }

    /// Registers `connection` in this worker's registry.
    pub fn add(&self, connection: Arc<Connection>) -> HubResult<()> {
        self.post(WorkerEvent::Join(connection))
    }

    /// Removes the connection with `conn_id` from the registry.
    pub fn delete(&self, conn_id: &str) -> HubResult<()> {
        self.post(WorkerEvent::Leave(conn_id.to_string()))
    }

    /// Fans `message` out to every registered connection.
    pub fn receive(&self, message: Arc<Message>) -> HubResult<()> {
        self.post(WorkerEvent::Receive(message))
    }

    /// Reports the outcome of a deferred (debounced) transmission.
    pub fn notify_send_result(
        &self,
        conn_id: &str,
        result: Result<(), TransportError>,
    ) -> HubResult<()> {
        self.post(WorkerEvent::SendResult {
            conn_id: conn_id.to_string(),
            result,
        })
    }

    /// Schedules loop termination after the already queued events.
    pub fn finish(&self) -> HubResult<()> {
        self.post(WorkerEvent::Shutdown)
    }
}

/// Single-writer owner of one population's registry.
pub struct Worker {
    name: Arc<str>,
    pub(crate) receiver: UnboundedReceiver<WorkerEvent>,
    registry: ConnectionRegistry,
}

impl Worker {
    /// Creates a worker in the `created` state together with its handle.
    pub fn new(name: &str) -> (Self, WorkerHandle) {
        let name: Arc<str> = Arc::from(name);
        let (sender, receiver) = mpsc::unbounded_channel();

        let worker = Self {
            name: name.clone(),
            receiver,
            registry: ConnectionRegistry::new(),
        };
        (worker, WorkerHandle { name, sender })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Processes events one at a time until [`WorkerHandle::finish`] or until
    /// every handle is dropped. Events still queued behind the shutdown are
    /// discarded with the queue.
    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            match event {
                WorkerEvent::Join(connection) => self.join(connection),
                WorkerEvent::Leave(conn_id) => self.leave(&conn_id),
                WorkerEvent::Receive(message) => self.fan_out(message).await,
                WorkerEvent::SendResult { conn_id, result } => {
                    self.deferred_send_result(&conn_id, result)
                }
                WorkerEvent::Shutdown => break,
            }
        }

        self.receiver.close();
        info!(
            event = events::WORKER_STOPPED,
            component = COMPONENT,
            worker = &*self.name,
            count = self.registry.len(),
            "worker stopped"
        );
    }

    fn join(&mut self, connection: Arc<Connection>) {
        let conn_id = connection.id().to_string();
        self.registry.insert(connection);

        info!(
            event = events::WORKER_JOIN,
            component = COMPONENT,
            worker = &*self.name,
            conn_id = conn_id.as_str(),
            count = self.registry.len(),
            "connection joined"
        );
    }

    fn leave(&mut self, conn_id: &str) {
        let removed = self.registry.remove(conn_id).is_some();

        info!(
            event = events::WORKER_LEAVE,
            component = COMPONENT,
            worker = &*self.name,
            conn_id,
            removed,
            count = self.registry.len(),
            "connection left"
        );
    }

    async fn fan_out(&mut self, message: Arc<Message>) {
        if tracing::enabled!(Level::DEBUG) {
            debug!(
                event = events::WORKER_RECEIVE,
                component = COMPONENT,
                worker = &*self.name,
                count = self.registry.len(),
                batch = message.is_batch(),
                batch_len = message.decoded().len(),
                payload = fields::format_message_preview(&message).as_str(),
                "routing message"
            );
        }

        for connection in self.registry.snapshot() {
            match connection.send(Arc::clone(&message)).await {
                Ok(SendOutcome::Sent) => {
                    debug!(
                        event = events::WORKER_SEND_OK,
                        component = COMPONENT,
                        worker = &*self.name,
                        conn_id = connection.id(),
                        "message sent"
                    );
                }
                Ok(outcome @ (SendOutcome::Filtered | SendOutcome::Deferred)) => {
                    debug!(
                        event = events::WORKER_SEND_SKIPPED,
                        component = COMPONENT,
                        worker = &*self.name,
                        conn_id = connection.id(),
                        reason = ?outcome,
                        "message not sent now"
                    );
                }
                Err(err) => {
                    warn!(
                        event = events::WORKER_SEND_FAILED,
                        component = COMPONENT,
                        worker = &*self.name,
                        conn_id = connection.id(),
                        err = %err,
                        "failed to send message"
                    );
                }
            }
        }
    }

    fn deferred_send_result(&self, conn_id: &str, result: Result<(), TransportError>) {
        match result {
            Ok(()) => debug!(
                event = events::WORKER_DEFERRED_SEND_OK,
                component = COMPONENT,
                worker = &*self.name,
                conn_id,
                "debounced message sent"
            ),
            Err(err) => warn!(
                event = events::WORKER_DEFERRED_SEND_FAILED,
                component = COMPONENT,
                worker = &*self.name,
                conn_id,
                err = %err,
                "failed to send debounced message"
            ),
        }
    }
}
