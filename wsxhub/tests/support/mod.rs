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

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use wsxhub::{
    Connection, FilterClause, Transport, TransportError, Worker, WorkerHandle,
};

/// In-memory session: scripted inbound payloads, recorded outbound payloads.
pub(crate) struct MemoryTransport {
    inbound: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    inbound_sender: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    sent: Mutex<Vec<Vec<u8>>>,
    sent_notify: Notify,
}

impl MemoryTransport {
    pub(crate) fn new() -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            inbound: AsyncMutex::new(receiver),
            inbound_sender: Mutex::new(Some(sender)),
            sent: Mutex::new(Vec::new()),
            sent_notify: Notify::new(),
        })
    }

    /// Queues a payload as if the peer had written it.
    pub(crate) fn push_inbound(&self, payload: &str) {
        if let Some(sender) = self.inbound_sender.lock().expect("sender lock").as_ref() {
            sender
                .send(payload.as_bytes().to_vec())
                .expect("inbound queue open");
        }
    }

    /// Ends the inbound stream after the queued payloads.
    pub(crate) fn hang_up(&self) {
        self.inbound_sender.lock().expect("sender lock").take();
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .map(|payload| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }

    /// Waits until at least `count` payloads were sent or `limit` elapses.
    pub(crate) async fn wait_for_sent(&self, count: usize, limit: Duration) -> Vec<String> {
        let _ = tokio::time::timeout(limit, async {
            loop {
                let notified = self.sent_notify.notified();
                if self.sent.lock().expect("sent lock").len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.sent()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.sent.lock().expect("sent lock").push(payload.to_vec());
        self.sent_notify.notify_waiters();
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<u8>, TransportError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(TransportError::end_of_stream)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.hang_up();
        Ok(())
    }
}

/// Both workers of a hub, already running, wired as each other's target.
pub(crate) struct WorkerPair {
    pub(crate) inside: WorkerHandle,
    pub(crate) outside: WorkerHandle,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPair {
    pub(crate) fn start() -> Self {
        let (inside_worker, inside) = Worker::new(wsxhub::INSIDE);
        let (outside_worker, outside) = Worker::new(wsxhub::OUTSIDE);
        let tasks = vec![
            tokio::spawn(inside_worker.run()),
            tokio::spawn(outside_worker.run()),
        ];

        Self {
            inside,
            outside,
            tasks,
        }
    }

    pub(crate) async fn stop(self) {
        self.inside.finish().expect("inside worker running");
        self.outside.finish().expect("outside worker running");
        for task in self.tasks {
            task.await.expect("worker task should not panic");
        }
    }
}

pub(crate) fn connection(
    id: &str,
    transport: Arc<MemoryTransport>,
    filter: &str,
    debounce: Duration,
    owning: &WorkerHandle,
    target: &WorkerHandle,
) -> Arc<Connection> {
    Arc::new(Connection::new(
        id,
        transport,
        FilterClause::parse(filter).expect("test filter should parse"),
        debounce,
        owning.clone(),
        target.clone(),
    ))
}

#[allow(dead_code)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
