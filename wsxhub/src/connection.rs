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

//! Per-session connection: identity, filter, debounce and send logic.

use crate::error::{HubResult, TransportError};
use crate::filter::FilterClause;
use crate::message::Message;
use crate::observability::events;
use crate::transport::Transport;
use crate::worker::WorkerHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

const COMPONENT: &str = "connection";

/// Longest a single outbound write may take before it fails with a timeout.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of offering a message to one connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    /// The filter rejected the message.
    Filtered,
    /// The message was transmitted immediately.
    Sent,
    /// A debounce timer was (re)armed; the outcome is reported to the owning
    /// worker when it fires.
    Deferred,
}

#[derive(Default)]
struct DebounceState {
    generation: u64,
    pending: Option<JoinHandle<()>>,
    closed: bool,
}

fn lock(state: &Mutex<DebounceState>) -> MutexGuard<'_, DebounceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn transmit(
    transport: &dyn Transport,
    payload: &[u8],
    write_timeout: Duration,
) -> Result<(), TransportError> {
    tokio::time::timeout(write_timeout, transport.send(payload))
        .await
        .unwrap_or_else(|_| Err(TransportError::write_timeout()))
}

/// One client session registered with its owning worker.
///
/// Inbound payloads go to `target`; sends requested by `owning` pass through
/// the filter and, when `debounce` is non-zero, through a last-write-wins
/// timer owned by this connection. Every write is bounded by the write
/// timeout, so a peer that stops reading fails its sends instead of holding
/// up the owning worker.
pub struct Connection {
    id: String,
    transport: Arc<dyn Transport>,
    filter: FilterClause,
    debounce: Duration,
    write_timeout: Duration,
    owning: WorkerHandle,
    target: WorkerHandle,
    debounce_state: Arc<Mutex<DebounceState>>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(
        id: impl Into<String>,
        transport: Arc<dyn Transport>,
        filter: FilterClause,
        debounce: Duration,
        owning: WorkerHandle,
        target: WorkerHandle,
    ) -> Self {
        Self {
            id: id.into(),
            transport,
            filter,
            debounce,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            owning,
            target,
            debounce_state: Arc::new(Mutex::new(DebounceState::default())),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filter(&self) -> &FilterClause {
        &self.filter
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Offers `message` to this connection.
    ///
    /// # Errors
    ///
    /// Only an immediate transmission can fail, including with a timeout
    /// error when the write outlasts the write timeout. Deferred failures are
    /// reported to the owning worker instead.
    pub async fn send(&self, message: Arc<Message>) -> Result<SendOutcome, TransportError> {
        if !self.filter.matches(&message) {
            return Ok(SendOutcome::Filtered);
        }

        if self.debounce.is_zero() {
            transmit(self.transport.as_ref(), message.raw(), self.write_timeout).await?;
            return Ok(SendOutcome::Sent);
        }

        self.arm_debounce(message);
        Ok(SendOutcome::Deferred)
    }

    fn arm_debounce(&self, message: Arc<Message>) {
        let mut state = lock(&self.debounce_state);
        if state.closed {
            return;
        }

        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }

        let generation = state.generation;
        let shared = Arc::clone(&self.debounce_state);
        let transport = Arc::clone(&self.transport);
        let owning = self.owning.clone();
        let conn_id = self.id.clone();
        let delay = self.debounce;
        let write_timeout = self.write_timeout;

        debug!(
            event = events::CONNECTION_DEBOUNCE_ARMED,
            component = COMPONENT,
            conn_id = conn_id.as_str(),
            debounce_ms = delay.as_millis() as u64,
            generation,
            "debounce timer armed"
        );

        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut state = lock(&shared);
                if state.closed || state.generation != generation {
                    return;
                }
                state.pending = None;
            }

            let result = transmit(transport.as_ref(), message.raw(), write_timeout).await;
            if let Err(err) = owning.notify_send_result(&conn_id, result) {
                debug!(
                    event = events::WORKER_STOPPED,
                    component = COMPONENT,
                    conn_id = conn_id.as_str(),
                    err = %err,
                    "dropping debounced send result"
                );
            }
        }));
    }

    /// Registers with the owning worker, then forwards every inbound payload
    /// to the target worker until the stream ends.
    ///
    /// # Errors
    ///
    /// Transport errors other than end-of-stream, payloads that do not decode
    /// as a message, and a stopped worker all end the loop with an error.
    pub async fn listen(self: &Arc<Self>) -> HubResult<()> {
        self.owning.add(Arc::clone(self))?;

        loop {
            let payload = match self.transport.receive().await {
                Ok(payload) => payload,
                Err(err) if err.is_end_of_stream() => return Ok(()),
                Err(err) => return Err(err.into()),
            };

            let message = Message::from_bytes(payload).inspect_err(|err| {
                debug!(
                    event = events::CONNECTION_DECODE_FAILED,
                    component = COMPONENT,
                    conn_id = self.id.as_str(),
                    err = %err,
                    "inbound payload is not a message"
                );
            })?;
            self.target.receive(Arc::new(message))?;
        }
    }

    /// Cancels any pending debounce, deregisters from the owning worker and
    /// closes the transport. Later calls do nothing.
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut state = lock(&self.debounce_state);
            state.closed = true;
            if let Some(pending) = state.pending.take() {
                pending.abort();
            }
        }

        if let Err(err) = self.owning.delete(&self.id) {
            debug!(
                event = events::CONNECTION_CLOSE_FAILED,
                component = COMPONENT,
                conn_id = self.id.as_str(),
                err = %err,
                "owning worker already stopped"
            );
        }

        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::{Connection, SendOutcome};
    use crate::error::{HubError, TransportError};
    use crate::filter::FilterClause;
    use crate::message::Message;
    use crate::transport::Transport;
    use crate::worker::{Worker, WorkerEvent};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedTransport {
        sent: Mutex<Vec<Vec<u8>>>,
        inbound: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
        close_count: AtomicUsize,
    }

    impl ScriptedTransport {
        fn with_inbound(inbound: Vec<Result<Vec<u8>, TransportError>>) -> Self {
            Self {
                inbound: Mutex::new(inbound.into()),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().expect("sent lock").clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
            self.sent.lock().expect("sent lock").push(payload.to_vec());
            Ok(())
        }

        async fn receive(&self) -> Result<Vec<u8>, TransportError> {
            self.inbound
                .lock()
                .expect("inbound lock")
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::end_of_stream()))
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.close_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send(&self, _payload: &[u8]) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn receive(&self) -> Result<Vec<u8>, TransportError> {
            std::future::pending().await
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn message(payload: &str) -> Arc<Message> {
        Arc::new(Message::from_bytes(payload).expect("valid message"))
    }

    fn drain(worker: &mut Worker) -> Vec<WorkerEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = worker.receiver.try_recv() {
            drained.push(event);
        }
        drained
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_transmits_only_the_latest_message() {
        let (mut owning, owning_handle) = Worker::new("outside");
        let (_target, target_handle) = Worker::new("inside");
        let transport = Arc::new(ScriptedTransport::default());
        let connection = Connection::new(
            "c1",
            transport.clone(),
            FilterClause::match_all(),
            Duration::from_millis(100),
            owning_handle,
            target_handle,
        );

        let first = connection.send(message(r#"{"n":1}"#)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = connection.send(message(r#"{"n":2}"#)).await;

        assert_eq!(first.expect("first send"), SendOutcome::Deferred);
        assert_eq!(second.expect("second send"), SendOutcome::Deferred);

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(transport.sent().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(transport.sent(), vec![br#"{"n":2}"#.to_vec()]);

        let reported = drain(&mut owning);
        assert_eq!(reported.len(), 1);
        assert!(matches!(
            &reported[0],
            WorkerEvent::SendResult { conn_id, result: Ok(()) } if conn_id == "c1"
        ));
    }

    #[tokio::test]
    async fn zero_debounce_sends_immediately() {
        let (_owning, owning_handle) = Worker::new("outside");
        let (_target, target_handle) = Worker::new("inside");
        let transport = Arc::new(ScriptedTransport::default());
        let connection = Connection::new(
            "c1",
            transport.clone(),
            FilterClause::match_all(),
            Duration::ZERO,
            owning_handle,
            target_handle,
        );

        let outcome = connection.send(message(r#"{"a":1}"#)).await.expect("send");

        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(transport.sent(), vec![br#"{"a":1}"#.to_vec()]);
    }

    #[tokio::test]
    async fn filtered_message_is_dropped_silently() {
        let (_owning, owning_handle) = Worker::new("outside");
        let (_target, target_handle) = Worker::new("inside");
        let transport = Arc::new(ScriptedTransport::default());
        let filter = FilterClause::parse(r#"{"filters": [{"type": "exact", "map": {"a": 1}}]}"#)
            .expect("filter");
        let connection = Connection::new(
            "c1",
            transport.clone(),
            filter,
            Duration::from_millis(50),
            owning_handle,
            target_handle,
        );

        let outcome = connection.send(message(r#"{"a":2}"#)).await.expect("send");

        assert_eq!(outcome, SendOutcome::Filtered);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_pending_debounce() {
        let (_owning, owning_handle) = Worker::new("outside");
        let (_target, target_handle) = Worker::new("inside");
        let transport = Arc::new(ScriptedTransport::default());
        let connection = Connection::new(
            "c1",
            transport.clone(),
            FilterClause::match_all(),
            Duration::from_millis(100),
            owning_handle,
            target_handle,
        );

        connection.send(message(r#"{"n":1}"#)).await.expect("send");
        connection.close().await.expect("close");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn close_twice_deregisters_once() {
        let (mut owning, owning_handle) = Worker::new("outside");
        let (_target, target_handle) = Worker::new("inside");
        let transport = Arc::new(ScriptedTransport::default());
        let connection = Connection::new(
            "c1",
            transport.clone(),
            FilterClause::match_all(),
            Duration::ZERO,
            owning_handle,
            target_handle,
        );

        connection.close().await.expect("first close");
        connection.close().await.expect("second close");

        let events = drain(&mut owning);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], WorkerEvent::Leave(id) if id == "c1"));
        assert_eq!(transport.close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listen_registers_then_forwards_until_end_of_stream() {
        let (mut owning, owning_handle) = Worker::new("inside");
        let (mut target, target_handle) = Worker::new("outside");
        let transport = Arc::new(ScriptedTransport::with_inbound(vec![
            Ok(br#"{"id":"1"}"#.to_vec()),
            Ok(br#"[{"id":"2"},{"id":"3"}]"#.to_vec()),
        ]));
        let connection = Arc::new(Connection::new(
            "c1",
            transport,
            FilterClause::match_all(),
            Duration::ZERO,
            owning_handle,
            target_handle,
        ));

        connection.listen().await.expect("end of stream is not an error");

        let joined = drain(&mut owning);
        assert!(matches!(&joined[..], [WorkerEvent::Join(conn)] if conn.id() == "c1"));

        let forwarded: Vec<usize> = drain(&mut target)
            .into_iter()
            .map(|event| match event {
                WorkerEvent::Receive(message) => message.decoded().len(),
                _ => panic!("unexpected event on target worker"),
            })
            .collect();
        assert_eq!(forwarded, vec![1, 2]);
    }

    #[tokio::test]
    async fn listen_propagates_transport_and_decode_errors() {
        let (_owning, owning_handle) = Worker::new("inside");
        let (_target, target_handle) = Worker::new("outside");

        let broken = Arc::new(Connection::new(
            "broken",
            Arc::new(ScriptedTransport::with_inbound(vec![Err(
                TransportError::other("reset"),
            )])),
            FilterClause::match_all(),
            Duration::ZERO,
            owning_handle.clone(),
            target_handle.clone(),
        ));
        assert!(matches!(
            broken.listen().await,
            Err(HubError::Transport(err)) if !err.is_end_of_stream()
        ));

        let garbled = Arc::new(Connection::new(
            "garbled",
            Arc::new(ScriptedTransport::with_inbound(vec![Ok(b"42".to_vec())])),
            FilterClause::match_all(),
            Duration::ZERO,
            owning_handle,
            target_handle,
        ));
        assert!(matches!(
            garbled.listen().await,
            Err(HubError::MessageShape)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_fails_after_write_timeout() {
        let (_owning, owning_handle) = Worker::new("outside");
        let (_target, target_handle) = Worker::new("inside");
        let connection = Connection::new(
            "c1",
            Arc::new(StalledTransport),
            FilterClause::match_all(),
            Duration::ZERO,
            owning_handle,
            target_handle,
        )
        .with_write_timeout(Duration::from_millis(50));

        let started = tokio::time::Instant::now();
        let err = connection
            .send(message(r#"{"n":1}"#))
            .await
            .expect_err("stalled peer");

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_debounced_write_reports_timeout() {
        let (mut owning, owning_handle) = Worker::new("outside");
        let (_target, target_handle) = Worker::new("inside");
        let connection = Connection::new(
            "c1",
            Arc::new(StalledTransport),
            FilterClause::match_all(),
            Duration::from_millis(100),
            owning_handle,
            target_handle,
        );
        assert_eq!(connection.write_timeout(), super::DEFAULT_WRITE_TIMEOUT);

        let outcome = connection.send(message(r#"{"n":1}"#)).await.expect("send");
        assert_eq!(outcome, SendOutcome::Deferred);

        tokio::time::sleep(Duration::from_millis(100) + super::DEFAULT_WRITE_TIMEOUT).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let reported = drain(&mut owning);
        assert_eq!(reported.len(), 1);
        assert!(matches!(
            &reported[0],
            WorkerEvent::SendResult { conn_id, result: Err(err) }
                if conn_id == "c1" && err.is_timeout()
        ));
    }
}
