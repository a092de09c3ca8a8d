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

//! # wsxhub
//!
//! `wsxhub` relays JSON messages between two populations of WebSocket
//! clients: short-lived local automation clients on the *inside* listener and
//! long-lived tools or editors on the *outside* listener. A message published
//! by one side is forwarded to every subscriber of the other side whose
//! filter clause matches it.
//!
//! Typical usage starts a [`Hub`] and connects [`HubClient`]s to it:
//!
//! ```no_run
//! use wsxhub::{ClientOptions, Hub, HubClient, HubConfig, Message};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let hub = Hub::start(HubConfig::default()).await.unwrap();
//!
//! let subscriber = HubClient::connect(
//!     hub.outside_addr().port(),
//!     &ClientOptions {
//!         filter: r#"{"filters": [{"map": {"method": "open"}}]}"#.to_string(),
//!         ..Default::default()
//!     },
//! )
//! .await
//! .unwrap();
//! let publisher = HubClient::connect(hub.inside_addr().port(), &ClientOptions::default())
//!     .await
//!     .unwrap();
//!
//! publisher
//!     .send(&Message::from_bytes(r#"{"method": "open", "path": "/tmp/a"}"#).unwrap())
//!     .await
//!     .unwrap();
//! let payload = subscriber.receive_once(None).await.unwrap();
//! assert_eq!(payload, br#"{"method": "open", "path": "/tmp/a"}"#);
//!
//! hub.shutdown();
//! hub.wait().await;
//! # });
//! ```
//!
//! Filter clauses can also be evaluated directly:
//!
//! ```
//! use wsxhub::{FilterClause, Message};
//!
//! let clause = FilterClause::parse(
//!     r#"{"operator": "and", "batchOperator": "and", "filters": [
//!         {"map": {"id": "1"}},
//!         {"map": {"key1": "hoge"}}
//!     ]}"#,
//! )
//! .unwrap();
//!
//! let all = Message::from_bytes(
//!     r#"[{"id":"1","key1":"hoge"},{"id":"1","key1":"hoge","key2":"foo"}]"#,
//! )
//! .unwrap();
//! let partial =
//!     Message::from_bytes(r#"[{"id":"1","key1":"hoge"},{"id":"2","key1":"hoge"}]"#).unwrap();
//!
//! assert!(clause.matches(&all));
//! assert!(!clause.matches(&partial));
//! ```
//!
//! ## Internal architecture map
//!
//! - Message and filter engine: decoding and pure predicate evaluation
//! - Connection: per-session filter, debounce timer and send path
//! - Worker: single-writer loop owning one population's registry
//! - Transport: session trait, WebSocket adapter and accept loop
//! - Hub and client: composition root and the client used by the CLI
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits structured events (see [`observability::events`]) and
//! never initializes a global subscriber. Binaries and tests install
//! `tracing_subscriber` once at process boundaries.

mod client;
pub use client::{session_url, ClientOptions, HubClient};

mod connection;
pub use connection::{Connection, SendOutcome, DEFAULT_WRITE_TIMEOUT};

pub mod error;
pub use error::{HubError, HubResult, TransportError, TransportErrorKind};

pub mod filter;
pub use filter::{Filter, FilterClause, MatchType, OperatorType};

mod hub;
pub use hub::{
    Hub, HubConfig, DEFAULT_INSIDE_PORT, DEFAULT_OUTSIDE_ALLOW, DEFAULT_OUTSIDE_PORT, INSIDE,
    OUTSIDE,
};

mod message;
pub use message::{JsonObject, Message};

#[doc(hidden)]
pub mod observability;

pub mod transport;
pub use transport::Transport;

mod worker;
pub use worker::{Worker, WorkerHandle};
