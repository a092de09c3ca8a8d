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

//! WebSocket accept loop for one population.
//!
//! The handshake callback reads the session parameters from the request query
//! and checks the `Origin` host against the population's allow pattern before
//! the upgrade is answered. Refused handshakes get a 400 or 403 with the error
//! text as body.

use super::{Transport, WsTransport};
use crate::connection::Connection;
use crate::error::{HubError, HubResult};
use crate::filter::FilterClause;
use crate::observability::{events, fields};
use crate::worker::WorkerHandle;
use regex::Regex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, StatusCode};
use tracing::{debug, info, warn};
use uuid::Uuid;

const COMPONENT: &str = "listener";

/// Query parameter carrying the filter clause JSON.
pub const FILTER_PARAM: &str = "filter";
/// Query parameter carrying the debounce interval in milliseconds.
pub const DEBOUNCE_PARAM: &str = "debounce";

/// Per-session parameters taken from the handshake query.
#[derive(Clone, Debug)]
pub struct SessionParams {
    pub filter: FilterClause,
    pub debounce: Duration,
}

impl SessionParams {
    /// Parses `filter` and `debounce` from a raw query string.
    ///
    /// Missing or empty parameters fall back to match-all and no debounce.
    pub fn from_query(query: Option<&str>) -> HubResult<Self> {
        let mut filter_source = String::new();
        let mut debounce_source = String::new();

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                FILTER_PARAM => filter_source = value.into_owned(),
                DEBOUNCE_PARAM => debounce_source = value.into_owned(),
                _ => {}
            }
        }

        let filter = FilterClause::parse(&filter_source)?;
        let debounce = if debounce_source.is_empty() {
            Duration::ZERO
        } else {
            let millis: u64 =
                debounce_source
                    .parse()
                    .map_err(|source| HubError::InvalidDebounce {
                        value: debounce_source.clone(),
                        source,
                    })?;
            Duration::from_millis(millis)
        };

        Ok(Self { filter, debounce })
    }
}

/// Routing wiring and admission policy of one population.
#[derive(Clone, Debug)]
pub struct Population {
    pub name: String,
    pub owning: WorkerHandle,
    pub target: WorkerHandle,
    allow: Regex,
}

impl Population {
    /// `allow` is matched against the whole `host:port` of the `Origin`
    /// header, with the scheme's default port filled in when omitted.
    pub fn new(
        name: impl Into<String>,
        owning: WorkerHandle,
        target: WorkerHandle,
        allow: &str,
    ) -> HubResult<Self> {
        let allow = Regex::new(&format!("^(?:{allow})$")).map_err(|source| {
            HubError::InvalidRegex {
                key: "allow".to_string(),
                source,
            }
        })?;

        Ok(Self {
            name: name.into(),
            owning,
            target,
            allow,
        })
    }

    /// Requests without an `Origin` header come from local tools and pass.
    pub fn allows_origin(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };

        let Ok(parsed) = url::Url::parse(origin) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = match parsed.port_or_known_default() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        self.allow.is_match(&host)
    }
}

enum Refusal {
    BadRequest(HubError),
    Forbidden(String),
}

impl Refusal {
    fn into_response(self) -> ErrorResponse {
        let (status, body) = match self {
            Refusal::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Refusal::Forbidden(origin) => (
                StatusCode::FORBIDDEN,
                format!("origin not allowed: {origin}"),
            ),
        };

        let mut response = ErrorResponse::new(Some(body));
        *response.status_mut() = status;
        response
    }
}

fn admit(population: &Population, request: &Request) -> Result<SessionParams, Refusal> {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .map(|value| value.to_str().unwrap_or_default());

    if !population.allows_origin(origin) {
        return Err(Refusal::Forbidden(origin.unwrap_or_default().to_string()));
    }

    SessionParams::from_query(request.uri().query()).map_err(Refusal::BadRequest)
}

/// Bound TCP listener, served for one population.
pub struct Listener {
    tcp: TcpListener,
}

impl Listener {
    pub async fn bind(addr: SocketAddr) -> HubResult<Self> {
        let tcp = TcpListener::bind(addr).await?;
        Ok(Self { tcp })
    }

    pub fn local_addr(&self) -> HubResult<SocketAddr> {
        Ok(self.tcp.local_addr()?)
    }

    /// Accepts sessions until `shutdown` flips to `true` or its sender is
    /// dropped. Sessions still running at that point are aborted.
    pub async fn serve(self, population: Population, mut shutdown: watch::Receiver<bool>) {
        let population = Arc::new(population);
        info!(
            event = events::LISTENER_STARTED,
            component = COMPONENT,
            worker = population.name.as_str(),
            addr = %fields::format_optional(self.tcp.local_addr().ok()),
            "listening"
        );

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.tcp.accept() => match accepted {
                    Ok((stream, peer)) => {
                        sessions.spawn(handle_session(stream, peer, Arc::clone(&population)));
                    }
                    Err(err) => {
                        warn!(
                            event = events::LISTENER_ACCEPT_FAILED,
                            component = COMPONENT,
                            worker = population.name.as_str(),
                            err = %err,
                            "failed to accept connection"
                        );
                    }
                },
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        sessions.shutdown().await;
        info!(
            event = events::LISTENER_STOPPED,
            component = COMPONENT,
            worker = population.name.as_str(),
            "listener stopped"
        );
    }
}

async fn handle_session(stream: TcpStream, peer: SocketAddr, population: Arc<Population>) {
    let mut params = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match admit(&population, request) {
            Ok(admitted) => {
                params = Some(admitted);
                Ok(response)
            }
            Err(refusal) => {
                let refused = refusal.into_response();
                warn!(
                    event = events::SESSION_REFUSED,
                    component = COMPONENT,
                    worker = population.name.as_str(),
                    peer = %peer,
                    status = refused.status().as_u16(),
                    err = refused.body().as_deref().unwrap_or_default(),
                    "session refused"
                );
                Err(refused)
            }
        }
    };

    let socket = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(socket) => socket,
        Err(err) => {
            debug!(
                event = events::SESSION_HANDSHAKE_FAILED,
                component = COMPONENT,
                worker = population.name.as_str(),
                peer = %peer,
                err = %err,
                "websocket handshake failed"
            );
            return;
        }
    };
    let Some(params) = params else {
        return;
    };

    let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(socket));
    let connection = Arc::new(Connection::new(
        Uuid::new_v4().to_string(),
        transport,
        params.filter,
        params.debounce,
        population.owning.clone(),
        population.target.clone(),
    ));

    debug!(
        event = events::SESSION_OPENED,
        component = COMPONENT,
        worker = population.name.as_str(),
        conn_id = connection.id(),
        peer = %peer,
        debounce_ms = params.debounce.as_millis() as u64,
        "session opened"
    );

    if let Err(err) = connection.listen().await {
        warn!(
            event = events::SESSION_ERROR,
            component = COMPONENT,
            worker = population.name.as_str(),
            conn_id = connection.id(),
            err = %err,
            "session ended with error"
        );
    }

    if let Err(err) = connection.close().await {
        debug!(
            event = events::SESSION_ERROR,
            component = COMPONENT,
            worker = population.name.as_str(),
            conn_id = connection.id(),
            err = %err,
            "failed to close session"
        );
    }

    debug!(
        event = events::SESSION_CLOSED,
        component = COMPONENT,
        worker = population.name.as_str(),
        conn_id = connection.id(),
        "session closed"
    );
}

#[cfg(test)]
mod tests {
    use super::{Population, SessionParams};
    use crate::error::HubError;
    use crate::worker::Worker;
    use std::time::Duration;

    fn population(allow: &str) -> Population {
        let (_inside, inside) = Worker::new("inside");
        let (_outside, outside) = Worker::new("outside");
        Population::new("outside", outside, inside, allow).expect("valid allow pattern")
    }

    #[test]
    fn missing_query_means_match_all_without_debounce() {
        let params = SessionParams::from_query(None).expect("defaults");

        assert!(params.filter.filters().is_empty());
        assert_eq!(params.debounce, Duration::ZERO);
    }

    #[test]
    fn query_values_are_url_decoded() {
        let params = SessionParams::from_query(Some(
            "filter=%7B%22filters%22%3A%5B%7B%22map%22%3A%7B%22id%22%3A%221%22%7D%7D%5D%7D&debounce=250",
        ))
        .expect("valid params");

        assert_eq!(params.filter.filters().len(), 1);
        assert_eq!(params.debounce, Duration::from_millis(250));
    }

    #[test]
    fn malformed_parameters_are_rejected() {
        assert!(matches!(
            SessionParams::from_query(Some("filter=%7B")),
            Err(HubError::FilterParse(_))
        ));
        assert!(matches!(
            SessionParams::from_query(Some("debounce=soon")),
            Err(HubError::InvalidDebounce { .. })
        ));
        assert!(matches!(
            SessionParams::from_query(Some("debounce=-1")),
            Err(HubError::InvalidDebounce { .. })
        ));
    }

    #[test]
    fn origin_must_fully_match_allow_pattern() {
        let population = population("localhost:8001");

        assert!(population.allows_origin(None));
        assert!(population.allows_origin(Some("http://localhost:8001")));
        assert!(!population.allows_origin(Some("http://localhost:80011")));
        assert!(!population.allows_origin(Some("http://evil.example")));
        assert!(!population.allows_origin(Some("null")));
    }

    #[test]
    fn allow_pattern_may_be_a_regex() {
        let population = population(r"(localhost|127\.0\.0\.1):\d+");

        assert!(population.allows_origin(Some("http://127.0.0.1:3000")));
        assert!(population.allows_origin(Some("https://localhost")));
        assert!(!population.allows_origin(Some("http://example.com:3000")));
    }

    #[test]
    fn default_scheme_port_is_part_of_the_origin_host() {
        let population = population("localhost:80");

        assert!(population.allows_origin(Some("http://localhost:80")));
        assert!(population.allows_origin(Some("http://localhost")));
        assert!(!population.allows_origin(Some("https://localhost")));
    }

    #[test]
    fn invalid_allow_pattern_is_rejected() {
        let (_inside, inside) = Worker::new("inside");
        let (_outside, outside) = Worker::new("outside");

        assert!(matches!(
            Population::new("outside", outside, inside, "("),
            Err(HubError::InvalidRegex { .. })
        ));
    }
}
