//! Canonical structured event names used across `wsxhub`.

// Worker loop events.
pub const WORKER_JOIN: &str = "worker_join";
pub const WORKER_LEAVE: &str = "worker_leave";
pub const WORKER_RECEIVE: &str = "worker_receive";
pub const WORKER_SEND_OK: &str = "worker_send_ok";
pub const WORKER_SEND_SKIPPED: &str = "worker_send_skipped";
pub const WORKER_SEND_FAILED: &str = "worker_send_failed";
pub const WORKER_DEFERRED_SEND_OK: &str = "worker_deferred_send_ok";
pub const WORKER_DEFERRED_SEND_FAILED: &str = "worker_deferred_send_failed";
pub const WORKER_STOPPED: &str = "worker_stopped";

// Connection events.
pub const CONNECTION_DEBOUNCE_ARMED: &str = "connection_debounce_armed";
pub const CONNECTION_DECODE_FAILED: &str = "connection_decode_failed";
pub const CONNECTION_CLOSE_FAILED: &str = "connection_close_failed";

// Listener and session lifecycle events.
pub const LISTENER_STARTED: &str = "listener_started";
pub const LISTENER_ACCEPT_FAILED: &str = "listener_accept_failed";
pub const LISTENER_STOPPED: &str = "listener_stopped";
pub const SESSION_REFUSED: &str = "session_refused";
pub const SESSION_HANDSHAKE_FAILED: &str = "session_handshake_failed";
pub const SESSION_OPENED: &str = "session_opened";
pub const SESSION_CLOSED: &str = "session_closed";
pub const SESSION_ERROR: &str = "session_error";

// Hub lifecycle events.
pub const HUB_STARTED: &str = "hub_started";
pub const HUB_SHUTDOWN: &str = "hub_shutdown";
pub const HUB_TASK_FAILED: &str = "hub_task_failed";
