//! `papiea-testkit`: in-process stand-ins for the papiea engine.
//!
//! [`MockEngine`] serves the engine REST routes the SDK consumes from
//! memory: provider registration, entity CRUD with `spec_version` checks,
//! paginated filters, procedure forwarding to registered callbacks, the
//! security routes and scripted intent watchers. [`FlakyProxy`] drops its
//! first connections to exercise session renewal.

pub mod engine;
pub mod proxy;

pub use engine::{MockEngine, RecordedRequest, ADMIN_KEY};
pub use proxy::FlakyProxy;

/// Reserve a free local port. The listener is dropped before returning, so
/// the port is only very likely (not guaranteed) to still be free.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .unwrap_or(0)
}
