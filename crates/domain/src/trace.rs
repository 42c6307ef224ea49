use serde::Serialize;

/// Structured trace events emitted across all papiea crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    EngineCall {
        method: String,
        url: String,
        status: u16,
        duration_ms: u64,
    },
    SessionRenewed {
        base_url: String,
        renewals: u64,
    },
    ProviderRegistered {
        prefix: String,
        version: String,
        kinds: usize,
        procedures: usize,
    },
    CallbackInvoked {
        route: String,
        status: u16,
        duration_ms: u64,
    },
    WatcherPolled {
        uuid: String,
        status: String,
        attempt: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "papiea_event");
    }
}
