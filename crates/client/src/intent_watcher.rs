//! Read access to the engine's intent watchers, plus a bounded wait.

use std::sync::Arc;
use std::time::{Duration, Instant};

use papiea_domain::error::{Error, Result};
use papiea_domain::model::{FilterResults, IntentWatcher, IntentfulStatus};
use papiea_domain::trace::TraceEvent;
use serde_json::Value;
use tracing::Instrument;

use crate::pagination::FilterIter;
use crate::transport::{required, ApiInstance};
use crate::ClientOptions;

#[derive(Debug, Clone)]
pub struct IntentWatcherClient {
    api: Arc<ApiInstance>,
    batch_size: u64,
}

impl IntentWatcherClient {
    pub fn new(opts: &ClientOptions) -> Result<Self> {
        let api = opts.api("/services/intent_watcher")?;
        Ok(Self {
            api: Arc::new(api),
            batch_size: opts.batch_size,
        })
    }

    pub fn api(&self) -> &Arc<ApiInstance> {
        &self.api
    }

    pub async fn get(&self, uuid: &str) -> Result<IntentWatcher> {
        required(self.api.get(uuid).await?, "get intent watcher")
    }

    /// First page of all watchers visible to the caller.
    pub async fn list(&self) -> Result<FilterResults<IntentWatcher>> {
        let page: Option<FilterResults<IntentWatcher>> = self.api.get("").await?;
        Ok(page.unwrap_or_default())
    }

    /// One page of watchers matching `criteria` (`entity_ref`, `status`,
    /// `created_at`).
    pub async fn filter(&self, criteria: &Value) -> Result<FilterResults<IntentWatcher>> {
        let page: Option<FilterResults<IntentWatcher>> = self.api.post("filter", criteria).await?;
        Ok(page.unwrap_or_default())
    }

    pub fn filter_iter(&self, criteria: Value) -> FilterIter<IntentWatcher> {
        FilterIter::new(self.api.clone(), "filter", criteria, self.batch_size)
    }

    /// Poll the watcher every `poll_interval` until its status equals
    /// `target`, and return that snapshot.
    ///
    /// Fails with [`Error::Timeout`] once more than `timeout` has elapsed.
    /// Engine errors while polling end the wait immediately. Dropping the
    /// future between polls cancels the wait.
    pub async fn wait_for_status(
        &self,
        uuid: &str,
        target: IntentfulStatus,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<IntentWatcher> {
        let start = Instant::now();
        let mut attempt: u32 = 0;

        async {
            loop {
                attempt += 1;
                let watcher = self.get(uuid).await?;

                TraceEvent::WatcherPolled {
                    uuid: uuid.to_owned(),
                    status: watcher.status.as_str().to_owned(),
                    attempt,
                }
                .emit();

                if watcher.status == target {
                    return Ok(watcher);
                }
                if start.elapsed() > timeout {
                    return Err(Error::Timeout(format!(
                        "intent watcher {uuid} did not reach '{}' within {}s (last status '{}')",
                        target.as_str(),
                        timeout.as_secs_f64(),
                        watcher.status.as_str()
                    )));
                }
                tokio::time::sleep(poll_interval).await;
            }
        }
        .instrument(self.api.span().clone())
        .await
    }
}
