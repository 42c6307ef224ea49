//! Offset/limit cursor over a filter route.
//!
//! The cursor advances its offset by the batch size after every non-empty
//! page, whatever the page length. Only an empty page ends the sequence,
//! so a listing of N entries costs `ceil(N / batch) + 1` round trips.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::Stream;
use papiea_domain::error::Result;
use papiea_domain::model::FilterResults;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::transport::{required, ApiInstance};

pub struct FilterIter<T> {
    api: Arc<ApiInstance>,
    route: String,
    criteria: Value,
    batch_size: u64,
    offset: u64,
    buffer: VecDeque<T>,
    done: bool,
    pages_fetched: u64,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> FilterIter<T> {
    /// A fresh cursor always starts at offset 0.
    pub fn new(api: Arc<ApiInstance>, route: impl Into<String>, criteria: Value, batch_size: u64) -> Self {
        Self {
            api,
            route: route.into(),
            criteria,
            batch_size: batch_size.max(1),
            offset: 0,
            buffer: VecDeque::new(),
            done: false,
            pages_fetched: 0,
            _item: PhantomData,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// False once the empty page was seen and the buffer is drained.
    pub fn has_more(&self) -> bool {
        !self.buffer.is_empty() || !self.done
    }

    /// Fetch the next page. `Ok(None)` once the engine returned an empty one.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.done {
            return Ok(None);
        }

        let path = format!(
            "{}?limit={}&offset={}",
            self.route, self.batch_size, self.offset
        );
        let page: FilterResults<T> = required(self.api.post(&path, &self.criteria).await?, "filter")?;
        self.pages_fetched += 1;

        if page.results.is_empty() {
            self.done = true;
            return Ok(None);
        }
        self.offset += self.batch_size;
        Ok(Some(page.results))
    }

    /// Next single item, fetching pages as needed.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            match self.next_page().await? {
                Some(page) => self.buffer.extend(page),
                None => return Ok(None),
            }
        }
    }

    /// Drain everything into memory.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await? {
            out.push(item);
        }
        Ok(out)
    }

    /// Adapt into a `Stream`. An error ends the stream after it is yielded.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures_util::stream::unfold(self, |mut it| async move {
            match it.next().await {
                Ok(Some(item)) => Some((Ok(item), it)),
                Ok(None) => None,
                Err(e) => {
                    it.done = true;
                    it.buffer.clear();
                    Some((Err(e), it))
                }
            }
        })
    }
}
