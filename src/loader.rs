//! Background region loads with last-request-wins.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use crate::error::LoadError;
use crate::store::{RowSet, RowStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

/// Result of one background read, sent back to the event loop.
#[derive(Debug)]
pub struct LoadOutcome {
    pub request: RequestId,
    pub region: String,
    pub result: Result<RowSet, LoadError>,
}

#[derive(Debug)]
pub enum LoadRequest {
    /// Served from the row store cache; nothing was spawned.
    Cached(Arc<RowSet>),
    Pending(RequestId),
}

/// Tracks the latest load request. Outcomes of older requests are dropped.
#[derive(Debug, Default)]
pub struct RegionLoader {
    next_id: u64,
    pending: Option<(RequestId, String)>,
}

impl RegionLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&mut self, region: &str) -> RequestId {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        self.pending = Some((id, region.to_string()));
        id
    }

    /// Starts loading `region`. Unknown regions fail immediately. A cache hit
    /// still supersedes any load in flight.
    pub fn request<E>(
        &mut self,
        store: &RowStore,
        region: &str,
        tx: &Sender<E>,
    ) -> Result<LoadRequest, LoadError>
    where
        E: From<LoadOutcome> + Send + 'static,
    {
        let prepared = match store.prepare(region) {
            Ok(prepared) => prepared,
            Err(e) => {
                // Still the latest request, so anything in flight is stale.
                self.pending = None;
                return Err(e);
            }
        };
        if let Some(set) = store.cached(region) {
            self.pending = None;
            return Ok(LoadRequest::Cached(set));
        }
        let request = self.issue(region);
        let tx = tx.clone();
        tracing::debug!(region, ?request, "spawning region load");
        thread::spawn(move || {
            let region = prepared.region().to_string();
            let result = prepared.run();
            // The receiver is gone when the app is shutting down.
            let _ = tx.send(E::from(LoadOutcome {
                request,
                region,
                result,
            }));
        });
        Ok(LoadRequest::Pending(request))
    }

    /// Returns the outcome if it answers the latest request, `None` if stale.
    pub fn accept(&mut self, outcome: LoadOutcome) -> Option<LoadOutcome> {
        match &self.pending {
            Some((id, _)) if *id == outcome.request => {
                self.pending = None;
                Some(outcome)
            }
            _ => {
                tracing::debug!(
                    region = %outcome.region,
                    request = ?outcome.request,
                    "discarding stale region load"
                );
                None
            }
        }
    }

    pub fn pending_region(&self) -> Option<&str> {
        self.pending.as_ref().map(|(_, region)| region.as_str())
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }
}
