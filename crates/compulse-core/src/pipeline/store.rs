use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;

use super::state::{ResolutionState, ResolutionTrace};
use crate::cache::SourceCache;
use crate::network::{FetchResult, ResilientFetcher};
use crate::resolve::{Candidate, CandidateIndex, NormalizedName};
use crate::sources::{CachePolicy, Dataset};

#[derive(Debug)]
struct Loaded {
    index: Arc<CandidateIndex>,
    fetched_at: DateTime<Utc>,
}

impl Loaded {
    fn is_fresh(&self, policy: CachePolicy, now: DateTime<Utc>) -> bool {
        match policy {
            CachePolicy::Persisted { ttl } => now.signed_duration_since(self.fetched_at) < ttl,
            CachePolicy::ProcessLifetime => true,
            CachePolicy::PerQuery => false,
        }
    }
}

type Slot = Arc<AsyncMutex<Option<Loaded>>>;

/// In-process candidate indexes, one slot per dataset.
///
/// A slot's lock is held while it loads, so concurrent resolutions against
/// the same dataset wait for one load instead of each fetching.
#[derive(Debug, Default)]
pub struct IndexStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, dataset_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(dataset_id.to_string()).or_default())
    }

    /// Index for `dataset`, from memory, then the disk cache, then a fetch.
    pub async fn load(
        &self,
        dataset: &dyn Dataset,
        name: &NormalizedName,
        fetcher: &ResilientFetcher,
        cache: &SourceCache,
        trace: &ResolutionTrace,
    ) -> FetchResult<Arc<CandidateIndex>> {
        let policy = dataset.cache_policy();
        if policy == CachePolicy::PerQuery {
            trace.record(ResolutionState::CacheMiss);
            trace.record(ResolutionState::Fetching);
            let candidates = dataset.load_candidates(name, fetcher).await?;
            return Ok(Arc::new(CandidateIndex::new(candidates)));
        }

        let slot = self.slot(dataset.id());
        let mut loaded = slot.lock().await;
        let now = Utc::now();

        if let Some(ref current) = *loaded {
            if current.is_fresh(policy, now) {
                tracing::debug!("{}: using in-memory index", dataset.id());
                trace.record(ResolutionState::CacheHit);
                return Ok(Arc::clone(&current.index));
            }
        }

        if let CachePolicy::Persisted { ttl } = policy {
            if let Some(entry) = cache
                .get_entry_at::<Vec<Candidate>>(dataset.id(), ttl, now)
                .await
            {
                trace.record(ResolutionState::CacheHit);
                let index = Arc::new(CandidateIndex::new(entry.payload));
                *loaded = Some(Loaded {
                    index: Arc::clone(&index),
                    fetched_at: entry.fetched_at,
                });
                return Ok(index);
            }
        }

        trace.record(ResolutionState::CacheMiss);
        trace.record(ResolutionState::Fetching);
        let candidates = dataset.load_candidates(name, fetcher).await?;
        let fetched_at = Utc::now();

        if matches!(policy, CachePolicy::Persisted { .. }) {
            if let Err(e) = cache
                .put_fetched_at(dataset.id(), &candidates, fetched_at)
                .await
            {
                tracing::warn!("Could not cache {}: {}", dataset.id(), e);
            }
        }

        let index = Arc::new(CandidateIndex::new(candidates));
        tracing::debug!("{}: indexed {} candidates", dataset.id(), index.len());
        *loaded = Some(Loaded {
            index: Arc::clone(&index),
            fetched_at,
        });
        Ok(index)
    }

    /// Drop the in-memory index for one dataset.
    pub async fn evict(&self, dataset_id: &str) {
        let slot = self.slot(dataset_id);
        *slot.lock().await = None;
    }
}
