use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cancel::CancelToken;
use super::report::{AggregateReport, DatasetResolution};
use super::state::{ResolutionState, ResolutionTrace};
use super::store::IndexStore;
use crate::cache::SourceCache;
use crate::config::Config;
use crate::network::{ResilientFetcher, RetryPolicy};
use crate::resolve::{normalize, NormalizedName, ResolutionGate, ResolutionOutcome};
use crate::sources::DatasetRef;
use crate::Result;

const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(60);

/// Fans a name out to every dataset and assembles the results.
///
/// Each dataset resolves in its own task. A dataset that fails, times out
/// or is cancelled becomes a `SourceUnavailable` outcome; it never aborts
/// its siblings or the report.
#[derive(Debug, Clone)]
pub struct Aggregator {
    cache: SourceCache,
    store: Arc<IndexStore>,
    fetcher: ResilientFetcher,
    gate: ResolutionGate,
    source_timeout: Duration,
}

impl Aggregator {
    pub fn new(cache: SourceCache) -> Self {
        Self {
            cache,
            store: Arc::new(IndexStore::new()),
            fetcher: ResilientFetcher::default(),
            gate: ResolutionGate::default(),
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    pub fn from_config(cache: SourceCache, config: &Config) -> Self {
        let resolution = &config.resolution;
        Self::new(cache)
            .with_retry_policy(config.retry)
            .with_gate(ResolutionGate::new(resolution.margin, resolution.max_ambiguous))
            .with_source_timeout(resolution.source_timeout())
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.fetcher = ResilientFetcher::new(policy);
        self
    }

    #[must_use]
    pub const fn with_gate(mut self, gate: ResolutionGate) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub const fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub const fn cache(&self) -> &SourceCache {
        &self.cache
    }

    pub const fn fetcher(&self) -> ResilientFetcher {
        self.fetcher
    }

    pub async fn resolve_all(&self, raw: &str, datasets: &[DatasetRef]) -> Result<AggregateReport> {
        self.resolve_all_until(raw, datasets, CancelToken::never())
            .await
    }

    /// Like [`Aggregator::resolve_all`], abandoning outstanding datasets when
    /// `cancel` fires. Datasets that already finished keep their outcomes.
    pub async fn resolve_all_until(
        &self,
        raw: &str,
        datasets: &[DatasetRef],
        cancel: CancelToken,
    ) -> Result<AggregateReport> {
        let name = Arc::new(normalize(raw)?);
        tracing::info!(
            "Resolving {:?} against {} datasets",
            name.base_form,
            datasets.len()
        );

        let mut seen = HashSet::new();
        let mut handles = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            if !seen.insert(dataset.id().to_string()) {
                tracing::warn!("Dataset {} listed twice, resolving it once", dataset.id());
                continue;
            }

            let task = DatasetTask {
                dataset: Arc::clone(dataset),
                name: Arc::clone(&name),
                cache: self.cache.clone(),
                store: Arc::clone(&self.store),
                fetcher: self.fetcher,
                gate: self.gate,
                timeout: self.source_timeout,
            };
            handles.push((Arc::clone(dataset), tokio::spawn(task.run(cancel.clone()))));
        }

        let mut resolutions = BTreeMap::new();
        for (dataset, handle) in handles {
            let resolution = match handle.await {
                Ok(resolution) => resolution,
                Err(e) => {
                    tracing::warn!("Resolver for {} failed: {}", dataset.id(), e);
                    let trace = ResolutionTrace::new();
                    let outcome = ResolutionOutcome::unavailable(format!("resolver failed: {e}"));
                    trace.finish(&outcome);
                    DatasetResolution {
                        dataset_id: dataset.id().to_string(),
                        title: dataset.title().to_string(),
                        threshold: dataset.threshold(),
                        outcome,
                        trace: trace.states(),
                        elapsed_ms: 0,
                    }
                }
            };
            resolutions.insert(resolution.dataset_id.clone(), resolution);
        }

        let report = AggregateReport::new(Arc::unwrap_or_clone(name), resolutions);
        let counts = report.counts();
        tracing::info!(
            "Report {}: {} accepted, {} rejected, {} ambiguous, {} unavailable",
            report.id,
            counts.accepted,
            counts.rejected,
            counts.ambiguous,
            counts.unavailable
        );
        Ok(report)
    }
}

/// Everything one dataset's resolution needs, owned so it can run as its
/// own task.
struct DatasetTask {
    dataset: DatasetRef,
    name: Arc<NormalizedName>,
    cache: SourceCache,
    store: Arc<IndexStore>,
    fetcher: ResilientFetcher,
    gate: ResolutionGate,
    timeout: Duration,
}

impl DatasetTask {
    async fn run(self, mut cancel: CancelToken) -> DatasetResolution {
        let started = Instant::now();
        let trace = ResolutionTrace::new();
        let id = self.dataset.id().to_string();

        let outcome = tokio::select! {
            result = tokio::time::timeout(self.timeout, self.resolve(&trace)) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!("{} timed out after {:?}", id, self.timeout);
                    ResolutionOutcome::unavailable(format!(
                        "timed out after {}s",
                        self.timeout.as_secs_f64()
                    ))
                }
            },
            () = cancel.cancelled() => {
                tracing::info!("{} cancelled", id);
                ResolutionOutcome::unavailable("cancelled")
            }
        };

        trace.finish(&outcome);
        tracing::info!("{}: {}", id, outcome);

        DatasetResolution {
            dataset_id: id,
            title: self.dataset.title().to_string(),
            threshold: self.dataset.threshold(),
            outcome,
            trace: trace.states(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn resolve(&self, trace: &ResolutionTrace) -> ResolutionOutcome {
        let index = match self
            .store
            .load(
                self.dataset.as_ref(),
                &self.name,
                &self.fetcher,
                &self.cache,
                trace,
            )
            .await
        {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("{} unavailable: {}", self.dataset.id(), e);
                return ResolutionOutcome::unavailable(e);
            }
        };
        trace.record(ResolutionState::CandidatesReady);

        let name = Arc::clone(&self.name);
        let gate = self.gate;
        let threshold = self.dataset.threshold();
        let dataset_id = self.dataset.id().to_string();

        let scored = tokio::task::spawn_blocking(move || {
            let ranked = index.rank(&name);
            if let Some(best) = ranked.first() {
                tracing::debug!(
                    "{}: best candidate {:?} scored {} of {}",
                    dataset_id,
                    best.candidate.name,
                    best.score,
                    ranked.len()
                );
            }
            gate.decide(&dataset_id, &ranked, threshold)
        })
        .await;

        match scored {
            Ok(outcome) => {
                trace.record(ResolutionState::Scored);
                outcome
            }
            Err(e) => ResolutionOutcome::unavailable(format!("scoring failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{FetchError, FetchResult};
    use crate::pipeline::cancel_pair;
    use crate::resolve::Candidate;
    use crate::sources::{CachePolicy, Dataset};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;
    use ResolutionState::*;

    enum Behavior {
        Ready,
        Fail(u16),
        Stall(Duration),
        Panic,
    }

    struct FakeDataset {
        id: &'static str,
        threshold: u8,
        policy: CachePolicy,
        candidates: Vec<Candidate>,
        behavior: Behavior,
        loads: AtomicU32,
    }

    impl FakeDataset {
        fn new(id: &'static str, threshold: u8, names: &[(&str, &str)]) -> Self {
            Self {
                id,
                threshold,
                policy: CachePolicy::ProcessLifetime,
                candidates: names.iter().map(|(n, i)| Candidate::new(*n, *i)).collect(),
                behavior: Behavior::Ready,
                loads: AtomicU32::new(0),
            }
        }

        fn with_policy(mut self, policy: CachePolicy) -> Self {
            self.policy = policy;
            self
        }

        fn behaving(mut self, behavior: Behavior) -> Self {
            self.behavior = behavior;
            self
        }
    }

    #[async_trait]
    impl Dataset for FakeDataset {
        fn id(&self) -> &str {
            self.id
        }

        fn title(&self) -> &str {
            self.id
        }

        fn threshold(&self) -> u8 {
            self.threshold
        }

        fn match_field(&self) -> &str {
            "name"
        }

        fn cache_policy(&self) -> CachePolicy {
            self.policy
        }

        async fn load_candidates(
            &self,
            _name: &NormalizedName,
            fetcher: &ResilientFetcher,
        ) -> FetchResult<Vec<Candidate>> {
            fetcher
                .execute(self.id, || async {
                    self.loads.fetch_add(1, Ordering::SeqCst);
                    match self.behavior {
                        Behavior::Ready => Ok(self.candidates.clone()),
                        Behavior::Fail(status) => Err(FetchError::Status {
                            url: format!("https://{}.example", self.id),
                            status,
                        }),
                        Behavior::Stall(delay) => {
                            tokio::time::sleep(delay).await;
                            Ok(self.candidates.clone())
                        }
                        Behavior::Panic => panic!("loader bug"),
                    }
                })
                .await
        }
    }

    fn instant_retries() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    async fn aggregator() -> (TempDir, Aggregator) {
        let tmp = TempDir::new().unwrap();
        let cache = SourceCache::open(tmp.path()).await.unwrap();
        let aggregator = Aggregator::new(cache).with_retry_policy(instant_retries());
        (tmp, aggregator)
    }

    fn registry() -> FakeDataset {
        FakeDataset::new(
            "identity_registry",
            70,
            &[
                ("NVIDIA CORP", "NVDA"),
                ("Apple Inc.", "AAPL"),
                ("Intel Corp", "INTC"),
            ],
        )
    }

    #[tokio::test]
    async fn test_failing_dataset_does_not_abort_report() {
        let (_tmp, aggregator) = aggregator().await;
        let failing = Arc::new(FakeDataset::new("litigation", 75, &[]).behaving(Behavior::Fail(503)));
        let datasets: Vec<DatasetRef> = vec![
            Arc::new(registry()),
            Arc::new(FakeDataset::new("layoff_notices", 80, &[("Walmart Inc", "Walmart Inc")])),
            failing.clone(),
        ];

        let report = aggregator.resolve_all("Nvidia", &datasets).await.unwrap();

        assert_eq!(report.datasets.len(), 3);
        assert_eq!(report.accepted("identity_registry").unwrap().identifier, "NVDA");
        assert!(matches!(
            report.outcome("layoff_notices"),
            Some(ResolutionOutcome::Rejected { .. })
        ));
        assert!(report.outcome("litigation").unwrap().is_unavailable());
        assert_eq!(failing.loads.load(Ordering::SeqCst), 3);
        assert_eq!(
            report.datasets["litigation"].trace,
            vec![Pending, CacheMiss, Fetching, FetchFailed, SourceUnavailable]
        );
    }

    #[tokio::test]
    async fn test_nvidia_accepted_with_ticker() {
        let (_tmp, aggregator) = aggregator().await;
        let datasets: Vec<DatasetRef> = vec![Arc::new(FakeDataset::new(
            "identity_registry",
            70,
            &[("NVIDIA Corporation", "NVDA"), ("Nuvectra Corp", "NVTR")],
        ))];

        let report = aggregator.resolve_all("Nvidia", &datasets).await.unwrap();
        let matched = report.accepted("identity_registry").unwrap();

        assert_eq!(matched.identifier, "NVDA");
        assert!(matched.score >= 70);
        assert_eq!(
            report.datasets["identity_registry"].trace,
            vec![Pending, CacheMiss, Fetching, CandidatesReady, Scored, Accepted]
        );
    }

    #[tokio::test]
    async fn test_empty_name_is_an_error() {
        let (_tmp, aggregator) = aggregator().await;
        let datasets: Vec<DatasetRef> = vec![Arc::new(registry())];

        let result = aggregator.resolve_all("   ", &datasets).await;
        assert!(matches!(result, Err(crate::Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_slow_dataset_times_out_alone() {
        let (_tmp, aggregator) = aggregator().await;
        let aggregator = aggregator.with_source_timeout(Duration::from_millis(200));
        let datasets: Vec<DatasetRef> = vec![
            Arc::new(registry()),
            Arc::new(
                FakeDataset::new("visa_sponsorship", 50, &[("NVIDIA CORPORATION", "x")])
                    .behaving(Behavior::Stall(Duration::from_secs(30))),
            ),
        ];

        let report = aggregator.resolve_all("Nvidia", &datasets).await.unwrap();

        assert!(report.outcome("identity_registry").unwrap().is_accepted());
        match report.outcome("visa_sponsorship").unwrap() {
            ResolutionOutcome::SourceUnavailable { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(
            report.datasets["visa_sponsorship"].trace,
            vec![Pending, CacheMiss, Fetching, FetchFailed, SourceUnavailable]
        );
    }

    #[tokio::test]
    async fn test_cancellation_keeps_finished_outcomes() {
        let (_tmp, aggregator) = aggregator().await;
        let datasets: Vec<DatasetRef> = vec![
            Arc::new(registry()),
            Arc::new(
                FakeDataset::new("litigation", 75, &[])
                    .behaving(Behavior::Stall(Duration::from_secs(30))),
            ),
        ];
        let (handle, token) = cancel_pair();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });
        let report = aggregator
            .resolve_all_until("Nvidia", &datasets, token)
            .await
            .unwrap();
        canceller.await.unwrap();

        assert!(report.outcome("identity_registry").unwrap().is_accepted());
        assert_eq!(
            report.outcome("litigation"),
            Some(&ResolutionOutcome::unavailable("cancelled"))
        );
    }

    #[tokio::test]
    async fn test_panicking_loader_is_contained() {
        let (_tmp, aggregator) = aggregator().await;
        let datasets: Vec<DatasetRef> = vec![
            Arc::new(registry()),
            Arc::new(FakeDataset::new("job_postings", 80, &[]).behaving(Behavior::Panic)),
        ];

        let report = aggregator.resolve_all("Nvidia", &datasets).await.unwrap();

        assert!(report.outcome("identity_registry").unwrap().is_accepted());
        assert!(report.outcome("job_postings").unwrap().is_unavailable());
        assert_eq!(
            report.datasets["job_postings"].trace,
            vec![Pending, SourceUnavailable]
        );
    }

    #[tokio::test]
    async fn test_process_lifetime_index_loaded_once() {
        let (_tmp, aggregator) = aggregator().await;
        let layoffs = Arc::new(FakeDataset::new("layoff_notices", 80, &[("Amazon.com Services LLC", "a")]));
        let datasets: Vec<DatasetRef> = vec![layoffs.clone()];

        let first = aggregator.resolve_all("Amazon", &datasets).await.unwrap();
        let second = aggregator.resolve_all("Walmart", &datasets).await.unwrap();

        assert_eq!(layoffs.loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.datasets["layoff_notices"].trace[1], CacheMiss);
        assert_eq!(second.datasets["layoff_notices"].trace[1], CacheHit);
    }

    #[tokio::test]
    async fn test_persisted_index_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let policy = CachePolicy::Persisted {
            ttl: chrono::Duration::days(7),
        };
        let dataset = Arc::new(registry().with_policy(policy));
        let datasets: Vec<DatasetRef> = vec![dataset.clone()];

        let first = Aggregator::new(SourceCache::open(tmp.path()).await.unwrap());
        let report = first.resolve_all("Nvidia", &datasets).await.unwrap();
        assert_eq!(report.datasets["identity_registry"].trace[1], CacheMiss);

        // A fresh aggregator has an empty memory store but shares the disk cache
        let second = Aggregator::new(SourceCache::open(tmp.path()).await.unwrap());
        let report = second.resolve_all("Nvidia", &datasets).await.unwrap();

        assert_eq!(
            report.datasets["identity_registry"].trace,
            vec![Pending, CacheHit, CandidatesReady, Scored, Accepted]
        );
        assert_eq!(report.accepted("identity_registry").unwrap().identifier, "NVDA");
        assert_eq!(dataset.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_per_query_dataset_always_fetches() {
        let (_tmp, aggregator) = aggregator().await;
        let jobs = Arc::new(
            FakeDataset::new("job_postings", 80, &[("NVIDIA", "nvidia")])
                .with_policy(CachePolicy::PerQuery),
        );
        let datasets: Vec<DatasetRef> = vec![jobs.clone()];

        aggregator.resolve_all("Nvidia", &datasets).await.unwrap();
        aggregator.resolve_all("Nvidia", &datasets).await.unwrap();

        assert_eq!(jobs.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ambiguous_outcome() {
        let (_tmp, aggregator) = aggregator().await;
        let datasets: Vec<DatasetRef> = vec![Arc::new(FakeDataset::new(
            "visa_sponsorship",
            50,
            &[("Acme Widgets", "1"), ("Acme Gadgets", "2")],
        ))];

        let report = aggregator.resolve_all("Acme", &datasets).await.unwrap();

        match report.outcome("visa_sponsorship").unwrap() {
            ResolutionOutcome::Ambiguous { candidates } => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_datasets_resolved_once() {
        let (_tmp, aggregator) = aggregator().await;
        let dataset = Arc::new(registry());
        let datasets: Vec<DatasetRef> = vec![dataset.clone(), dataset.clone()];

        let report = aggregator.resolve_all("Nvidia", &datasets).await.unwrap();
        assert_eq!(report.datasets.len(), 1);
        assert_eq!(dataset.loads.load(Ordering::SeqCst), 1);
    }
}
