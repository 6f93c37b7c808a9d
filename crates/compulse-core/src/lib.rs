#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]

pub mod cache;
pub mod config;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod resolve;
pub mod sources;
pub mod summarize;

pub use cache::{CacheEntry, CacheStatus, SourceCache};
pub use config::Config;
pub use error::{Error, Result};
pub use network::{FetchError, HttpClient, ResilientFetcher, RetryPolicy};
pub use pipeline::{
    cancel_pair, AggregateReport, Aggregator, CancelHandle, CancelToken, Enricher, Enrichment,
};
pub use resolve::{normalize, Candidate, MatchResult, NormalizedName, ResolutionOutcome};
pub use sources::{build_datasets, select_datasets, Dataset, DatasetRef};
