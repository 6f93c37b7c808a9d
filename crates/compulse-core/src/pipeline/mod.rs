//! Resolving one name against every dataset at once.

mod aggregator;
mod cancel;
mod enrich;
mod report;
mod state;
mod store;

pub use aggregator::Aggregator;
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use enrich::{Enricher, Enrichment};
pub use report::{AggregateReport, DatasetResolution, OutcomeCounts};
pub use state::{ResolutionState, ResolutionTrace};
pub use store::IndexStore;
