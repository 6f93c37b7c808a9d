mod client;
mod config;
mod retry;

pub use client::{FetchError, FetchResult, HttpClient};
pub use config::{NetworkConfig, NetworkConfigError};
pub use retry::{ResilientFetcher, RetryPolicy};
