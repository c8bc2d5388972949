//! A Global History Buffer (GHB) correlation prefetcher core.
//!
//! On each cache access, [`dispatcher::PrefetchDispatcher`] inserts the
//! access into a [`history::HistoryHelper`] (a bounded ring of recent
//! accesses chained by program counter and by memory page), trains an
//! adaptive two-delta Markov [`pattern`] table on the resulting deltas, and
//! predicts a bounded set of future block addresses for the enclosing
//! simulator to speculatively fetch.
//!
//! This crate is the prediction core only: the cache-access framework that
//! supplies accesses and consumes predictions, the configuration plumbing
//! that instantiates the prefetcher, and the queueing layer that
//! deduplicates and issues prefetches are all external collaborators.

pub mod access;
pub mod config;
pub mod dispatcher;
pub mod history;
pub mod pattern;

pub use access::{AccessInfo, CorrelationKey};
pub use config::GhbConfig;
pub use dispatcher::{CacheAccessor, NoAccessor, PrefetchDispatcher};
pub use history::HistoryHelper;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use super::{AccessInfo, CacheAccessor, CorrelationKey, GhbConfig, NoAccessor, PrefetchDispatcher};
}
