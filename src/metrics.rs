//! Process-wide Prometheus counters.
//!
//! Registered on the default registry at first use; `GET /metrics` gathers
//! and encodes whatever has been touched.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

lazy_static! {
    /// Upstream HTTP fetches by host and outcome (ok / error).
    pub static ref UPSTREAM_FETCHES: IntCounterVec = register_int_counter_vec!(
        "autv_upstream_fetches_total",
        "Upstream HTTP fetches by host and outcome",
        &["host", "outcome"]
    )
    .unwrap();

    /// Merged-guide builds actually executed, per bucket. Stays flat while
    /// the in-flight registry is deduplicating concurrent callers.
    pub static ref GUIDE_BUILDS: IntCounterVec = register_int_counter_vec!(
        "autv_guide_builds_total",
        "Merged guide index builds executed, by region bucket",
        &["bucket"]
    )
    .unwrap();

    /// Guide shards that contributed nothing to a merge.
    pub static ref GUIDE_SHARD_FAILURES: IntCounter = register_int_counter!(
        "autv_guide_shard_failures_total",
        "Guide shard fetch/parse failures tolerated during merges"
    )
    .unwrap();

    /// TTL cache reads by cache name and result (hit / miss).
    pub static ref CACHE_READS: IntCounterVec = register_int_counter_vec!(
        "autv_cache_reads_total",
        "TTL cache reads by cache name and result",
        &["cache", "result"]
    )
    .unwrap();

    /// Channel identity resolutions by outcome (matched / unmatched).
    pub static ref RESOLVER_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "autv_resolver_outcomes_total",
        "Channel identity resolutions by outcome",
        &["outcome"]
    )
    .unwrap();
}
