//! Process-wide counters for handle activity.
//!
//! Counters are relaxed atomics: cheap enough to stay on in release builds,
//! and only meaningful as monotonically growing totals.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Telemetry {
    pub handles_created: usize,
    pub adapters_built: usize,
    pub adapter_hits: usize,
    pub adapter_evictions: usize,
    pub call_site_swaps: usize,
    pub dependents_invalidated: usize,
}

static HANDLES_CREATED: AtomicUsize = AtomicUsize::new(0);
static ADAPTERS_BUILT: AtomicUsize = AtomicUsize::new(0);
static ADAPTER_HITS: AtomicUsize = AtomicUsize::new(0);
static ADAPTER_EVICTIONS: AtomicUsize = AtomicUsize::new(0);
static CALL_SITE_SWAPS: AtomicUsize = AtomicUsize::new(0);
static DEPENDENTS_INVALIDATED: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn record_handle() {
    HANDLES_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_adapter_build() {
    ADAPTERS_BUILT.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_adapter_hit() {
    ADAPTER_HITS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_adapter_eviction() {
    ADAPTER_EVICTIONS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_call_site_swap() {
    CALL_SITE_SWAPS.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_invalidations(count: usize) {
    DEPENDENTS_INVALIDATED.fetch_add(count, Ordering::Relaxed);
}

pub fn snapshot() -> Telemetry {
    Telemetry {
        handles_created: HANDLES_CREATED.load(Ordering::Relaxed),
        adapters_built: ADAPTERS_BUILT.load(Ordering::Relaxed),
        adapter_hits: ADAPTER_HITS.load(Ordering::Relaxed),
        adapter_evictions: ADAPTER_EVICTIONS.load(Ordering::Relaxed),
        call_site_swaps: CALL_SITE_SWAPS.load(Ordering::Relaxed),
        dependents_invalidated: DEPENDENTS_INVALIDATED.load(Ordering::Relaxed),
    }
}
