// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use parking_lot::{RwLock, RwLockWriteGuard};
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use std::sync::LazyLock;

static DEFAULT_REGISTRY: LazyLock<RwLock<prometheus_client::registry::Registry>> =
    LazyLock::new(Default::default);

pub fn default_registry<'a>() -> RwLockWriteGuard<'a, prometheus_client::registry::Registry> {
    DEFAULT_REGISTRY.write()
}

/// Histogram with 7 buckets from 10ms to 10000s, each bucket 10 times as big
/// as the last. Sync jobs span from sub-second follows to hour-long catch-ups.
pub fn default_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.01, 10., 7))
}
