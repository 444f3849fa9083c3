// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use prometheus_client::metrics::{counter::Counter, gauge::Gauge, histogram::Histogram};
use std::sync::LazyLock;

pub static TIPSET_SCHEDULED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    crate::metrics::default_registry().register(
        "tipset_scheduled_total",
        "Total number of tipsets accepted into the sync scheduler",
        metric.clone(),
    );
    metric
});
pub static SYNC_FAILURE_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    crate::metrics::default_registry().register(
        "sync_failure_total",
        "Total number of sync jobs that returned an error",
        metric.clone(),
    );
    metric
});
pub static FORK_AT_HEAD_SELECTION_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    crate::metrics::default_registry().register(
        "fork_at_head_selection_total",
        "Times multiple distinct chains were seen while selecting a sync target",
        metric.clone(),
    );
    metric
});
pub static HEAD_EPOCH: LazyLock<Gauge> = LazyLock::new(|| {
    let metric = Gauge::default();
    crate::metrics::default_registry().register(
        "head_epoch",
        "Latest epoch successfully synchronized",
        metric.clone(),
    );
    metric
});
pub static SYNC_JOB_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let metric = crate::metrics::default_histogram();
    crate::metrics::default_registry().register(
        "sync_job_duration_seconds",
        "Duration of sync jobs as observed by the worker pool",
        metric.clone(),
    );
    metric
});
