// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Head synchronization scheduling.
//!
//! Peer-announced heads enter through [`SyncManager::set_peer_head`], pass
//! the bootstrap gate, and are clustered into lineage buckets by the control
//! loop. The heaviest pending bucket is staged as the dispatch target and
//! handed to whichever worker frees up first; at most one sync job is ever
//! in flight per lineage, and heads that relate to an in-flight lineage are
//! parked until its job reports back.

mod bucket;
pub mod metrics;
mod scheduler;
mod sync_manager;
mod sync_state;

pub use self::{
    bucket::{SyncBucket, SyncBucketSet},
    scheduler::{FailedSyncOverflow, LineageState, SyncScheduler},
    sync_manager::{
        BOOTSTRAP_PEER_THRESHOLD, SyncConfig, SyncExecutor, SyncManager, SyncResult, WorkerState,
    },
    sync_state::{SyncStage, SyncState},
};
