// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use ahash::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::bucket::{SyncBucket, SyncBucketSet, same_chain_as};
use super::metrics;
use crate::blocks::{Tipset, TipsetKey};

/// What to do with tipsets that accumulated behind a sync job that failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedSyncOverflow {
    /// Discard the accumulated bucket. The lineage is retried only once a new
    /// related head is announced, which avoids hammering a chain that just
    /// failed validation.
    #[default]
    Drop,
    /// Put the accumulated bucket back into the pending queue for normal
    /// dispatch.
    Requeue,
}

/// Scheduling state of a chain lineage, as observed between events.
///
/// Transitions are driven exclusively by the three event handlers on
/// [`SyncScheduler`]:
///
/// `Unseen -> Pending` on [`SyncScheduler::schedule_incoming`];
/// `Pending -> Dispatched` on [`SyncScheduler::work_sent`];
/// `Dispatched -> Unseen | Pending` on [`SyncScheduler::process_result`]
/// (back to `Pending` when overflow accumulated and the policy allows it).
///
/// Success and failure are not states of the lineage but parameters of the
/// last transition; the scheduler keeps no record of finished lineages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LineageState {
    #[strum(to_string = "unseen")]
    Unseen,
    /// Queued or staged as the next dispatch target, no worker owns it.
    #[strum(to_string = "pending")]
    Pending,
    /// Exactly one worker is executing a sync job for this lineage.
    #[strum(to_string = "dispatched")]
    Dispatched,
}

/// The single-threaded core of the sync scheduler: clusters incoming tipsets
/// by lineage, stages the heaviest cluster for dispatch, and guarantees that
/// no two overlapping sync jobs ever run for the same chain segment.
///
/// All methods must be called from one control loop; the type is deliberately
/// not `Sync`-shared. Cross-thread communication happens by value through the
/// loop that owns it.
pub struct SyncScheduler {
    /// Lineages currently being synced by a worker, keyed by the dispatched
    /// tipset. At most one entry per lineage.
    active_syncs: HashMap<TipsetKey, Arc<Tipset>>,
    /// Candidate lineages not yet staged for dispatch.
    sync_queue: SyncBucketSet,
    /// Tipsets related to a lineage that is currently active, parked until
    /// that job completes so no duplicate work is started.
    active_sync_tips: SyncBucketSet,
    /// The next unit of work offered to whichever worker frees up first.
    next_sync_target: Option<SyncBucket>,
    overflow_policy: FailedSyncOverflow,
}

impl SyncScheduler {
    pub fn new(overflow_policy: FailedSyncOverflow) -> Self {
        Self {
            active_syncs: HashMap::default(),
            sync_queue: SyncBucketSet::default(),
            active_sync_tips: SyncBucketSet::default(),
            next_sync_target: None,
            overflow_policy,
        }
    }

    /// Event: a new tipset was observed.
    pub fn schedule_incoming(&mut self, ts: Arc<Tipset>) {
        metrics::TIPSET_SCHEDULED_TOTAL.inc();

        // A lineage already owned by a worker must not be dispatched a second
        // time; park anything related until the active job reports back.
        if self
            .active_syncs
            .values()
            .any(|active| same_chain_as(&ts, active))
        {
            trace!(epoch = ts.epoch(), "tipset relates to an active sync, parking");
            self.active_sync_tips.insert(ts);
            return;
        }

        match &mut self.next_sync_target {
            Some(target) if target.is_same_chain_as(&ts) => {
                // The staged bucket has not been picked up yet; grow it.
                target.add(ts);
            }
            _ => {
                self.sync_queue.insert(ts);
                if self.next_sync_target.is_none() {
                    self.next_sync_target = self.sync_queue.pop();
                }
            }
        }
    }

    /// The tipset that would be handed to the next free worker, if any.
    pub fn next_target(&self) -> Option<Arc<Tipset>> {
        self.next_sync_target
            .as_ref()
            .and_then(SyncBucket::heaviest_tipset)
    }

    /// Event: a free worker accepted the current dispatch target.
    ///
    /// Moves the target lineage into the active set and stages the next
    /// heaviest pending bucket, if there is one.
    pub fn work_sent(&mut self) {
        let Some(target) = self.next_sync_target.take() else {
            debug!("work_sent without a staged dispatch target");
            return;
        };
        if let Some(heaviest) = target.heaviest_tipset() {
            self.active_syncs.insert(heaviest.key().clone(), heaviest);
        }
        self.next_sync_target = self.sync_queue.pop();
    }

    /// Event: a worker reported the outcome of the sync job for `ts`.
    pub fn process_result(&mut self, ts: &Arc<Tipset>, success: bool) {
        self.active_syncs.remove(ts.key());
        let Some(overflow) = self.active_sync_tips.pop_related(ts) else {
            return;
        };
        if success {
            // Work that piled up behind the finished job becomes schedulable
            // again without waiting for another announcement.
            if self.next_sync_target.is_none() {
                self.next_sync_target = Some(overflow);
            } else {
                self.sync_queue.append_bucket(overflow);
            }
        } else {
            match self.overflow_policy {
                FailedSyncOverflow::Drop => {
                    debug!(
                        epoch = ts.epoch(),
                        parked = overflow.len(),
                        "dropping tipsets parked behind a failed sync"
                    );
                }
                FailedSyncOverflow::Requeue => {
                    if self.next_sync_target.is_none() {
                        self.next_sync_target = Some(overflow);
                    } else {
                        self.sync_queue.append_bucket(overflow);
                    }
                }
            }
        }
    }

    /// Read-back of the lineage state for `ts`. See [`LineageState`].
    pub fn lineage_state(&self, ts: &Tipset) -> LineageState {
        if self
            .active_syncs
            .values()
            .any(|active| same_chain_as(ts, active))
        {
            return LineageState::Dispatched;
        }
        let staged = self
            .next_sync_target
            .as_ref()
            .is_some_and(|b| b.is_same_chain_as(ts));
        if staged || self.sync_queue.related_to_any(ts) || self.active_sync_tips.related_to_any(ts)
        {
            return LineageState::Pending;
        }
        LineageState::Unseen
    }

    /// Number of lineages currently owned by workers.
    pub fn active_sync_count(&self) -> usize {
        self.active_syncs.len()
    }
}
