// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use ahash::HashMap;
use async_trait::async_trait;
use itertools::Itertools as _;
use libp2p::PeerId;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::bucket::SyncBucketSet;
use super::metrics;
use super::scheduler::{FailedSyncOverflow, SyncScheduler};
use super::sync_state::{SyncStage, SyncState};
use crate::blocks::Tipset;

const DEFAULT_WORKER_COUNT: usize = 3;
const DEFAULT_BOOTSTRAP_PEER_THRESHOLD: usize = 1;

/// Peer quorum public networks are expected to require before the node
/// commits to an initial sync target.
pub const BOOTSTRAP_PEER_THRESHOLD: usize = 2;

/// Syncing configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of workers concurrently executing sync jobs
    pub worker_count: usize,
    /// Distinct peers that must report a head above genesis before the node
    /// commits to an initial sync target. The default suits small and private
    /// networks; public deployments should raise it to
    /// [`BOOTSTRAP_PEER_THRESHOLD`] or beyond.
    pub bootstrap_peer_threshold: usize,
    /// What to do with tipsets that accumulated behind a sync job that failed
    pub failed_sync_overflow: FailedSyncOverflow,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            bootstrap_peer_threshold: DEFAULT_BOOTSTRAP_PEER_THRESHOLD,
            failed_sync_overflow: FailedSyncOverflow::default(),
        }
    }
}

/// Handle to the progress record of one sync worker, shared between the
/// worker, its executor and external observers.
pub type WorkerState = Arc<RwLock<SyncState>>;

/// Outcome of one sync job, reported back to the scheduler unconditionally.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub tipset: Arc<Tipset>,
    pub success: bool,
}

/// The procedure that fetches, validates and applies the chain up to a target
/// tipset. Supplied at construction; called concurrently from multiple
/// workers with different targets. Cancellation is delivered by aborting the
/// job's task, so implementations should be cancel-safe at `.await` points.
#[async_trait]
pub trait SyncExecutor: Send + Sync + 'static {
    /// Error surfaced when a job fails. It is logged and folded into a failed
    /// [`SyncResult`], never propagated to the peer-announcement path.
    type Error: std::fmt::Display + Send + 'static;

    /// Synchronize the local chain state to `target`, updating `state` with
    /// progress as the job advances.
    async fn sync(&self, state: WorkerState, target: Arc<Tipset>) -> Result<(), Self::Error>;
}

#[derive(Default)]
struct PeerHeadState {
    peer_heads: HashMap<PeerId, Arc<Tipset>>,
    bootstrapped: bool,
}

impl PeerHeadState {
    /// Peers that have told us about a head above genesis, i.e. actual chain
    /// participants.
    fn synced_peer_count(&self) -> usize {
        self.peer_heads.values().filter(|ts| ts.epoch() > 0).count()
    }
}

/// Channels handed over to the control loop and the workers when the manager
/// is started.
struct Pending {
    incoming_rx: flume::Receiver<Arc<Tipset>>,
    sync_targets_tx: flume::Sender<Arc<Tipset>>,
    sync_targets_rx: flume::Receiver<Arc<Tipset>>,
    sync_results_tx: flume::Sender<SyncResult>,
    sync_results_rx: flume::Receiver<SyncResult>,
}

/// Entry point of the sync subsystem: records peer-announced chain heads,
/// gates scheduling on a bootstrap peer quorum, and drives a single control
/// loop that dispatches sync work to a fixed pool of workers. See the module
/// documentation for the scheduling rules.
pub struct SyncManager<E: SyncExecutor> {
    state: Mutex<PeerHeadState>,
    config: SyncConfig,
    executor: Arc<E>,
    worker_states: Vec<WorkerState>,
    incoming_tx: flume::Sender<Arc<Tipset>>,
    pending: Mutex<Option<Pending>>,
    stop_tx: Mutex<Option<flume::Sender<()>>>,
    stop_rx: flume::Receiver<()>,
}

impl<E: SyncExecutor> SyncManager<E> {
    pub fn new(config: SyncConfig, executor: Arc<E>) -> Self {
        // Rendezvous channels reproduce the backpressure of the original
        // design: a head is only handed over when the scheduler is ready for
        // it, and a target only when a worker is actually free.
        let (incoming_tx, incoming_rx) = flume::bounded(0);
        let (sync_targets_tx, sync_targets_rx) = flume::bounded(0);
        let (sync_results_tx, sync_results_rx) = flume::bounded(0);
        let (stop_tx, stop_rx) = flume::bounded(1);
        let worker_states = (0..config.worker_count)
            .map(|_| WorkerState::default())
            .collect();
        Self {
            state: Mutex::new(PeerHeadState::default()),
            config,
            executor,
            worker_states,
            incoming_tx,
            pending: Mutex::new(Some(Pending {
                incoming_rx,
                sync_targets_tx,
                sync_targets_rx,
                sync_results_tx,
                sync_results_rx,
            })),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
        }
    }

    /// Spawns the scheduler control loop and the worker pool onto the current
    /// tokio runtime. Must be called before any head can be forwarded.
    pub fn start(&self) {
        let Some(pending) = self.pending.lock().take() else {
            warn!("sync manager already started");
            return;
        };
        tokio::spawn(scheduler_loop(
            SyncScheduler::new(self.config.failed_sync_overflow),
            pending.incoming_rx,
            pending.sync_results_rx,
            pending.sync_targets_tx,
            self.stop_rx.clone(),
        ));
        for (id, state) in self.worker_states.iter().enumerate() {
            tokio::spawn(sync_worker(
                id,
                state.clone(),
                self.executor.clone(),
                pending.sync_targets_rx.clone(),
                pending.sync_results_tx.clone(),
                self.stop_rx.clone(),
            ));
        }
    }

    /// Requests shutdown: the control loop exits, workers abandon their
    /// in-flight executor calls and exit.
    pub fn stop(&self) {
        if self.stop_tx.lock().take().is_some() {
            info!("sync manager shutting down");
        }
    }

    /// Records `peer`'s announced head and, once the node is bootstrapped,
    /// forwards it to the scheduler. Before the bootstrap quorum is reached
    /// no head is forwarded; on reaching it, the heaviest cluster among all
    /// known heads becomes the initial sync target.
    ///
    /// Awaiting the scheduler handoff is the intentional backpressure point:
    /// a slow scheduler throttles peer-head ingestion instead of buffering
    /// unbounded peer input.
    pub async fn set_peer_head(&self, peer: PeerId, ts: Arc<Tipset>) {
        debug!(%peer, epoch = ts.epoch(), "new peer head");
        let forward = {
            let mut state = self.state.lock();
            state.peer_heads.insert(peer, ts.clone());
            if state.bootstrapped {
                Some(ts)
            } else {
                let synced = state.synced_peer_count();
                if synced >= self.config.bootstrap_peer_threshold {
                    let target = select_sync_target(state.peer_heads.values());
                    // TODO: consider deferring the flag until the initial
                    // sync completes instead of when its target is selected.
                    state.bootstrapped = target.is_some();
                    target
                } else {
                    debug!(peers = synced, "waiting for bootstrap peer quorum");
                    None
                }
            }
        };
        if let Some(target) = forward
            && self.incoming_tx.send_async(target).await.is_err()
        {
            warn!("sync scheduler is gone, dropping peer head");
        }
    }

    /// Whether the initial sync target has been committed to.
    pub fn is_bootstrapped(&self) -> bool {
        self.state.lock().bootstrapped
    }

    /// Number of peers that have announced a head.
    pub fn peer_count(&self) -> usize {
        self.state.lock().peer_heads.len()
    }

    /// Progress records of the sync workers, for status reporting.
    pub fn worker_states(&self) -> &[WorkerState] {
        &self.worker_states
    }
}

/// Clusters all known peer heads by lineage and returns the heaviest tipset
/// of the heaviest cluster. More than one cluster means distinct chains are
/// being announced; the best cluster wins and the rest are discarded.
fn select_sync_target<'a>(heads: impl IntoIterator<Item = &'a Arc<Tipset>>) -> Option<Arc<Tipset>> {
    let mut buckets = SyncBucketSet::default();
    for head in heads.into_iter().cloned().sorted_by_key(|ts| ts.epoch()) {
        buckets.insert(head);
    }
    if buckets.buckets().len() > 1 {
        warn!(
            clusters = buckets.buckets().len(),
            "multiple distinct chains seen during head selection, syncing the heaviest"
        );
        metrics::FORK_AT_HEAD_SELECTION_TOTAL.inc();
    }
    buckets.heaviest()
}

/// The control loop. Owns all scheduling state and multiplexes three event
/// sources: newly observed tipsets, worker results, and a worker becoming
/// free while a dispatch target is staged. Events are processed one at a
/// time, to completion.
async fn scheduler_loop(
    mut scheduler: SyncScheduler,
    incoming: flume::Receiver<Arc<Tipset>>,
    sync_results: flume::Receiver<SyncResult>,
    sync_targets: flume::Sender<Arc<Tipset>>,
    stop: flume::Receiver<()>,
) {
    loop {
        // Mirrors the conditional-send select of the original scheduler: the
        // dispatch branch only participates while a target is staged.
        let staged = scheduler.next_target();
        tokio::select! {
            ts = incoming.recv_async() => match ts {
                Ok(ts) => scheduler.schedule_incoming(ts),
                Err(_) => break,
            },
            res = sync_results.recv_async() => match res {
                Ok(res) => scheduler.process_result(&res.tipset, res.success),
                Err(_) => break,
            },
            sent = async {
                match staged {
                    Some(ts) => sync_targets.send_async(ts).await,
                    None => std::future::pending().await,
                }
            } => {
                if sent.is_ok() {
                    scheduler.work_sent();
                } else {
                    break;
                }
            },
            _ = stop.recv_async() => break,
        }
    }
    debug!("sync scheduler shutting down");
}

/// One worker slot: pulls a dispatch target, runs the executor in its own
/// task so a panic cannot take down the pool, and reports the outcome back
/// to the control loop unconditionally.
async fn sync_worker<E: SyncExecutor>(
    id: usize,
    state: WorkerState,
    executor: Arc<E>,
    sync_targets: flume::Receiver<Arc<Tipset>>,
    sync_results: flume::Sender<SyncResult>,
    stop: flume::Receiver<()>,
) {
    loop {
        let ts = tokio::select! {
            ts = sync_targets.recv_async() => match ts {
                Ok(ts) => ts,
                Err(_) => break,
            },
            _ = stop.recv_async() => break,
        };
        info!(worker = id, epoch = ts.epoch(), "sync worker accepted target");
        state.write().init(ts.clone());

        let timer = std::time::Instant::now();
        let mut job = tokio::spawn({
            let executor = executor.clone();
            let state = state.clone();
            let ts = ts.clone();
            async move { executor.sync(state, ts).await }
        });
        let outcome = tokio::select! {
            res = &mut job => match res {
                Ok(Ok(())) => Ok(()),
                // Executor error or panic; either way the job failed and the
                // lineage must be freed.
                Ok(Err(why)) => Err(why.to_string()),
                Err(why) => Err(why.to_string()),
            },
            _ = stop.recv_async() => {
                job.abort();
                debug!(worker = id, "sync worker shutting down");
                return;
            }
        };
        metrics::SYNC_JOB_DURATION_SECONDS.observe(timer.elapsed().as_secs_f64());
        let success = match outcome {
            Ok(()) => {
                metrics::HEAD_EPOCH.set(ts.epoch());
                state.write().set_stage(SyncStage::Complete);
                true
            }
            Err(why) => {
                error!(worker = id, %why, "sync job failed");
                metrics::SYNC_FAILURE_TOTAL.inc();
                state.write().error(why);
                false
            }
        };
        if sync_results
            .send_async(SyncResult { tipset: ts, success })
            .await
            .is_err()
        {
            break;
        }
    }
    debug!(worker = id, "sync worker exited");
}
