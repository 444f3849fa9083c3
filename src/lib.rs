// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Head synchronization scheduling for Filecoin-style (proof-of-work-free)
//! networks: peer-announced chain heads are clustered by lineage, the
//! heaviest cluster is selected, and synchronization work is dispatched to a
//! bounded pool of workers without ever running two overlapping jobs for the
//! same chain segment. The actual fetch/validate/apply procedure is supplied
//! by the caller through [`chain_sync::SyncExecutor`].

pub mod blocks;
pub mod chain_sync;
pub mod metrics;
pub mod shim;
#[cfg(test)]
mod test_utils;
