// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::Tipset;
use crate::shim::clock::ChainEpoch;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Stage a sync worker is at for its current job.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, strum::Display, strum::EnumString)]
pub enum SyncStage {
    /// Idle state.
    #[strum(to_string = "idle worker")]
    Idle,
    /// Syncing headers from the heaviest tipset back towards the local chain.
    #[strum(to_string = "header sync")]
    Headers,
    /// Syncing messages and performing state transitions.
    #[strum(to_string = "message sync")]
    Messages,
    /// Sync job completed.
    #[strum(to_string = "complete")]
    Complete,
    /// Error has occurred while syncing.
    #[strum(to_string = "error")]
    Error,
}

impl Default for SyncStage {
    fn default() -> Self {
        Self::Idle
    }
}

/// State of one worker's syncing process, readable by external observers
/// while the owning worker and its executor mutate it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SyncState {
    target: Option<Arc<Tipset>>,

    stage: SyncStage,
    epoch: ChainEpoch,

    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    message: String,
}

impl SyncState {
    /// Initializes the syncing state with a target tipset and sets the start
    /// time.
    pub fn init(&mut self, target: Arc<Tipset>) {
        *self = Self {
            target: Some(target),
            stage: SyncStage::Headers,
            start: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Get the current [`SyncStage`] of the worker
    pub fn stage(&self) -> SyncStage {
        self.stage
    }

    /// Returns the [`Tipset`] the worker is currently syncing towards
    pub fn target(&self) -> Option<&Arc<Tipset>> {
        self.target.as_ref()
    }

    /// Return the current [`ChainEpoch`] the job has reached
    pub fn epoch(&self) -> ChainEpoch {
        self.epoch
    }

    /// Get the elapsed time of the current syncing process.
    /// Returns `None` if syncing has not started
    pub fn get_elapsed_time(&self) -> Option<Duration> {
        let start = self.start?;
        Some(self.end.unwrap_or_else(Utc::now) - start)
    }

    /// Sets the sync stage for the syncing state. If setting to complete, sets
    /// end timer to now.
    pub fn set_stage(&mut self, stage: SyncStage) {
        if let SyncStage::Complete = stage {
            self.end = Some(Utc::now());
        }
        self.stage = stage;
    }

    /// Sets epoch of the sync.
    pub fn set_epoch(&mut self, epoch: ChainEpoch) {
        self.epoch = epoch;
    }

    /// Sets error for the sync.
    pub fn error(&mut self, err: String) {
        self.message = err;
        self.stage = SyncStage::Error;
        self.end = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_tipset;

    #[test]
    fn init_resets_previous_job() {
        let mut state = SyncState::default();
        assert_eq!(state.stage(), SyncStage::Idle);

        state.init(mock_tipset(1, 5, 100));
        state.set_epoch(3);
        state.set_stage(SyncStage::Messages);

        state.init(mock_tipset(2, 8, 200));
        assert_eq!(state.stage(), SyncStage::Headers);
        assert_eq!(state.epoch(), 0);
        assert_eq!(state.target().unwrap().epoch(), 8);
    }

    #[test]
    fn error_marks_stage_and_end() {
        let mut state = SyncState::default();
        state.init(mock_tipset(1, 5, 100));
        state.error("no peers".to_string());
        assert_eq!(state.stage(), SyncStage::Error);
        assert!(state.get_elapsed_time().is_some());
    }
}
