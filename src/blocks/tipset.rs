// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;
use std::sync::OnceLock;

use super::{CachingBlockHeader, Weight};
use crate::shim::clock::ChainEpoch;
use cid::Cid;
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreateTipsetError {
    #[error("tipset must contain at least one block")]
    Empty,
    #[error("all blocks in a tipset must share the same epoch")]
    MismatchedEpochs,
    #[error("all blocks in a tipset must share the same parents")]
    MismatchedParents,
    #[error("all blocks in a tipset must share the same parent weight")]
    MismatchedWeights,
    #[error("duplicate block in tipset: {0}")]
    DuplicateBlock(Cid),
}

/// An immutable set of CIDs forming a unique key for a tipset.
/// Equal keys will have equivalent iteration order. The ordering is
/// deterministic, which makes the key usable as a tie-break when two
/// competing chains carry exactly equal weight.
#[derive(
    Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct TipsetKey {
    cids: Vec<Cid>,
}

impl TipsetKey {
    pub fn new(mut cids: Vec<Cid>) -> Self {
        cids.sort();
        cids.dedup();
        Self { cids }
    }

    pub fn cids(&self) -> &[Cid] {
        &self.cids
    }

    pub fn len(&self) -> usize {
        self.cids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cids.is_empty()
    }
}

impl fmt::Display for TipsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.cids.iter().join(", "))
    }
}

impl FromIterator<Cid> for TipsetKey {
    fn from_iter<I: IntoIterator<Item = Cid>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A non-empty group of blocks produced at the same epoch on top of the same
/// parent set, treated as a single unit of chain synchronization.
#[derive(Clone, Debug, Serialize)]
pub struct Tipset {
    headers: Vec<CachingBlockHeader>,
    #[serde(skip)]
    key: OnceLock<TipsetKey>,
}

impl PartialEq for Tipset {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Tipset {}

impl From<CachingBlockHeader> for Tipset {
    fn from(header: CachingBlockHeader) -> Self {
        Self {
            headers: vec![header],
            key: OnceLock::new(),
        }
    }
}

impl From<super::RawBlockHeader> for Tipset {
    fn from(header: super::RawBlockHeader) -> Self {
        CachingBlockHeader::new(header).into()
    }
}

impl Tipset {
    pub fn new(
        headers: impl IntoIterator<Item = CachingBlockHeader>,
    ) -> Result<Self, CreateTipsetError> {
        let mut headers = headers.into_iter().collect::<Vec<_>>();
        let first = headers.first().ok_or(CreateTipsetError::Empty)?.clone();
        for header in &headers {
            if header.epoch != first.epoch {
                return Err(CreateTipsetError::MismatchedEpochs);
            }
            if header.parents != first.parents {
                return Err(CreateTipsetError::MismatchedParents);
            }
            if header.weight != first.weight {
                return Err(CreateTipsetError::MismatchedWeights);
            }
        }
        // Canonical block order within the tipset.
        headers.sort_by(|a, b| a.cid().cmp(b.cid()));
        if let Some(dup) = headers
            .iter()
            .tuple_windows()
            .find_map(|(a, b)| (a.cid() == b.cid()).then(|| *a.cid()))
        {
            return Err(CreateTipsetError::DuplicateBlock(dup));
        }
        Ok(Self {
            headers,
            key: OnceLock::new(),
        })
    }

    /// Returns the smallest ticket of all blocks in the tipset
    pub fn min_ticket_block(&self) -> &CachingBlockHeader {
        // Guaranteed to be non-empty by construction.
        &self.headers[0]
    }

    pub fn block_headers(&self) -> &[CachingBlockHeader] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// A key for the tipset. The key is the set of CIDs of the block headers.
    pub fn key(&self) -> &TipsetKey {
        self.key
            .get_or_init(|| self.headers.iter().map(|h| *h.cid()).collect())
    }

    pub fn cids(&self) -> Vec<Cid> {
        self.key().cids().to_vec()
    }

    /// The tipset's parent set, shared by all member blocks.
    pub fn parents(&self) -> &TipsetKey {
        &self.min_ticket_block().parents
    }

    pub fn epoch(&self) -> ChainEpoch {
        self.min_ticket_block().epoch
    }

    /// The aggregate chain weight up to this tipset's parents, as recorded by
    /// the consensus layer in every member header.
    pub fn weight(&self) -> &Weight {
        &self.min_ticket_block().weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::RawBlockHeader;

    fn header(miner_id: u64, epoch: ChainEpoch, weight: u64, parents: TipsetKey) -> RawBlockHeader {
        RawBlockHeader {
            miner_id,
            parents,
            weight: Weight::from(weight),
            epoch,
            timestamp: 0,
        }
    }

    #[test]
    fn empty_tipset_is_rejected() {
        assert_eq!(
            Tipset::new(Vec::<CachingBlockHeader>::new()),
            Err(CreateTipsetError::Empty)
        );
    }

    #[test]
    fn mismatched_blocks_are_rejected() {
        let parents = TipsetKey::new(vec![header(9, 0, 0, TipsetKey::default()).cid()]);
        let a = header(1, 5, 100, parents.clone());

        let wrong_epoch = header(2, 6, 100, parents.clone());
        assert_eq!(
            Tipset::new([a.clone().into(), wrong_epoch.into()]),
            Err(CreateTipsetError::MismatchedEpochs)
        );

        let wrong_parents = header(2, 5, 100, TipsetKey::default());
        assert_eq!(
            Tipset::new([a.clone().into(), wrong_parents.into()]),
            Err(CreateTipsetError::MismatchedParents)
        );

        let wrong_weight = header(2, 5, 101, parents.clone());
        assert_eq!(
            Tipset::new([a.clone().into(), wrong_weight.into()]),
            Err(CreateTipsetError::MismatchedWeights)
        );

        assert!(matches!(
            Tipset::new([a.clone().into(), a.into()]),
            Err(CreateTipsetError::DuplicateBlock(_))
        ));
    }

    #[test]
    fn key_is_order_independent() {
        let parents = TipsetKey::new(vec![header(9, 0, 0, TipsetKey::default()).cid()]);
        let a = CachingBlockHeader::new(header(1, 5, 100, parents.clone()));
        let b = CachingBlockHeader::new(header(2, 5, 100, parents));

        let ts_ab = Tipset::new([a.clone(), b.clone()]).unwrap();
        let ts_ba = Tipset::new([b, a]).unwrap();
        assert_eq!(ts_ab.key(), ts_ba.key());
        assert_eq!(ts_ab, ts_ba);
    }
}
