// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::OnceLock;

use super::{TipsetKey, Weight};
use crate::shim::clock::ChainEpoch;
use cid::Cid;
use multihash_codetable::Code;
use multihash_derive::MultihashDigest as _;
use serde::{Deserialize, Serialize};

const DAG_CBOR: u64 = 0x71;

#[derive(Deserialize, Serialize, Clone, Hash, Eq, PartialEq, Debug)]
pub struct RawBlockHeader {
    /// ID of the miner actor that produced this block
    pub miner_id: u64,
    /// The set of parents this block was based on.
    /// Typically one, but can be several in the case where there were multiple
    /// winning ticket-holders for an epoch
    pub parents: TipsetKey,
    /// The aggregate chain weight of the parent set
    pub weight: Weight,
    /// The period in which a new block is generated.
    /// There may be multiple rounds in an epoch.
    pub epoch: ChainEpoch,
    /// Block creation time, in seconds since the Unix epoch
    pub timestamp: u64,
}

impl RawBlockHeader {
    pub fn cid(&self) -> Cid {
        self.car_block().expect("CBOR serialization failed").0
    }
    pub fn car_block(&self) -> anyhow::Result<(Cid, Vec<u8>)> {
        let data = serde_ipld_dagcbor::to_vec(self)?;
        let cid = Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&data));
        Ok((cid, data))
    }
}

/// A [`RawBlockHeader`] which caches calls to [`RawBlockHeader::cid`]
#[derive(Clone, Debug, derive_more::Deref)]
pub struct CachingBlockHeader {
    #[deref]
    uncached: RawBlockHeader,
    cid: OnceLock<Cid>,
}

impl PartialEq for CachingBlockHeader {
    fn eq(&self, other: &Self) -> bool {
        // Epoch check is redundant but cheap.
        self.uncached.epoch == other.uncached.epoch && self.cid() == other.cid()
    }
}

impl Eq for CachingBlockHeader {}

impl From<RawBlockHeader> for CachingBlockHeader {
    fn from(value: RawBlockHeader) -> Self {
        Self::new(value)
    }
}

impl Serialize for CachingBlockHeader {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.uncached.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CachingBlockHeader {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        RawBlockHeader::deserialize(deserializer).map(Self::new)
    }
}

impl CachingBlockHeader {
    pub fn new(uncached: RawBlockHeader) -> Self {
        Self {
            uncached,
            cid: OnceLock::new(),
        }
    }
    pub fn into_raw(self) -> RawBlockHeader {
        self.uncached
    }
    pub fn cid(&self) -> &Cid {
        self.cid.get_or_init(|| self.uncached.cid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(miner_id: u64) -> RawBlockHeader {
        RawBlockHeader {
            miner_id,
            parents: TipsetKey::default(),
            weight: Weight::from(0u32),
            epoch: 0,
            timestamp: 0,
        }
    }

    #[test]
    fn cid_is_stable_and_cached() {
        let caching = CachingBlockHeader::new(header(1));
        let first = *caching.cid();
        assert_eq!(first, caching.uncached.cid());
        assert_eq!(&first, caching.cid());
    }

    #[test]
    fn distinct_headers_have_distinct_cids() {
        assert_ne!(header(1).cid(), header(2).cid());
    }
}
