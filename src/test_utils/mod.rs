// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::{RawBlockHeader, Tipset, TipsetKey, Weight};
use crate::shim::clock::ChainEpoch;
use cid::Cid;
use libp2p::PeerId;
use multihash_codetable::Code;
use multihash_derive::MultihashDigest as _;

const DAG_CBOR: u64 = 0x71;

/// A deterministic peer identity per seed.
pub fn mock_peer_id(seed: u64) -> PeerId {
    PeerId::from_multihash(Code::Sha2_256.digest(&seed.to_be_bytes()))
        .expect("sha2-256 multihash is a valid peer id")
}

/// A deterministic key derived from arbitrary seed material, for use as a
/// synthetic parent set.
pub fn key_of(seeds: &[u64]) -> TipsetKey {
    seeds
        .iter()
        .map(|seed| Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&seed.to_be_bytes())))
        .collect()
}

pub fn mock_header(
    miner_id: u64,
    epoch: ChainEpoch,
    weight: u64,
    parents: TipsetKey,
) -> RawBlockHeader {
    RawBlockHeader {
        miner_id,
        parents,
        weight: Weight::from(weight),
        epoch,
        timestamp: 0,
    }
}

/// A single-block tipset on top of a shared synthetic parent set. Tipsets
/// produced by this helper are siblings of each other, never parent/child.
pub fn mock_tipset(miner_id: u64, epoch: ChainEpoch, weight: u64) -> Arc<Tipset> {
    mock_tipset_with_parents(miner_id, epoch, weight, key_of(&[0]))
}

pub fn mock_tipset_with_parents(
    miner_id: u64,
    epoch: ChainEpoch,
    weight: u64,
    parents: TipsetKey,
) -> Arc<Tipset> {
    Arc::new(mock_header(miner_id, epoch, weight, parents).into())
}
