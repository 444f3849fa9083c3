// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod header;
mod tipset;

pub use header::{CachingBlockHeader, RawBlockHeader};
pub use tipset::{CreateTipsetError, Tipset, TipsetKey};

/// The aggregate weight of a chain up to a tipset. Weight computation belongs
/// to the consensus layer; this crate only ever compares weights.
pub type Weight = num_bigint::BigInt;
