// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

/// The height of a block in the chain. Blocks at epoch 0 are genesis blocks.
pub type ChainEpoch = i64;
