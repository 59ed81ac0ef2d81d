// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The client-side stash.

use crate::{bucket::Block, Address, StashSize};

/// An unordered collection of plaintext blocks awaiting eviction back into
/// the tree. Entries are never silently dropped: a block leaves the stash
/// only by being claimed for a bucket rebuild or taken over by an access.
#[derive(Debug, Default)]
pub(crate) struct Stash {
    blocks: Vec<Block>,
    high_water: StashSize,
}

impl Stash {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of blocks currently held.
    pub fn len(&self) -> StashSize {
        self.blocks.len()
    }

    /// The largest size the stash has ever reached. Exposed so that tests
    /// and deployments can check the configured stash bound empirically.
    pub fn high_water(&self) -> StashSize {
        self.high_water
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
        self.high_water = self.high_water.max(self.blocks.len());
    }

    /// Removes and returns the block with the given address, if present.
    pub fn take(&mut self, address: Address) -> Option<Block> {
        let index = self.blocks.iter().position(|b| b.address() == address)?;
        Some(self.blocks.swap_remove(index))
    }

    /// Removes and returns up to `limit` blocks satisfying `eligible`,
    /// leaving the rest for a later eviction.
    pub fn drain_matching<F>(&mut self, limit: usize, eligible: F) -> Vec<Block>
    where
        F: Fn(&Block) -> bool,
    {
        let mut taken = Vec::with_capacity(limit);
        let mut k = 0;
        while k < self.blocks.len() && taken.len() < limit {
            if eligible(&self.blocks[k]) {
                taken.push(self.blocks.swap_remove(k));
            } else {
                k += 1;
            }
        }
        taken
    }

    /// Iterates over the stashed blocks in no particular order.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }
}
