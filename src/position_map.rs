// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The in-client position map.

use crate::{Address, Leaf};
use rand::{CryptoRng, Rng, RngCore};

/// A direct mapping from logical block indices to their currently assigned
/// leaves. Held entirely in trusted client memory and re-randomized entry by
/// entry on every access.
#[derive(Debug)]
pub(crate) struct PositionMap {
    leaves: Vec<Leaf>,
}

impl PositionMap {
    /// A map over `capacity` addresses, each assigned a uniform random leaf
    /// in `[0, num_leaves)`.
    pub fn new<R: RngCore + CryptoRng>(capacity: usize, num_leaves: Leaf, rng: &mut R) -> Self {
        let leaves = (0..capacity).map(|_| rng.gen_range(0..num_leaves)).collect();
        Self { leaves }
    }

    /// The leaf currently assigned to `address`. Callers validate bounds.
    pub fn get(&self, address: Address) -> Leaf {
        self.leaves[address as usize]
    }

    /// Reassigns `address` to `leaf`.
    pub fn set(&mut self, address: Address, leaf: Leaf) {
        self.leaves[address as usize] = leaf;
    }

    /// The number of addresses tracked.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn initial_assignments_are_in_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let map = PositionMap::new(256, 16, &mut rng);
        assert_eq!(map.len(), 256);
        for address in 0..256 {
            let leaf = map.get(address);
            assert!((0..16).contains(&leaf));
        }
    }

    #[test]
    fn set_overwrites_only_the_target_entry() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut map = PositionMap::new(8, 16, &mut rng);
        let before: Vec<_> = (0..8).map(|a| map.get(a)).collect();

        map.set(3, 15);
        assert_eq!(map.get(3), 15);
        for address in (0..8).filter(|&a| a != 3) {
            assert_eq!(map.get(address), before[address as usize]);
        }
    }
}
