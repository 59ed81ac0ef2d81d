// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The Ring ORAM core.

use crate::{
    bucket::{Block, Bucket},
    crypto::CryptoUtils,
    position_map::PositionMap,
    stash::Stash,
    storage::ServerStorage,
    Address, BlockSize, Leaf, Operation, OramError, Position, StashSize,
    DEFAULT_BLOCK_SIZE, DEFAULT_DUMMY_BLOCKS_PER_BUCKET, DEFAULT_EVICTION_RATE,
    DEFAULT_REAL_BLOCKS_PER_BUCKET, DUMMY_ADDRESS,
};
use rand::{seq::SliceRandom, CryptoRng, Rng, RngCore};

/// The geometry and scheduling parameters of a [`RingOram`] instance.
#[derive(Clone, Debug)]
pub struct Parameters {
    /// The number of logical blocks, `N`.
    pub capacity: usize,
    /// The number of real slots per bucket, `Z`.
    pub real_slots: usize,
    /// The number of dummy slots per bucket, `S`.
    pub dummy_slots: usize,
    /// The number of accesses between scheduled path evictions, `A`.
    pub eviction_rate: u64,
    /// The block payload size in bytes, `B`. Must be a positive multiple
    /// of the cipher block size (16).
    pub block_size: BlockSize,
    /// How many of the top tree levels a client-side cache holds. The cache
    /// itself is external; the core only excludes cached buckets from its
    /// transfer accounting.
    pub cache_levels: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            capacity: 64,
            real_slots: DEFAULT_REAL_BLOCKS_PER_BUCKET,
            dummy_slots: DEFAULT_DUMMY_BLOCKS_PER_BUCKET,
            eviction_rate: DEFAULT_EVICTION_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            cache_levels: 0,
        }
    }
}

/// Counters surfaced for measurement. Security-relevant conditions (decrypt
/// failures, reshuffle pressure) are reported here rather than thrown.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    /// Buckets rebuilt outside the eviction schedule because their read
    /// counter reached the dummy budget.
    pub early_reshuffles: u64,
    /// Payloads whose authentication failed on decryption and were passed
    /// through unchanged.
    pub decrypt_failures: u64,
    /// Blocks fetched from non-cached tree levels during path reads.
    pub blocks_transferred: u64,
}

/// The bucket at `level` on the root-to-leaf path of `leaf`.
///
/// Out-of-range results indicate a logic error upstream; they are logged
/// and pinned to the root so that a malformed index can never escape the
/// tree.
fn path_bucket(leaf: Leaf, level: usize, height: usize, num_buckets: usize) -> Position {
    let position = (1usize << level) - 1 + ((leaf as usize) >> (height - level));
    if position >= num_buckets {
        log::error!(
            "path arithmetic out of range: leaf {} at level {} maps to {} (num_buckets = {})",
            leaf,
            level,
            position,
            num_buckets
        );
        return 0;
    }
    position
}

/// The tree level of a bucket position: `⌊log₂(position + 1)⌋`.
fn level_of(position: Position) -> usize {
    (position + 1).ilog2() as usize
}

/// A Ring ORAM client over an untrusted bucket store.
///
/// ## Parameters
///
/// - `Z` ([`Parameters::real_slots`]): how many real blocks a bucket can
///   hold between rebuilds.
/// - `S` ([`Parameters::dummy_slots`]): how many reads a bucket can serve
///   between rebuilds. Each path read consumes one slot per touched bucket,
///   so a bucket is reshuffled after at most `S` reads.
/// - `A` ([`Parameters::eviction_rate`]): a full path eviction runs once
///   every `A` accesses, over leaves enumerated by a global counter.
///
/// ## Security
///
/// The storage layer observes, per access, one fetch-and-write-back of the
/// same slot count at every bucket of a random path, followed by the
/// deterministic eviction and reshuffle traffic. Which slot held the target
/// is hidden by the per-rebuild random permutation; whether any bucket held
/// it at all is hidden by the dummy reads. The schedule is independent of
/// the logical addresses accessed, so the trace leaks only its own length.
///
/// Obliviousness degrades if the stash exceeds its configured bound; the
/// stash never drops blocks, and [`RingOram::stash_high_water`] exists so
/// deployments can verify the bound empirically.
#[derive(Debug)]
pub struct RingOram<S: ServerStorage> {
    /// The untrusted bucket store. Public for benchmarking and testing
    /// purposes; clients interact through `access`.
    pub storage: S,
    params: Parameters,
    /// Tree depth `L`; the tree has `L + 1` levels.
    height: usize,
    num_leaves: Leaf,
    num_buckets: usize,
    position_map: PositionMap,
    stash: Stash,
    crypto: CryptoUtils,
    /// Accesses since the last scheduled eviction, in `[0, A)`.
    round: u64,
    /// The eviction counter `G`; `G mod num_leaves` names the next
    /// eviction path.
    eviction_counter: u64,
    stats: Stats,
}

impl<S: ServerStorage> RingOram<S> {
    /// A Ring ORAM over `capacity` logical blocks with default bucket and
    /// scheduling parameters, marking the top `cache_levels` levels as
    /// client-cached.
    pub fn new<R: RngCore + CryptoRng>(
        capacity: usize,
        storage: S,
        cache_levels: usize,
        rng: &mut R,
    ) -> Result<Self, OramError> {
        Self::with_parameters(
            Parameters {
                capacity,
                cache_levels,
                ..Parameters::default()
            },
            storage,
            rng,
        )
    }

    /// A Ring ORAM with explicit parameters.
    ///
    /// Initializes every bucket to `Z + S` valid dummies, assigns every
    /// logical block a uniform random leaf, and seals the instance with a
    /// fresh random encryption key.
    pub fn with_parameters<R: RngCore + CryptoRng>(
        params: Parameters,
        mut storage: S,
        rng: &mut R,
    ) -> Result<Self, OramError> {
        validate(&params)?;

        let height = params.capacity.next_power_of_two().ilog2() as usize;
        let num_leaves: Leaf = 1 << height;
        let num_buckets: usize = (1 << (height + 1)) - 1;

        log::info!(
            "RingOram::new(N = {}, L = {}, Z = {}, S = {}, A = {}, B = {})",
            params.capacity,
            height,
            params.real_slots,
            params.dummy_slots,
            params.eviction_rate,
            params.block_size,
        );
        log::info!("tree-top cache enabled for {} levels", params.cache_levels);

        let position_map = PositionMap::new(params.capacity, num_leaves, rng);
        let crypto = CryptoUtils::new(&CryptoUtils::generate_key(rng));

        storage.set_capacity(num_buckets);
        for position in 0..num_buckets {
            storage.set_bucket(position, Bucket::new(params.real_slots, params.dummy_slots))?;
        }

        Ok(Self {
            storage,
            params,
            height,
            num_leaves,
            num_buckets,
            position_map,
            stash: Stash::new(),
            crypto,
            round: 0,
            eviction_counter: 0,
            stats: Stats::default(),
        })
    }

    /// Performs one oblivious access to the block at `address`.
    ///
    /// For [`Operation::Read`] the payload argument is ignored and the
    /// block's current contents are returned; a block that was never
    /// written reads as all zeros. For [`Operation::Write`] the block is
    /// replaced by `data` (which must be exactly `B` bytes) and the *newly
    /// installed* payload is returned.
    pub fn access<R: RngCore + CryptoRng>(
        &mut self,
        address: Address,
        op: Operation,
        data: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, OramError> {
        if address < 0 || address >= self.params.capacity as Address {
            return Err(OramError::AddressOutOfBoundsError);
        }
        if op == Operation::Write && data.len() != self.params.block_size {
            return Err(OramError::BlockLengthError {
                expected: self.params.block_size,
                actual: data.len(),
            });
        }

        // Remap before reading so the fetched path is already stale.
        let old_leaf = self.position_map.get(address);
        let new_leaf = rng.gen_range(0..self.num_leaves);
        self.position_map.set(address, new_leaf);

        let interest = self.read_path(old_leaf, address)?;

        let mut payload = if interest.address() == address {
            self.decrypt_data(interest.data())
        } else if let Some(block) = self.stash.take(address) {
            block.into_data()
        } else {
            // First touch of this address: logical memory reads as zeros.
            vec![0u8; self.params.block_size]
        };

        if op == Operation::Write {
            payload = data.to_vec();
        }

        self.stash.push(Block::new(new_leaf, address, payload.clone()));

        self.round = (self.round + 1) % self.params.eviction_rate;
        if self.round == 0 {
            self.evict_path(rng)?;
        }
        self.early_reshuffle(old_leaf, rng)?;

        Ok(payload)
    }

    /// Obliviously reads the block at `address`.
    pub fn read<R: RngCore + CryptoRng>(
        &mut self,
        address: Address,
        rng: &mut R,
    ) -> Result<Vec<u8>, OramError> {
        self.access(address, Operation::Read, &[], rng)
    }

    /// Obliviously overwrites the block at `address` with `data`.
    pub fn write<R: RngCore + CryptoRng>(
        &mut self,
        address: Address,
        data: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, OramError> {
        self.access(address, Operation::Write, data, rng)
    }

    /// Reads one slot from every bucket on the path of `leaf`, invalidating
    /// exactly one slot and incrementing the read counter at every level
    /// regardless of where (or whether) the target is found. Returns the
    /// target block if it was on the path, otherwise the dummy sentinel.
    fn read_path(&mut self, leaf: Leaf, address: Address) -> Result<Block, OramError> {
        let mut interest = Block::dummy();
        for level in 0..=self.height {
            let position = self.path_bucket(leaf, level);
            let mut bucket = self.storage.get_bucket(position)?;

            let offset = match bucket.offset_of(address).or_else(|| bucket.dummy_offset()) {
                Some(offset) => offset,
                None => {
                    // Early reshuffle keeps a readable dummy in every bucket;
                    // running out means the budget accounting is broken.
                    log::error!("bucket {} has no readable slot left", position);
                    0
                }
            };

            let block = bucket.blocks[offset].clone();
            bucket.valids[offset] = false;
            bucket.count += 1;

            if !self.is_position_cached(position) {
                self.stats.blocks_transferred += 1;
            }
            if block.address() == address {
                interest = block;
            }

            self.storage.set_bucket(position, bucket)?;
        }
        Ok(interest)
    }

    /// Drains every valid real block of the bucket at `position` into the
    /// stash as plaintext. The bucket itself is left untouched; callers
    /// always follow up with [`RingOram::write_bucket`], which replaces it
    /// wholesale.
    fn read_bucket(&mut self, position: Position) -> Result<(), OramError> {
        let bucket = self.storage.get_bucket(position)?;
        for k in 0..bucket.slots() {
            if bucket.ptrs[k] != DUMMY_ADDRESS && bucket.valids[k] && !bucket.blocks[k].is_dummy() {
                let block = &bucket.blocks[k];
                let payload = self.decrypt_data(block.data());
                self.stash.push(Block::new(block.leaf(), block.address(), payload));
            }
        }
        Ok(())
    }

    /// Rebuilds the bucket at `position`: claims up to `Z` stash blocks
    /// whose assigned leaf passes through it, seals them, pads with
    /// dummies to `Z + S` slots, shuffles, and installs the result with a
    /// zeroed read counter. Stash blocks beyond `Z` stay behind for a
    /// later eviction.
    fn write_bucket<R: RngCore + CryptoRng>(
        &mut self,
        position: Position,
        rng: &mut R,
    ) -> Result<(), OramError> {
        let level = level_of(position);
        let height = self.height;
        let num_buckets = self.num_buckets;
        let claimed = self.stash.drain_matching(self.params.real_slots, |block| {
            !block.is_dummy() && path_bucket(block.leaf(), level, height, num_buckets) == position
        });

        let slots = self.params.real_slots + self.params.dummy_slots;
        let mut blocks = Vec::with_capacity(slots);
        for block in claimed {
            let sealed = self.crypto.encrypt(block.data(), rng)?;
            blocks.push(Block::new(block.leaf(), block.address(), sealed));
        }
        while blocks.len() < slots {
            blocks.push(Block::dummy());
        }
        blocks.shuffle(rng);

        self.storage.set_bucket(position, Bucket::from_blocks(blocks))
    }

    /// Rebuilds the full path named by the eviction counter: drains every
    /// bucket top-down, then reinstalls bottom-up so blocks settle as deep
    /// as their leaf assignment allows.
    fn evict_path<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<(), OramError> {
        let leaf = (self.eviction_counter % self.num_leaves as u64) as Leaf;
        self.eviction_counter += 1;
        log::debug!("EvictPath -- leaf {}", leaf);

        for level in 0..=self.height {
            let position = self.path_bucket(leaf, level);
            self.read_bucket(position)?;
        }
        for level in (0..=self.height).rev() {
            let position = self.path_bucket(leaf, level);
            self.write_bucket(position, rng)?;
        }
        Ok(())
    }

    /// Rebuilds any bucket on the path of `leaf` whose read counter has
    /// reached the dummy budget `S`. Without this a saturated bucket would
    /// be forced to re-serve a slot, which the server could observe.
    fn early_reshuffle<R: RngCore + CryptoRng>(
        &mut self,
        leaf: Leaf,
        rng: &mut R,
    ) -> Result<(), OramError> {
        for level in 0..=self.height {
            let position = self.path_bucket(leaf, level);
            if self.storage.get_bucket(position)?.count() >= self.params.dummy_slots {
                log::debug!("EarlyReshuffle -- bucket {}", position);
                self.read_bucket(position)?;
                self.write_bucket(position, rng)?;
                self.stats.early_reshuffles += 1;
            }
        }
        Ok(())
    }

    /// Decrypts a sealed payload, treating failure as recoverable
    /// corruption: the error is logged and counted, and the ciphertext is
    /// passed through unchanged.
    fn decrypt_data(&mut self, data: &[u8]) -> Vec<u8> {
        match self.crypto.decrypt(data) {
            Ok(payload) => payload,
            Err(error) => {
                log::error!("block decrypt failed ({}); passing ciphertext through", error);
                self.stats.decrypt_failures += 1;
                data.to_vec()
            }
        }
    }

    fn path_bucket(&self, leaf: Leaf, level: usize) -> Position {
        path_bucket(leaf, level, self.height, self.num_buckets)
    }

    fn is_position_cached(&self, position: Position) -> bool {
        level_of(position) < self.params.cache_levels
    }

    /// The number of logical blocks stored.
    pub fn block_capacity(&self) -> usize {
        self.params.capacity
    }

    /// The parameters this instance was built with.
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// The number of blocks currently held client-side.
    pub fn stash_size(&self) -> StashSize {
        self.stash.len()
    }

    /// The largest stash size observed so far.
    pub fn stash_high_water(&self) -> StashSize {
        self.stash.high_water()
    }

    /// The number of position map entries (one per logical block).
    pub fn position_map_size(&self) -> usize {
        self.position_map.len()
    }

    /// How many scheduled path evictions have run (the counter `G`).
    pub fn eviction_count(&self) -> u64 {
        self.eviction_counter
    }

    /// Measurement counters.
    pub fn stats(&self) -> Stats {
        self.stats
    }
}

fn validate(params: &Parameters) -> Result<(), OramError> {
    let invalid = |name: &str, value: String| OramError::InvalidConfigurationError {
        parameter_name: name.to_string(),
        parameter_value: value,
    };

    if params.capacity < 2 || params.capacity > (1 << 40) {
        return Err(invalid("capacity", params.capacity.to_string()));
    }
    if params.real_slots == 0 {
        return Err(invalid("real_slots", params.real_slots.to_string()));
    }
    if params.dummy_slots == 0 {
        return Err(invalid("dummy_slots", params.dummy_slots.to_string()));
    }
    if params.eviction_rate == 0 {
        return Err(invalid("eviction_rate", params.eviction_rate.to_string()));
    }
    if params.block_size == 0 || params.block_size % 16 != 0 {
        return Err(invalid("block_size", params.block_size.to_string()));
    }
    Ok(())
}
