// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Block and bucket structures for Ring ORAM.

use crate::{Address, Leaf, OramError, DUMMY_ADDRESS};

/// A fixed-size unit of storage tagged with its assigned leaf and its
/// logical address.
///
/// The payload is ciphertext while the block resides in a bucket and
/// plaintext while it resides in the stash or travels back to the caller.
/// Blocks are immutable once constructed and are copied by value.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    leaf: Leaf,
    address: Address,
    data: Vec<u8>,
}

impl Block {
    /// Instantiates a block assigned to `leaf` holding `data` for the
    /// logical address `address`.
    pub fn new(leaf: Leaf, address: Address, data: Vec<u8>) -> Self {
        Self {
            leaf,
            address,
            data,
        }
    }

    /// The shared dummy sentinel. Dummy blocks carry no payload and the
    /// reserved address [`DUMMY_ADDRESS`].
    pub fn dummy() -> Self {
        Self {
            leaf: DUMMY_ADDRESS as Leaf,
            address: DUMMY_ADDRESS,
            data: Vec::new(),
        }
    }

    /// Whether this block is the dummy sentinel.
    pub fn is_dummy(&self) -> bool {
        self.address == DUMMY_ADDRESS
    }

    /// The leaf this block is currently assigned to.
    pub fn leaf(&self) -> Leaf {
        self.leaf
    }

    /// The logical address of this block.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The block payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the block, returning its payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_dummy() {
            write!(f, "Block::Dummy")
        } else {
            f.debug_struct("Block")
                .field("leaf", &self.leaf)
                .field("address", &self.address)
                .field("bytes", &self.data.len())
                .finish()
        }
    }
}

/// A Ring ORAM bucket: `Z + S` block slots, a slot-address mirror (`ptrs`),
/// per-slot validity flags, and a counter of reads since the last reshuffle.
///
/// A slot is *real* iff `ptrs[k] != DUMMY_ADDRESS && valids[k]`. Invariant:
/// `blocks`, `ptrs` and `valids` always have identical length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// The blocks stored by this bucket, ciphertext for real slots.
    pub(crate) blocks: Vec<Block>,
    /// Mirror of `blocks[k].address()`, scanned without touching payloads.
    pub(crate) ptrs: Vec<Address>,
    /// Whether slot `k` may still be served to a path read.
    pub(crate) valids: Vec<bool>,
    /// Reads served since the bucket was last rebuilt.
    pub(crate) count: usize,
}

impl Bucket {
    /// A fresh bucket of `real_slots + dummy_slots` slots, every slot filled
    /// with the dummy sentinel and marked valid.
    pub fn new(real_slots: usize, dummy_slots: usize) -> Self {
        let slots = real_slots + dummy_slots;
        Self {
            blocks: vec![Block::dummy(); slots],
            ptrs: vec![DUMMY_ADDRESS; slots],
            valids: vec![true; slots],
            count: 0,
        }
    }

    /// Assembles a bucket from an already shuffled slot list, deriving the
    /// `ptrs` mirror and marking every slot valid with a zeroed read counter.
    pub(crate) fn from_blocks(blocks: Vec<Block>) -> Self {
        let ptrs = blocks.iter().map(Block::address).collect();
        let valids = vec![true; blocks.len()];
        Self {
            blocks,
            ptrs,
            valids,
            count: 0,
        }
    }

    /// The total number of slots (`Z + S`).
    pub fn slots(&self) -> usize {
        self.blocks.len()
    }

    /// Reads served since the last reshuffle.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The slot holding the valid real block with the given address, if any.
    pub(crate) fn offset_of(&self, address: Address) -> Option<usize> {
        (0..self.slots()).find(|&k| self.ptrs[k] == address && self.valids[k])
    }

    /// The next readable dummy slot. Path reads invalidate the slot they
    /// serve, so every dummy is returned at most once between reshuffles.
    pub(crate) fn dummy_offset(&self) -> Option<usize> {
        (0..self.slots()).find(|&k| self.ptrs[k] == DUMMY_ADDRESS && self.valids[k])
    }

    /// The number of valid real slots currently held.
    pub fn occupancy(&self) -> usize {
        (0..self.slots())
            .filter(|&k| self.ptrs[k] != DUMMY_ADDRESS && self.valids[k])
            .count()
    }

    /// Encodes the bucket for the wire: `count` as `i32`, then per slot
    /// `ptrs[k]` (`i32`), `valids[k]` (`u8`), the block's leaf and address
    /// (`i32` each) and exactly `data_len` payload bytes (zero-padded for
    /// dummies).
    pub fn to_bytes(&self, data_len: usize) -> Result<Vec<u8>, OramError> {
        let slot_size = 4 + 1 + 4 + 4 + data_len;
        let mut out = Vec::with_capacity(4 + self.slots() * slot_size);
        out.extend_from_slice(&i32::try_from(self.count)?.to_le_bytes());
        for k in 0..self.slots() {
            let block = &self.blocks[k];
            if !block.is_dummy() && block.data().len() != data_len {
                return Err(OramError::WireFormatError("slot payload length"));
            }
            out.extend_from_slice(&i32::try_from(self.ptrs[k])?.to_le_bytes());
            out.push(u8::from(self.valids[k]));
            out.extend_from_slice(&i32::try_from(block.leaf())?.to_le_bytes());
            out.extend_from_slice(&i32::try_from(block.address())?.to_le_bytes());
            out.extend_from_slice(block.data());
            out.resize(out.len() + data_len - block.data().len(), 0);
        }
        Ok(out)
    }

    /// Decodes a bucket previously produced by [`Bucket::to_bytes`] with the
    /// same `data_len`.
    pub fn from_bytes(bytes: &[u8], data_len: usize) -> Result<Self, OramError> {
        let slot_size = 4 + 1 + 4 + 4 + data_len;
        if bytes.len() < 4 || (bytes.len() - 4) % slot_size != 0 {
            return Err(OramError::WireFormatError("bucket length"));
        }
        let slots = (bytes.len() - 4) / slot_size;
        let count = read_i32(&bytes[0..4]);
        if count < 0 {
            return Err(OramError::WireFormatError("read counter"));
        }

        let mut bucket = Bucket::new(0, 0);
        bucket.count = count as usize;
        for k in 0..slots {
            let base = 4 + k * slot_size;
            let ptr = Address::from(read_i32(&bytes[base..base + 4]));
            let valid = match bytes[base + 4] {
                0 => false,
                1 => true,
                _ => return Err(OramError::WireFormatError("validity flag")),
            };
            let leaf = Leaf::from(read_i32(&bytes[base + 5..base + 9]));
            let address = Address::from(read_i32(&bytes[base + 9..base + 13]));
            let data = &bytes[base + 13..base + 13 + data_len];
            let block = if address == DUMMY_ADDRESS {
                Block::dummy()
            } else {
                Block::new(leaf, address, data.to_vec())
            };
            bucket.blocks.push(block);
            bucket.ptrs.push(ptr);
            bucket.valids.push(valid);
        }
        Ok(bucket)
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes(bytes.try_into().expect("caller passes 4 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bucket_is_all_valid_dummies() {
        let bucket = Bucket::new(4, 5);
        assert_eq!(bucket.slots(), 9);
        assert_eq!(bucket.count(), 0);
        assert_eq!(bucket.occupancy(), 0);
        for k in 0..bucket.slots() {
            assert!(bucket.valids[k]);
            assert_eq!(bucket.ptrs[k], DUMMY_ADDRESS);
            assert!(bucket.blocks[k].is_dummy());
        }
    }

    #[test]
    fn from_blocks_mirrors_addresses() {
        let blocks = vec![
            Block::new(2, 7, vec![0xAA; 16]),
            Block::dummy(),
            Block::new(5, 3, vec![0xBB; 16]),
        ];
        let bucket = Bucket::from_blocks(blocks);
        assert_eq!(bucket.ptrs, vec![7, DUMMY_ADDRESS, 3]);
        assert!(bucket.valids.iter().all(|&v| v));
        assert_eq!(bucket.count(), 0);
        assert_eq!(bucket.occupancy(), 2);
    }

    #[test]
    fn offset_lookup_respects_validity() {
        let mut bucket = Bucket::from_blocks(vec![
            Block::new(0, 9, vec![1; 16]),
            Block::dummy(),
            Block::dummy(),
        ]);
        assert_eq!(bucket.offset_of(9), Some(0));
        bucket.valids[0] = false;
        assert_eq!(bucket.offset_of(9), None);
    }

    #[test]
    fn dummy_offsets_are_consumed_one_at_a_time() {
        let mut bucket = Bucket::new(1, 2);
        bucket.blocks[0] = Block::new(0, 4, vec![0; 16]);
        bucket.ptrs[0] = 4;

        let first = bucket.dummy_offset().unwrap();
        bucket.valids[first] = false;
        let second = bucket.dummy_offset().unwrap();
        assert_ne!(first, second);
        bucket.valids[second] = false;
        assert_eq!(bucket.dummy_offset(), None);
    }

    #[test]
    fn wire_encoding_round_trips() {
        let mut bucket = Bucket::from_blocks(vec![
            Block::new(3, 11, vec![0xC3; 48]),
            Block::dummy(),
            Block::new(0, 2, vec![0x55; 48]),
        ]);
        bucket.valids[2] = false;
        bucket.count = 2;

        let bytes = bucket.to_bytes(48).unwrap();
        assert_eq!(bytes.len(), 4 + 3 * (4 + 1 + 4 + 4 + 48));
        let decoded = Bucket::from_bytes(&bytes, 48).unwrap();
        assert_eq!(decoded, bucket);
    }

    #[test]
    fn wire_decoding_rejects_torn_buckets() {
        let bucket = Bucket::new(2, 2);
        let mut bytes = bucket.to_bytes(16).unwrap();
        bytes.pop();
        assert!(Bucket::from_bytes(&bytes, 16).is_err());
    }
}
