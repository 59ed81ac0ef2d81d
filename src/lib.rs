// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An implementation of Ring ORAM over a bucketed binary tree.
//!
//! The crate exposes a single oblivious storage core, [`RingOram`], which
//! reads and writes fixed-size logical blocks through an untrusted
//! [`ServerStorage`] while revealing to the storage layer nothing beyond the
//! length of the physical access sequence. Blocks reside in buckets of
//! `Z` real plus `S` dummy slots; each bucket tracks per-slot validity and a
//! read counter, and a deterministic eviction schedule together with an
//! early-reshuffle rule keeps the client-side stash and the per-bucket dummy
//! budget bounded.
//!
//! Block payloads are encrypted with an authenticated cipher
//! ([`CryptoUtils`]) before they leave the client; the position map, the
//! stash, the encryption key, and the scheduling counters never do.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

use std::num::TryFromIntError;
use thiserror::Error;

/// The numeric type of logical block indices. The reserved value
/// [`DUMMY_ADDRESS`] marks a dummy block.
pub type Address = i64;

/// The numeric type of leaf identifiers, in `[0, num_leaves)`.
pub type Leaf = i64;

/// The numeric type of physical bucket positions, in `[0, num_buckets)`.
pub type Position = usize;

/// The numeric type used to measure the stash in blocks.
pub type StashSize = usize;

/// The numeric type used to specify the size of a block payload in bytes.
pub type BlockSize = usize;

/// The address carried by dummy blocks and unoccupied bucket slots.
pub const DUMMY_ADDRESS: Address = -1;

/// The number of real (evictable) slots per bucket, the parameter `Z` from
/// the Ring ORAM literature.
pub const DEFAULT_REAL_BLOCKS_PER_BUCKET: usize = 4;

/// The number of dummy slots per bucket, the parameter `S` from the Ring
/// ORAM literature. Each access consumes at most one slot per bucket on the
/// touched path, so `S` bounds the number of accesses a bucket survives
/// between reshuffles.
pub const DEFAULT_DUMMY_BLOCKS_PER_BUCKET: usize = 5;

/// The number of accesses between scheduled path evictions, the parameter
/// `A` from the Ring ORAM literature.
pub const DEFAULT_EVICTION_RATE: u64 = 3;

/// The default block payload size in bytes. Must be a multiple of the
/// cipher block size (16).
pub const DEFAULT_BLOCK_SIZE: BlockSize = 64;

/// The kind of logical operation performed by
/// [`RingOram::access`](crate::ring_oram::RingOram::access).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Return the block's current payload.
    Read,
    /// Replace the block's payload and return the newly installed one.
    Write,
}

/// Errors arising from ORAM protocol operations.
#[derive(Debug, Error)]
pub enum OramError {
    /// A logical block index outside `[0, N)` was passed to `access`.
    #[error("attempted to access an out-of-bounds ORAM address")]
    AddressOutOfBoundsError,

    /// A physical bucket position outside `[0, num_buckets)` reached the
    /// storage layer.
    #[error("attempted to access an out-of-range storage position")]
    PositionOutOfRangeError,

    /// The ORAM was instantiated with an unusable parameter.
    #[error("invalid ORAM configuration: {parameter_name} = {parameter_value}")]
    InvalidConfigurationError {
        /// The name of the offending parameter.
        parameter_name: String,
        /// The value it was given.
        parameter_value: String,
    },

    /// A block payload of the wrong length was passed to a write.
    #[error("block payload of {actual} bytes does not match the configured block size of {expected} bytes")]
    BlockLengthError {
        /// The configured payload size in bytes.
        expected: BlockSize,
        /// The length of the payload that was provided.
        actual: usize,
    },

    /// A serialized bucket could not be decoded.
    #[error("malformed bucket encoding: {0}")]
    WireFormatError(&'static str),

    /// The block cipher rejected an input.
    #[error(transparent)]
    CryptoError(#[from] crypto::CryptoError),

    /// Arithmetic conversion between index types failed.
    #[error("arithmetic error encountered during ORAM operation")]
    IntegerConversionError(#[from] TryFromIntError),
}

pub mod bucket;
pub mod crypto;
mod position_map;
pub mod ring_oram;
mod stash;
pub mod storage;

#[cfg(test)]
mod test_utils;

pub use crate::bucket::{Block, Bucket};
pub use crate::crypto::{CryptoError, CryptoUtils};
pub use crate::ring_oram::{Parameters, RingOram, Stats};
pub use crate::storage::{CountAccessesStorage, MemoryStorage, ServerStorage};
