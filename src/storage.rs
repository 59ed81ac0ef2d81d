// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Bucket storage abstractions for Ring ORAM.
//!
//! The ORAM core never mutates a bucket in place at the server: every
//! touched bucket is fetched, mutated client-side, and written back
//! wholesale, so a network-backed transport can replace the in-memory
//! containers here without changing the algorithm.

use crate::{bucket::Bucket, OramError, Position};

/// An indexed, fixed-capacity container of buckets held by the untrusted
/// server.
pub trait ServerStorage {
    /// Resizes the container to `buckets` positions, clearing all contents.
    fn set_capacity(&mut self, buckets: usize);

    /// The number of bucket positions held.
    fn capacity(&self) -> usize;

    /// Fetches a copy of the bucket at `position`.
    fn get_bucket(&mut self, position: Position) -> Result<Bucket, OramError>;

    /// Replaces the bucket at `position`.
    fn set_bucket(&mut self, position: Position, bucket: Bucket) -> Result<(), OramError>;
}

/// A simple `ServerStorage` that keeps its buckets in a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: Vec<Bucket>,
}

impl MemoryStorage {
    /// An empty storage; the ORAM sizes it through
    /// [`ServerStorage::set_capacity`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServerStorage for MemoryStorage {
    fn set_capacity(&mut self, buckets: usize) {
        self.buckets = vec![Bucket::new(0, 0); buckets];
    }

    fn capacity(&self) -> usize {
        self.buckets.len()
    }

    fn get_bucket(&mut self, position: Position) -> Result<Bucket, OramError> {
        self.buckets
            .get(position)
            .cloned()
            .ok_or(OramError::PositionOutOfRangeError)
    }

    fn set_bucket(&mut self, position: Position, bucket: Bucket) -> Result<(), OramError> {
        let slot = self
            .buckets
            .get_mut(position)
            .ok_or(OramError::PositionOutOfRangeError)?;
        *slot = bucket;
        Ok(())
    }
}

/// A `ServerStorage` that counts accesses and records the ordered sequence
/// of fetched positions — the view an honest-but-curious server has of the
/// protocol. Useful for benchmarking and for access-pattern tests.
#[derive(Debug, Default)]
pub struct CountAccessesStorage {
    data: MemoryStorage,
    /// `reads[p]` tracks the total number of fetches of position `p`.
    pub reads: Vec<u64>,
    /// `writes[p]` tracks the total number of write-backs to position `p`.
    pub writes: Vec<u64>,
    /// Every fetched position, in order.
    pub trace: Vec<Position>,
}

impl CountAccessesStorage {
    /// An empty storage; the ORAM sizes it through
    /// [`ServerStorage::set_capacity`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The total number of bucket fetches.
    pub fn get_read_count(&self) -> u64 {
        self.reads.iter().sum()
    }

    /// The total number of bucket write-backs.
    pub fn get_write_count(&self) -> u64 {
        self.writes.iter().sum()
    }
}

impl ServerStorage for CountAccessesStorage {
    fn set_capacity(&mut self, buckets: usize) {
        self.data.set_capacity(buckets);
        self.reads = vec![0; buckets];
        self.writes = vec![0; buckets];
        self.trace.clear();
    }

    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn get_bucket(&mut self, position: Position) -> Result<Bucket, OramError> {
        log::debug!("physical read -- {}", position);

        if let Some(reads) = self.reads.get_mut(position) {
            *reads += 1;
            self.trace.push(position);
        }
        self.data.get_bucket(position)
    }

    fn set_bucket(&mut self, position: Position, bucket: Bucket) -> Result<(), OramError> {
        log::debug!("physical write -- {}", position);

        if let Some(writes) = self.writes.get_mut(position) {
            *writes += 1;
        }
        self.data.set_bucket(position, bucket)
    }
}
