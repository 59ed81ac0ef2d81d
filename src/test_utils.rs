// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Common test utilities for exercising the ORAM core against its storage
//! backends.

use crate::ring_oram::{Parameters, RingOram};
use crate::storage::{CountAccessesStorage, MemoryStorage, ServerStorage};
use crate::{Address, BlockSize};
use duplicate::duplicate_item;
use rand::{rngs::StdRng, Rng, SeedableRng};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A storage backend the correctness workloads can instantiate.
pub(crate) trait TestableStorage: ServerStorage + Sized {
    fn create() -> Self;
}

#[duplicate_item(
    storage_type;
    [MemoryStorage];
    [CountAccessesStorage];
)]
impl TestableStorage for storage_type {
    fn create() -> Self {
        storage_type::new()
    }
}

fn build_oram<T: TestableStorage>(
    block_size: BlockSize,
    capacity: usize,
    rng: &mut StdRng,
) -> RingOram<T> {
    let params = Parameters {
        capacity,
        block_size,
        ..Parameters::default()
    };
    RingOram::with_parameters(params, T::create(), rng).unwrap()
}

/// Tests the correctness of a `RingOram` over storage `T` on a workload of
/// random reads and writes, against a mirror array.
pub(crate) fn test_correctness_random_workload<T: TestableStorage>(
    block_size: BlockSize,
    capacity: usize,
    num_operations: u32,
) {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0);

    let mut oram = build_oram::<T>(block_size, capacity, &mut rng);
    let mut mirror = vec![vec![0u8; block_size]; capacity];

    for _ in 0..num_operations {
        let address = rng.gen_range(0..capacity);
        let read_versus_write: bool = rng.gen();

        if read_versus_write {
            assert_eq!(
                oram.read(address as Address, &mut rng).unwrap(),
                mirror[address]
            );
        } else {
            let payload: Vec<u8> = (0..block_size).map(|_| rng.gen()).collect();
            oram.write(address as Address, &payload, &mut rng).unwrap();
            mirror[address] = payload;
        }
    }

    for address in 0..capacity {
        assert_eq!(
            oram.read(address as Address, &mut rng).unwrap(),
            mirror[address],
            "{address}"
        );
    }
}

/// Tests the correctness of a `RingOram` over storage `T` on repeated
/// sequential passes over the address space.
pub(crate) fn test_correctness_linear_workload<T: TestableStorage>(
    block_size: BlockSize,
    capacity: usize,
    num_operations: u32,
) {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0);

    let mut oram = build_oram::<T>(block_size, capacity, &mut rng);
    let mut mirror = vec![vec![0u8; block_size]; capacity];

    let num_passes = num_operations as usize / capacity;
    for _ in 0..num_passes {
        for address in 0..capacity {
            let read_versus_write: bool = rng.gen();

            if read_versus_write {
                assert_eq!(
                    oram.read(address as Address, &mut rng).unwrap(),
                    mirror[address]
                );
            } else {
                let payload: Vec<u8> = (0..block_size).map(|_| rng.gen()).collect();
                oram.write(address as Address, &payload, &mut rng).unwrap();
                mirror[address] = payload;
            }
        }
    }

    for address in 0..capacity {
        assert_eq!(
            oram.read(address as Address, &mut rng).unwrap(),
            mirror[address],
            "{address}"
        );
    }
}

macro_rules! create_correctness_test {
    ($function_name:ident, $storage_type: ident, $block_size: expr, $capacity:expr, $iterations_to_test: expr) => {
        paste::paste! {
            #[test]
            fn [<$function_name _ $storage_type:snake _ $capacity _ $block_size _ $iterations_to_test>]() {
                $function_name::<$storage_type>($block_size, $capacity, $iterations_to_test);
            }
        }
    };
}

macro_rules! create_correctness_tests_for_workload_and_storage_type {
    ($function_name: ident, $storage_type: ident) => {
        create_correctness_test!($function_name, $storage_type, 16, 2, 100);
        create_correctness_test!($function_name, $storage_type, 16, 16, 100);
        create_correctness_test!($function_name, $storage_type, 64, 16, 100);
        create_correctness_test!($function_name, $storage_type, 16, 32, 100);
        // Block size 64 bytes, block capacity 32 blocks, testing with 1000 operations
        create_correctness_test!($function_name, $storage_type, 64, 32, 1000);
    };
}

macro_rules! create_correctness_tests_for_storage_type {
    ($storage_type: ident) => {
        create_correctness_tests_for_workload_and_storage_type!(
            test_correctness_linear_workload,
            $storage_type
        );
        create_correctness_tests_for_workload_and_storage_type!(
            test_correctness_random_workload,
            $storage_type
        );
    };
}

pub(crate) use create_correctness_test;
pub(crate) use create_correctness_tests_for_storage_type;
pub(crate) use create_correctness_tests_for_workload_and_storage_type;
