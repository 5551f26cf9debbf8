//! # Receipt Finalization
//!
//! Stamps the block linkage onto the receipts of a completed block.
//!
//! ## Algorithm
//!
//! 1. Prefix: compute each receipt's first block-wide log index
//! 2. Split: cut the receipts into contiguous ranges, one per worker
//! 3. Stamp (Parallel): every worker writes its own range in place
//!
//! Small blocks are stamped sequentially.

use rayon::prelude::*;
use rayon::ThreadPool;
use shared_types::entities::{BlockNumber, Hash, Receipt};

/// Parallel threshold - use sequential for small blocks.
pub const PARALLEL_THRESHOLD: usize = 4;

/// Stamp `receipts`, ordered as the inclusion list, with their block
/// position.
///
/// Each receipt gets `block_hash`, `block_number` and a `transaction_index`
/// equal to its position. Each log additionally gets the receipt's
/// transaction hash and a `log_index` counted across the whole block.
pub fn finalize_receipts(
    pool: &ThreadPool,
    height: BlockNumber,
    block_hash: Hash,
    receipts: &mut [Receipt],
) {
    let offsets = log_offsets(receipts);

    if receipts.len() < PARALLEL_THRESHOLD {
        for (position, (receipt, first_log)) in receipts.iter_mut().zip(&offsets).enumerate() {
            stamp(receipt, position as u64, *first_log, height, block_hash);
        }
        return;
    }

    let workers = pool.current_num_threads().max(1);
    let chunk = receipts.len().div_ceil(workers);

    pool.install(|| {
        receipts
            .par_chunks_mut(chunk)
            .zip(offsets.par_chunks(chunk))
            .enumerate()
            .for_each(|(n, (range, firsts))| {
                let start = n * chunk;
                for (i, (receipt, first_log)) in range.iter_mut().zip(firsts).enumerate() {
                    stamp(receipt, (start + i) as u64, *first_log, height, block_hash);
                }
            });
    });
}

/// Block-wide index of each receipt's first log.
fn log_offsets(receipts: &[Receipt]) -> Vec<u64> {
    receipts
        .iter()
        .scan(0u64, |next, receipt| {
            let first = *next;
            *next += receipt.logs.len() as u64;
            Some(first)
        })
        .collect()
}

fn stamp(
    receipt: &mut Receipt,
    position: u64,
    first_log: u64,
    height: BlockNumber,
    block_hash: Hash,
) {
    receipt.block_hash = block_hash;
    receipt.block_number = height;
    receipt.transaction_index = position;

    for (k, log) in receipt.logs.iter_mut().enumerate() {
        log.block_hash = block_hash;
        log.block_number = height;
        log.transaction_hash = receipt.transaction_hash;
        log.transaction_index = position;
        log.log_index = first_log + k as u64;
        log.removed = false;
    }
}
