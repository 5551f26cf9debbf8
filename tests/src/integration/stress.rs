//! # Registry Stress Test
//!
//! 1000 filters of all three kinds, 1000 broadcast blocks, with client
//! threads draining and uninstalling at random while broadcasts run. Every
//! surviving filter must have observed each block exactly once and in order;
//! uninstalled filters must have observed a gap-free prefix.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use qc_16_eth_filters::domain::types::FilterChanges;
    use qc_16_eth_filters::{FilterId, FilterRegistry, LogCriteria};
    use rand::Rng;
    use shared_types::entities::{Address, Hash, Log, Receipt};

    const FILTERS: usize = 1000;
    const BLOCKS: u64 = 1000;
    const CLIENTS: usize = 4;

    fn block_hash(height: u64) -> Hash {
        Hash::from_low_u64_be(height)
    }

    fn block_receipts(height: u64) -> Vec<Receipt> {
        let mut log = Log::new(Address::repeat_byte(1), vec![], vec![]);
        log.block_number = height;
        vec![Receipt::new(Hash::from_low_u64_be(1_000_000 + height), vec![log])]
    }

    /// Heights observed through one drain.
    fn observed(changes: FilterChanges) -> Vec<u64> {
        match changes {
            FilterChanges::Hashes(hashes) => hashes.iter().map(|h| h.to_low_u64_be()).collect(),
            FilterChanges::Logs(logs) => logs.iter().map(|l| l.block_number).collect(),
        }
    }

    #[derive(Default)]
    struct Tracked {
        seen: Vec<u64>,
        uninstalled: bool,
    }

    #[test]
    fn test_concurrent_broadcast_drain_uninstall() {
        let registry = Arc::new(FilterRegistry::new(Duration::from_secs(3600), 4).unwrap());

        let ids: Vec<FilterId> = (0..FILTERS)
            .map(|i| match i % 3 {
                0 => registry.new_block_filter(),
                1 => registry.new_log_filter(LogCriteria::default()),
                _ => registry.new_pending_transaction_filter(),
            })
            .collect();

        let done = Arc::new(AtomicBool::new(false));

        let clients: Vec<_> = ids
            .chunks(FILTERS / CLIENTS)
            .map(|owned| {
                let owned = owned.to_vec();
                let registry = Arc::clone(&registry);
                let done = Arc::clone(&done);

                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    let mut tracked: HashMap<FilterId, Tracked> =
                        owned.iter().map(|id| (*id, Tracked::default())).collect();

                    while !done.load(Ordering::Acquire) {
                        let id = owned[rng.gen_range(0..owned.len())];
                        let Some(entry) = tracked.get_mut(&id) else {
                            continue;
                        };
                        if entry.uninstalled {
                            continue;
                        }

                        if rng.gen_ratio(1, 500) {
                            assert!(registry.uninstall(&id));
                            entry.uninstalled = true;
                        } else {
                            let changes = registry.drain(&id).unwrap();
                            entry.seen.extend(observed(changes));
                        }
                    }

                    // final drain after the last broadcast
                    for (id, entry) in tracked.iter_mut() {
                        if !entry.uninstalled {
                            let changes = registry.drain(id).unwrap();
                            entry.seen.extend(observed(changes));
                        }
                    }
                    tracked
                })
            })
            .collect();

        for height in 1..=BLOCKS {
            registry.broadcast(height, &block_receipts(height), block_hash(height));
            registry.broadcast_pending_transactions(&[Hash::from_low_u64_be(height)]);
        }
        done.store(true, Ordering::Release);

        let mut survivors = 0;
        for client in clients {
            for (id, tracked) in client.join().unwrap() {
                let prefix: Vec<u64> = (1..=tracked.seen.len() as u64).collect();
                assert_eq!(tracked.seen, prefix, "filter {id} lost or duplicated entries");

                if tracked.uninstalled {
                    assert!(!registry.contains(&id));
                } else {
                    survivors += 1;
                    assert_eq!(tracked.seen.len() as u64, BLOCKS, "filter {id} incomplete");
                }
            }
        }

        assert_eq!(registry.len(), survivors);
    }

    #[test]
    fn test_concurrent_create_while_broadcasting() {
        let registry = Arc::new(FilterRegistry::new(Duration::from_secs(3600), 4).unwrap());

        let creator = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                (0..200)
                    .map(|_| registry.new_block_filter())
                    .collect::<Vec<_>>()
            })
        };

        for height in 1..=200 {
            registry.broadcast(height, &[], block_hash(height));
        }
        let ids = creator.join().unwrap();

        // a filter installed mid-stream sees a gap-free suffix
        for id in ids {
            let seen = observed(registry.drain(&id).unwrap());
            if let (Some(first), Some(last)) = (seen.first(), seen.last()) {
                let expected: Vec<u64> = (*first..=*last).collect();
                assert_eq!(seen, expected);
                assert_eq!(*last, 200);
            }
        }
    }
}
