//! # Filter Pipeline Integration
//!
//! Drives the full ingestion path through the shared bus:
//!
//! 1. **Receipts + inclusion list → Aggregator**: ordered selection
//! 2. **Selection + completion + pending block → Filter Manager**: join and
//!    finalize
//! 3. **Filter Manager → Registry**: broadcast to client filters
//! 4. **Client → FilterApi**: poll the buffered results

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use qc_16_eth_filters::domain::types::{FilterAddress, FilterChanges};
    use qc_16_eth_filters::{FilterApi, FilterConfig, FilterService, InMemoryLogStore, LogCriteria};
    use shared_bus::{BlockchainEvent, EventPublisher};
    use shared_types::entities::{
        Address, BlockCompletion, Hash, InclusionList, Log, PendingBlock, Receipt,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn tx(n: u64) -> Hash {
        Hash::from_low_u64_be(0x1000 + n)
    }

    fn block_hash(height: u64) -> Hash {
        Hash::from_low_u64_be(0xb000 + height)
    }

    /// Receipt with one log emitted by `address`
    fn receipt(n: u64, address: u8) -> Receipt {
        let log = Log::new(Address::repeat_byte(address), vec![Hash::repeat_byte(0xee)], vec![]);
        Receipt::new(tx(n), vec![log])
    }

    fn start_service() -> FilterService {
        let config = FilterConfig {
            filter_timeout: Duration::from_secs(60),
            ..FilterConfig::default()
        };
        let mut service =
            FilterService::standalone(config, Arc::new(InMemoryLogStore::new())).unwrap();
        service.start().unwrap();
        service
    }

    /// Publish every event the chain emits for one block.
    ///
    /// `batches` are published before `list_at` and after it, in order.
    async fn publish_block(
        service: &FilterService,
        height: u64,
        batches: Vec<Vec<Receipt>>,
        order: &[u64],
        list_at: usize,
    ) {
        let bus = service.bus();
        let list = BlockchainEvent::InclusionListFinalized(InclusionList {
            height,
            round: 1,
            tx_hashes: order.iter().map(|n| tx(*n)).collect(),
        });

        let mut events: Vec<BlockchainEvent> = batches
            .into_iter()
            .map(|receipts| BlockchainEvent::ReceiptsProduced {
                height,
                round: 1,
                receipts,
            })
            .collect();
        events.insert(list_at.min(events.len()), list);
        events.push(BlockchainEvent::PendingBlockProposed(PendingBlock {
            hash: block_hash(height),
            height,
        }));
        events.push(BlockchainEvent::BlockCompleted(BlockCompletion::success(height)));

        for event in events {
            bus.publish(event).await;
        }
    }

    /// Poll until the filter reports `expected` entries or the deadline hits.
    async fn poll_until(api: &FilterApi, id: &str, expected: usize) -> FilterChanges {
        let mut collected: Option<FilterChanges> = None;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

        while tokio::time::Instant::now() < deadline {
            let changes = api.get_filter_changes(id).unwrap();
            collected = Some(match (collected.take(), changes) {
                (None, changes) => changes,
                (Some(FilterChanges::Hashes(mut a)), FilterChanges::Hashes(b)) => {
                    a.extend(b);
                    FilterChanges::Hashes(a)
                }
                (Some(FilterChanges::Logs(mut a)), FilterChanges::Logs(b)) => {
                    a.extend(b);
                    FilterChanges::Logs(a)
                }
                (Some(other), _) => other,
            });
            if collected.as_ref().map_or(0, FilterChanges::len) >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        collected.unwrap()
    }

    // =============================================================================
    // INTEGRATION TESTS
    // =============================================================================

    /// Logs arrive in inclusion-list order with finalized metadata
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_logs_follow_inclusion_order() {
        let service = start_service();
        let api = service.api().clone();
        let id = api.new_filter(LogCriteria::default()).unwrap().to_string();

        // A arrives first, then the list [C, A, B], then B and C together
        publish_block(
            &service,
            1,
            vec![vec![receipt(1, 1)], vec![receipt(2, 1), receipt(3, 1)]],
            &[3, 1, 2],
            1,
        )
        .await;

        let changes = poll_until(&api, &id, 3).await;
        let logs = changes.as_logs().unwrap();
        assert_eq!(logs.len(), 3);

        let hashes: Vec<Hash> = logs.iter().map(|l| l.transaction_hash).collect();
        assert_eq!(hashes, vec![tx(3), tx(1), tx(2)]);
        for (i, log) in logs.iter().enumerate() {
            assert_eq!(log.transaction_index, i as u64);
            assert_eq!(log.log_index, i as u64);
            assert_eq!(log.block_number, 1);
            assert_eq!(log.block_hash, block_hash(1));
        }
    }

    /// Block filters see every completed block once, in order
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_filter_across_blocks() {
        let service = start_service();
        let api = service.api().clone();
        let id = api.new_block_filter().unwrap().to_string();

        for height in 1..=5u64 {
            let base = height * 10;
            publish_block(
                &service,
                height,
                vec![vec![receipt(base, 1)], vec![receipt(base + 1, 2)]],
                &[base + 1, base],
                0,
            )
            .await;
        }

        let changes = poll_until(&api, &id, 5).await;
        let expected: Vec<Hash> = (1..=5).map(block_hash).collect();
        assert_eq!(changes.as_hashes().unwrap(), &expected[..]);
    }

    /// Address criteria select only matching logs; failed blocks are ignored
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_address_filter_and_failed_block() {
        let service = start_service();
        let api = service.api().clone();
        let criteria = LogCriteria::default()
            .with_address(FilterAddress::Single(Address::repeat_byte(2)));
        let id = api.new_filter(criteria).unwrap().to_string();
        let blocks = api.new_block_filter().unwrap().to_string();

        // block 1 fails: nothing reaches the filters
        let bus = service.bus();
        bus.publish(BlockchainEvent::InclusionListFinalized(InclusionList {
            height: 1,
            round: 1,
            tx_hashes: vec![tx(1)],
        }))
        .await;
        bus.publish(BlockchainEvent::ReceiptsProduced {
            height: 1,
            round: 1,
            receipts: vec![receipt(1, 2)],
        })
        .await;
        bus.publish(BlockchainEvent::PendingBlockProposed(PendingBlock {
            hash: block_hash(1),
            height: 1,
        }))
        .await;
        bus.publish(BlockchainEvent::BlockCompleted(BlockCompletion::failed(
            1,
            "rejected by consensus",
        )))
        .await;

        publish_block(
            &service,
            2,
            vec![vec![receipt(20, 1), receipt(21, 2), receipt(22, 2)]],
            &[20, 21, 22],
            1,
        )
        .await;

        let changes = poll_until(&api, &blocks, 1).await;
        assert_eq!(changes.as_hashes().unwrap(), &[block_hash(2)]);

        let logs = poll_until(&api, &id, 2).await;
        let logs = logs.as_logs().unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.address == Address::repeat_byte(2)));
        assert_eq!(logs[0].transaction_index, 1);
        assert_eq!(logs[1].transaction_index, 2);
    }

    /// Pending transaction filters receive mempool hashes
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pending_transactions_reach_filter() {
        let service = start_service();
        let api = service.api().clone();
        let id = api.new_pending_transaction_filter().unwrap().to_string();

        service
            .bus()
            .publish(BlockchainEvent::PendingTransactions {
                hashes: vec![tx(7), tx(8)],
            })
            .await;

        let changes = poll_until(&api, &id, 2).await;
        assert_eq!(changes.as_hashes().unwrap(), &[tx(7), tx(8)]);
    }
}
