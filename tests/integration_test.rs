// ========================================
// INTEGRATION TESTS FOR DIMENSIONAL LEDGER (DML)
// ========================================
//
// Test Scenarios:
// 1. Three-Validator Block Production
// 2. Cross-Shard Two-Phase Commit
// 3. Byzantine Validators (Slashing & BFT Tolerance)
// 4. Checkpointing & Recovery
// 5. Export & Restore
// 6. Competing Blocks & Fork Resolution
//
// Usage:
//   cargo test --test integration_test -- --test-threads=1 --nocapture
//
// ========================================

use dml_core::Block;
use dml_healing::{Branch, ForkStrategy};
use dml_network::{CrossShardOutcome, TransferState};
use dml_node::{BlockReceipt, LedgerConfig, LedgerNode, TrafficGenerator, ValidatorEntry};
use num_bigint::BigUint;
use std::collections::BTreeSet;

fn validator(i: usize, stake: u32) -> ValidatorEntry {
    ValidatorEntry {
        address: format!("0xvalidator-{:04}", i),
        stake: BigUint::from(stake),
    }
}

fn test_config(validators: usize) -> LedgerConfig {
    let mut config = LedgerConfig::default();
    config.chain.shard_count = 2;
    config.network.shard_count = 2;
    config.network.nodes_per_shard = 2;
    config.consensus.min_stake = BigUint::from(100u32);
    config.consensus.block_reward = BigUint::from(50u32);
    config.healing.checkpoint_interval = 2;
    config.healing.fork_strategy = ForkStrategy::LongestChain;
    config.node.signing_seed = Some("5a".repeat(32));
    config.node.validators = (1..=validators).map(|i| validator(i, 100 * i as u32)).collect();
    config
}

// ========================================
// TEST 1: THREE-VALIDATOR BLOCK PRODUCTION
// ========================================
#[tokio::test]
async fn test_three_validator_production() {
    println!("\n🧪 TEST 1: Three-Validator Block Production");
    println!("================================================\n");

    let node = LedgerNode::new(test_config(3)).unwrap();
    let mut traffic = TrafficGenerator::new(6, 101).unwrap();

    for tx in traffic.batch(30).unwrap() {
        node.submit_transaction(tx).unwrap();
    }
    let produced = node.produce_pending(usize::MAX).await.unwrap();
    println!("✅ Produced {} blocks", produced.len());

    assert!(!produced.is_empty());
    assert_eq!(node.height(), produced.len() as u64);
    assert!(node.chain().read().pending_transactions().is_empty());
    assert_eq!(node.network().lock().pending_count(), 0);
    assert!(node.chain().read().is_valid());

    let confirmed: usize = produced.iter().map(|p| p.block.transactions.len()).sum();
    assert_eq!(confirmed, 30);

    // Incremental account state matches a full replay.
    let chain = node.chain().read();
    for wallet in traffic.wallets() {
        assert_eq!(chain.balance(&wallet.address), chain.balance_by_replay(&wallet.address));
        assert_eq!(chain.nonce(&wallet.address), chain.nonce_by_replay(&wallet.address));
    }
    drop(chain);

    let validators = node.active_validators();
    let blocks: u64 = validators.iter().map(|v| v.total_blocks).sum();
    assert_eq!(blocks, node.height());
    for v in &validators {
        assert_eq!(v.total_rewards, BigUint::from(50u64 * v.total_blocks));
    }
    println!("✅ Rewards credited to {} proposers", validators.iter().filter(|v| v.total_blocks > 0).count());
}

// ========================================
// TEST 2: CROSS-SHARD TWO-PHASE COMMIT
// ========================================
#[tokio::test]
async fn test_cross_shard_commit() {
    println!("\n🧪 TEST 2: Cross-Shard Two-Phase Commit");
    println!("================================================\n");

    let node = LedgerNode::new(test_config(3)).unwrap();
    let shard_count = node.config().chain.shard_count;
    let mut traffic = TrafficGenerator::new(8, 202).unwrap();

    let tx = (0..200)
        .map(|_| traffic.next_transaction().unwrap())
        .find(|tx| tx.is_cross_shard(shard_count))
        .expect("seeded traffic crosses shards");
    let id = tx.hash.clone();
    let destination = tx.shard_id_for(shard_count);

    let outcome = node.submit_cross_shard_transaction(tx).await.unwrap();
    match outcome {
        CrossShardOutcome::Committed { source, destination: to } => {
            assert_ne!(source, to);
            assert_eq!(to, destination);
        }
        other => panic!("expected a committed transfer, got {:?}", other),
    }
    assert_eq!(node.transfer_state(&id), Some(TransferState::Committed));
    assert_eq!(node.network().coordinator().held_locks(), 0);
    println!("✅ Transfer {} committed", &id[..16]);

    let produced = node.produce_pending(usize::MAX).await.unwrap();
    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].block.shard_id, destination);
    assert_eq!(node.network().lock().pending_count(), 0);

    // Same-shard traffic bypasses the coordinator.
    let local = (0..200)
        .map(|_| traffic.next_transaction().unwrap())
        .find(|tx| !tx.is_cross_shard(shard_count))
        .expect("seeded traffic stays within a shard");
    let local_id = local.hash.clone();
    assert!(matches!(
        node.submit_cross_shard_transaction(local).await.unwrap(),
        CrossShardOutcome::SameShard(_)
    ));
    assert!(node.transfer_state(&local_id).is_none());
    assert_eq!(node.network().coordinator().transfers().len(), 1);
}

#[tokio::test]
async fn test_cross_shard_disabled_leaves_pools_clean() {
    println!("\n🧪 TEST 2b: Cross-Shard Disabled");
    println!("================================================\n");

    let mut config = test_config(2);
    config.network.cross_shard_enabled = false;
    let node = LedgerNode::new(config).unwrap();
    let tx = TrafficGenerator::new(4, 7).unwrap().next_transaction().unwrap();

    assert!(node.submit_cross_shard_transaction(tx).await.is_err());
    assert!(node.chain().read().pending_transactions().is_empty());
    assert_eq!(node.network().lock().pending_count(), 0);
}

// ========================================
// TEST 3: BYZANTINE VALIDATORS
// ========================================
#[tokio::test]
async fn test_byzantine_validators() {
    println!("\n🧪 TEST 3: Byzantine Validators");
    println!("================================================\n");

    let node = LedgerNode::new(test_config(4)).unwrap();
    assert_eq!(node.healing().bft().max_faulty(), 1);
    assert!(node.system_health().healthy);

    let offender = "0xvalidator-0001";
    for _ in 0..3 {
        node.slash_validator(offender, "double sign").unwrap();
    }
    let slashed = node.consensus().lock().get_validator(offender).cloned().unwrap();
    assert!(!slashed.is_active);
    assert_eq!(slashed.slash_count, 3);
    assert_eq!(node.active_validators().len(), 3);
    assert!(node.system_health().bft_ok);
    println!("✅ Offender deactivated after 3 slashes");

    // Production continues without the deactivated validator.
    let mut traffic = TrafficGenerator::new(4, 303).unwrap();
    for tx in traffic.batch(8).unwrap() {
        node.submit_transaction(tx).unwrap();
    }
    let produced = node.produce_pending(usize::MAX).await.unwrap();
    assert!(produced.iter().all(|p| p.proposer != offender));

    node.slash_validator("0xvalidator-0002", "invalid block").unwrap();
    let health = node.system_health();
    assert!(!health.bft_ok);
    assert!(!health.healthy);
    println!("✅ Second Byzantine validator exceeds tolerance");
}

// ========================================
// TEST 4: CHECKPOINTING & RECOVERY
// ========================================
#[tokio::test]
async fn test_checkpoints_and_recovery() {
    println!("\n🧪 TEST 4: Checkpointing & Recovery");
    println!("================================================\n");

    let node = LedgerNode::new(test_config(3)).unwrap();
    let mut traffic = TrafficGenerator::new(4, 404).unwrap();
    let mut checkpoints = Vec::new();

    while node.height() < 5 {
        node.submit_transaction(traffic.next_transaction().unwrap()).unwrap();
        node.produce_pending(1).await.unwrap();
        if let Some(cp) = node.checkpoint_tick().unwrap() {
            checkpoints.push(cp.block_number);
        }
    }
    assert_eq!(checkpoints, vec![2, 4]);
    println!("✅ Checkpoints at {:?}", checkpoints);

    assert_eq!(node.recover(Some(3)).unwrap().block_number, 2);
    assert_eq!(node.recover(None).unwrap().block_number, 4);
    assert!(node.recover(Some(1)).is_err());

    let at_four = node.recover(Some(4)).unwrap();
    let block = node.chain().read().get_block(4).cloned().unwrap();
    assert_eq!(at_four.state_root, dml_node::checkpoint_root(&block));
    assert_eq!(at_four.validators.len(), 3);
}

// ========================================
// TEST 5: EXPORT & RESTORE
// ========================================
#[tokio::test]
async fn test_export_and_restore() {
    println!("\n🧪 TEST 5: Export & Restore");
    println!("================================================\n");

    let config = test_config(3);
    let node = LedgerNode::new(config.clone()).unwrap();
    let mut traffic = TrafficGenerator::new(5, 505).unwrap();
    for _ in 0..3 {
        for tx in traffic.batch(4).unwrap() {
            node.submit_transaction(tx).unwrap();
        }
        node.produce_pending(usize::MAX).await.unwrap();
        node.checkpoint_tick().unwrap();
    }
    let json = node.export_json().unwrap();
    println!("✅ Exported {} bytes at height {}", json.len(), node.height());

    let restored = LedgerNode::restore(config, &json).unwrap();
    assert_eq!(restored.height(), node.height());
    assert_eq!(restored.head().hash, node.head().hash);
    for wallet in traffic.wallets() {
        assert_eq!(restored.balance(&wallet.address), node.balance(&wallet.address));
        assert_eq!(restored.nonce(&wallet.address), node.nonce(&wallet.address));
    }
    let addresses = |n: &LedgerNode| n.active_validators().into_iter().map(|v| v.address).collect::<BTreeSet<_>>();
    assert_eq!(addresses(&restored), addresses(&node));
    assert_eq!(restored.network().lock().node_count(), node.network().lock().node_count());

    let latest = node.recover(None).unwrap();
    assert_eq!(restored.recover(None).unwrap().id, latest.id);

    // Tampering with a confirmed block is caught on restore.
    let tampered = json.replacen("\"gas_used\": 21000", "\"gas_used\": 21001", 1);
    assert_ne!(tampered, json);
    assert!(LedgerNode::restore(test_config(3), &tampered).is_err());
    println!("✅ Restored node matches the original");
}

// ========================================
// TEST 6: COMPETING BLOCKS & FORK RESOLUTION
// ========================================
#[tokio::test]
async fn test_competing_block_resolution() {
    println!("\n🧪 TEST 6: Competing Blocks & Fork Resolution");
    println!("================================================\n");

    let node = LedgerNode::new(test_config(3)).unwrap();
    let mut traffic = TrafficGenerator::new(4, 606).unwrap();
    for tx in traffic.batch(3).unwrap() {
        node.submit_transaction(tx).unwrap();
    }
    let produced = node.produce_block().await.unwrap().unwrap();
    let local = produced.block.clone();

    let genesis = node.chain().read().get_block(0).cloned().unwrap();
    let rival_validator = node
        .active_validators()
        .into_iter()
        .map(|v| v.address)
        .find(|a| *a != produced.proposer)
        .unwrap();
    let mut rival = Block::new(
        1,
        genesis.hash.clone(),
        rival_validator.clone(),
        local.shard_id,
        genesis.gas_limit,
        genesis.timestamp + 1,
    );
    let proof = node.consensus().lock().generate_proof(&rival, &rival_validator).unwrap();
    rival.attach_proof(proof);

    let receipt = node.receive_block(rival.clone()).unwrap();
    assert!(matches!(receipt, BlockReceipt::Competing { number: 1, .. }));

    let handled = node.fork_monitor_tick();
    assert_eq!(handled.len(), 1);
    assert!(handled[0].resolved);
    // Equal-length branches; ties keep the local block.
    assert_eq!(handled[0].winner, Some(Branch::First));
    assert_eq!(node.head().hash, local.hash);

    let health = node.system_health();
    assert_eq!(health.active_forks, 0);
    assert!(health.healthy);
    println!("✅ Fork resolved in favour of the local block");
}
