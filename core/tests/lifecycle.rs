//! Deposit, transfer and overview against an in-process ledger, with the
//! nullifier cache on RocksDB.

use std::fs;
use std::sync::Arc;

use num_bigint::BigUint;
use shade_config::CircuitArtifacts;
use shade_core::{
    AccumulatorAuthority, ArtifactRegistry, CheckMode, InMemoryLedger, MessageStore, MockProver,
    NoteBook, NullifierTracker, OperationKind, OperationRequest, ProofPipeline, ProverService,
    RocksNullifierStore, SpendInput, SpentStatus, TrackerConfig, compute_overview,
};
use shade_privacy::poseidon::hash_pair;
use shade_privacy::{
    Chain, ContentEnvelope, Field, MessageKind, Note, NoteFields, Randomness,
    TokenDescriptor, token_id_of,
};
use tempfile::TempDir;

const DEPTH: usize = 8;

fn usdc() -> TokenDescriptor {
    TokenDescriptor {
        chain: Chain::Evm { chain_id: 1 },
        symbol: "USDC".to_string(),
        decimals: 6,
        address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
    }
}

fn note(amount: u128, owner: u64, r: u64) -> Note {
    Note::with_randomness(
        NoteFields {
            amount,
            token_id: token_id_of(&usdc()),
            owner_key: Field::from_u64(owner),
            memo: None,
        },
        Randomness::new(Field::from_u64(r)),
    )
}

fn artifacts(dir: &TempDir) -> ArtifactRegistry {
    let mut registry = ArtifactRegistry::new(dir.path());
    for kind in OperationKind::ALL {
        fs::write(dir.path().join(format!("{kind}.json")), b"{}").unwrap();
        fs::write(dir.path().join(format!("{kind}.zkey")), b"key").unwrap();
        registry.register(
            kind,
            CircuitArtifacts {
                circuit: format!("{kind}.json").into(),
                proving_key: format!("{kind}.zkey").into(),
                verification_key: None,
                public_signals: None,
            },
        );
    }
    registry
}

#[test]
fn single_leaf_root_uses_zero_padding() {
    let acc = AccumulatorAuthority::new(2, 4).unwrap();
    let c0 = note(1, 1, 1).commitment();
    acc.append(c0).unwrap();

    let expected = hash_pair(&hash_pair(&c0.to_field(), &Field::ZERO), &Field::ZERO);
    assert_eq!(acc.root(), expected);
    assert_eq!(AccumulatorAuthority::new(2, 4).unwrap().root(), Field::ZERO);
}

#[tokio::test]
async fn deposit_transfer_and_overview() {
    let artifact_dir = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();

    let ledger = Arc::new(InMemoryLedger::new(DEPTH, 16).unwrap());
    let store = Arc::new(RocksNullifierStore::open(db_dir.path()).unwrap());
    let tracker = Arc::new(NullifierTracker::new(
        Arc::clone(&ledger),
        store,
        TrackerConfig::default(),
    ));
    let pipeline = ProofPipeline::new(
        Arc::clone(&ledger),
        Arc::clone(&tracker),
        ProverService::start(MockProver::new(), 2).unwrap(),
        artifacts(&artifact_dir),
        Arc::new(NoteBook::new()),
        DEPTH,
    );

    // deposit 100 to owner 1
    let funded = note(100, 1, 11);
    let deposit = pipeline
        .prepare(OperationRequest::deposit(funded.clone(), Field::from_u64(7)))
        .await
        .unwrap();
    pipeline.submit(&deposit).await.unwrap();
    assert_eq!(ledger.accumulator().next_index(), 1);

    let spent_hex = funded.nullifier().to_hex();
    assert_eq!(
        tracker.status(&spent_hex, CheckMode::CheckExternal).await.unwrap(),
        SpentStatus::Unused
    );

    // owner 1 pays 25 to owner 2 and keeps 75
    let paid = note(25, 2, 12);
    let change = note(75, 1, 13);
    let transfer = pipeline
        .prepare(OperationRequest::transfer(
            SpendInput {
                note: funded.clone(),
                index: 0,
            },
            vec![paid.clone(), change.clone()],
        ))
        .await
        .unwrap();
    let receipt = pipeline.submit(&transfer).await.unwrap();

    assert_eq!(ledger.accumulator().next_index(), 3);
    assert_eq!(
        tracker.status(&spent_hex, CheckMode::CacheOnly).await.unwrap(),
        SpentStatus::Used
    );
    let record = tracker.cached(&spent_hex).unwrap().unwrap();
    assert_eq!(record.spending_tx_ref.as_deref(), Some(receipt.signature.as_str()));

    // the new commitments sit at the next two leaves
    let snapshot = ledger.accumulator().snapshot();
    assert_eq!(snapshot.leaf(1), Some(paid.commitment()));
    assert_eq!(snapshot.leaf(2), Some(change.commitment()));
    assert!(snapshot.proof(2).unwrap().verify());

    let mine = vec![funded, change];
    let overview = compute_overview(&tracker, &mine, true).await.unwrap();
    assert_eq!(overview.total_count, 2);
    assert_eq!(overview.spendable_count, 1);
    assert_eq!(overview.balance, BigUint::from(75u32));
    assert_eq!(overview.unknown_count(), 0);
    assert_eq!(
        overview.balances_by_token.get(&token_id_of(&usdc())),
        Some(&BigUint::from(75u32))
    );
}

#[tokio::test]
async fn cached_status_survives_reopen() {
    let db_dir = TempDir::new().unwrap();
    let ledger = Arc::new(InMemoryLedger::new(DEPTH, 16).unwrap());
    let n = note(5, 1, 1).nullifier();
    ledger.record_external_spend(n, "tx-1");

    {
        let store = Arc::new(RocksNullifierStore::open(db_dir.path()).unwrap());
        let tracker = NullifierTracker::new(Arc::clone(&ledger), store, TrackerConfig::default());
        let report = tracker.sync_batch(&[n.to_hex()]).await;
        assert_eq!(report.synced, 1);
    }

    ledger.set_available(false);
    let store = Arc::new(RocksNullifierStore::open(db_dir.path()).unwrap());
    let tracker = NullifierTracker::new(Arc::clone(&ledger), store, TrackerConfig::default());
    assert!(tracker.is_spent(&n.to_hex(), true).await.unwrap());
}

#[test]
fn note_delivery_is_idempotent_by_content_hash() {
    let store = MessageStore::new();
    let recipient = note(1, 2, 1).owner_key;
    let envelope = ContentEnvelope::seal(recipient, None, MessageKind::Note, vec![1, 2, 3]);

    let hash = store.submit(envelope.clone()).unwrap();
    assert!(store.submit(envelope).is_err());
    assert_eq!(store.inbox(&recipient).len(), 1);
    assert!(store.get(&hash).is_some());
}
