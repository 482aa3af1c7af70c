//! Command implementations for the `shade` binary.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use shade_config::{ProverMode, SYNC, global_config};
use shade_core::prover::CoordinatorConfig;
use shade_core::{
    ArtifactRegistry, CoordinatorProver, HttpLedgerClient, MockProver, NoteBook, NullifierLedger,
    NullifierTracker, OperationRequest, ProofPipeline, ProverService, RocksNullifierStore,
    TrackerConfig, compute_overview,
};
use shade_privacy::{Chain, Field, Note, NoteFields, TokenDescriptor, TokenId, token_id_of};

pub fn token_id(chain: &str, symbol: &str, decimals: &str, address: &str) -> Result<()> {
    let descriptor = TokenDescriptor {
        chain: chain.parse::<Chain>()?,
        symbol: symbol.to_string(),
        decimals: decimals
            .parse()
            .with_context(|| format!("decimals must fit in a u8, got {decimals:?}"))?,
        address: address.to_string(),
    };

    println!("{}", token_id_of(&descriptor));
    Ok(())
}

fn build_note(amount: &str, token_id: &str, owner_key: &str, memo: Option<&str>) -> Result<Note> {
    let fields = NoteFields {
        amount: amount
            .parse()
            .with_context(|| format!("amount must be an unsigned integer, got {amount:?}"))?,
        token_id: token_id.parse::<TokenId>()?,
        owner_key: owner_key.parse::<Field>()?,
        memo: memo.map(str::parse::<Field>).transpose()?,
    };
    Ok(Note::build(fields, &mut rand::thread_rng()))
}

/// Prints the bare note on stdout so it can be fed to `deposit` and
/// `overview`; commitment and nullifier go to stderr.
pub fn note(amount: &str, token_id: &str, owner_key: &str, memo: Option<&str>) -> Result<()> {
    let note = build_note(amount, token_id, owner_key, memo)?;

    println!("{}", serde_json::to_string_pretty(&note)?);
    eprintln!("commitment: {}", note.commitment());
    eprintln!("nullifier:  {}", note.nullifier());
    Ok(())
}

fn http_ledger() -> Result<HttpLedgerClient> {
    Ok(HttpLedgerClient::new(&global_config().ledger)?)
}

/// Tracker over `ledger` with the RocksDB cache.
fn open_tracker<Q: NullifierLedger>(ledger: Q) -> Result<NullifierTracker<Q>> {
    let path = &global_config().database.path;
    let store = RocksNullifierStore::open(path)
        .with_context(|| format!("opening nullifier cache at {path}"))?;

    info!("nullifier cache at {}", path);
    Ok(NullifierTracker::new(
        ledger,
        Arc::new(store),
        TrackerConfig {
            batch_size: SYNC.batch_size,
            batch_delay: SYNC.batch_delay,
        },
    ))
}

fn start_prover() -> Result<ProverService> {
    let config = &global_config().prover;
    let service = match config.mode {
        ProverMode::Mock => ProverService::start(MockProver::new(), config.workers)?,
        ProverMode::Coordinator => ProverService::start(
            CoordinatorProver::new(CoordinatorConfig::from(config)),
            config.workers,
        )?,
    };
    info!("prover: {:?} mode, {} workers", config.mode, service.workers());
    Ok(service)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("decoding {path}"))
}

pub async fn overview(path: &str, cache_only: bool) -> Result<()> {
    let notes: Vec<Note> = read_json(path)?;

    let tracker = open_tracker(http_ledger()?)?;
    let overview = compute_overview(&tracker, &notes, SYNC.check_external && !cache_only).await?;

    if overview.unknown_count() > 0 {
        eprintln!(
            "{} notes have unknown status (ledger unreachable)",
            overview.unknown_count()
        );
    }
    println!("{}", serde_json::to_string_pretty(&overview)?);
    Ok(())
}

pub async fn sync(nullifiers: &[String]) -> Result<()> {
    let ledger = http_ledger()?;
    if !ledger.health_check().await {
        warn!("ledger authority at {} reports unhealthy", ledger.authority_url());
    }
    let tracker = open_tracker(ledger)?;
    let report = tracker.sync_batch(nullifiers).await;

    for batch in &report.batches {
        println!(
            "batch {}: {} synced, {} failed",
            batch.batch, batch.synced, batch.failed
        );
    }
    println!("{} synced, {} failed", report.synced, report.failed);

    if report.failed > 0 {
        anyhow::bail!("{} nullifiers could not be synced", report.failed);
    }
    Ok(())
}

/// Prove a deposit of the note in `note_path`; submit it when asked.
pub async fn deposit(note_path: &str, nonce: &str, submit: bool) -> Result<()> {
    let note: Note = read_json(note_path)?;
    let nonce = nonce.parse::<Field>()?;

    let config = global_config();
    let ledger = Arc::new(http_ledger()?);
    let pipeline = ProofPipeline::new(
        Arc::clone(&ledger),
        Arc::new(open_tracker(Arc::clone(&ledger))?),
        start_prover()?,
        ArtifactRegistry::from_config(&config.prover, ".")?,
        Arc::new(NoteBook::new()),
        config.accumulator.depth,
    );

    let prepared = pipeline
        .prepare(OperationRequest::deposit(note, nonce))
        .await?;
    println!("{}", serde_json::to_string_pretty(&prepared.payload)?);

    if submit {
        let receipt = pipeline.submit(&prepared).await?;
        println!("submitted: {}", receipt.signature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    const TOKEN: &str = "0x05";
    const OWNER: &str = "0x07";

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) {
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    #[test]
    fn test_note_output_feeds_deposit_and_overview() {
        let dir = TempDir::new().unwrap();
        let note = build_note("1000", TOKEN, OWNER, Some("3")).unwrap();

        let note_path = dir.path().join("note.json");
        write_json(&note_path, &note);
        let read: Note = read_json(note_path.to_str().unwrap()).unwrap();
        assert_eq!(read, note);
        assert_eq!(read.commitment(), note.commitment());

        let list_path = dir.path().join("notes.json");
        write_json(&list_path, &vec![note.clone(), note.clone()]);
        let notes: Vec<Note> = read_json(list_path.to_str().unwrap()).unwrap();
        assert_eq!(notes, vec![note.clone(), note]);
    }

    #[test]
    fn test_note_amount_above_u64() {
        let max = u128::MAX.to_string();
        let note = build_note(&max, TOKEN, OWNER, None).unwrap();
        assert_eq!(note.amount.as_u128(), u128::MAX);

        let rendered = serde_json::to_string_pretty(&note).unwrap();
        let back: Note = serde_json::from_str(&rendered).unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn test_note_rejects_bad_amount() {
        assert!(build_note("-5", TOKEN, OWNER, None).is_err());
        assert!(build_note("1000", TOKEN, "owner", None).is_err());
    }
}
