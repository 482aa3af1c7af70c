use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info};
use shade_config::{CircuitArtifacts, ProverConfig};
use shade_privacy::Field;

use super::OperationKind;
use crate::error::{CoreError, Result};

/// Artifact bytes of one circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedArtifacts {
    pub circuit: Vec<u8>,
    pub proving_key: Vec<u8>,
    pub verification_key: Option<Vec<u8>>,
    pub public_signals: Option<usize>,
}

/// Circuit, proving key and verification key per operation kind.
///
/// Files are read on first use and cached. Relative paths resolve against
/// `base_dir`.
#[derive(Debug)]
pub struct ArtifactRegistry {
    base_dir: PathBuf,
    entries: BTreeMap<OperationKind, CircuitArtifacts>,
    loaded: DashMap<OperationKind, Arc<LoadedArtifacts>>,
}

impl ArtifactRegistry {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            entries: BTreeMap::new(),
            loaded: DashMap::new(),
        }
    }

    /// Registry for the `[prover.circuits.<kind>]` tables.
    pub fn from_config(config: &ProverConfig, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut registry = Self::new(base_dir);
        for (name, artifacts) in &config.circuits {
            registry.register(name.parse()?, artifacts.clone());
        }
        info!("artifact registry: {} circuits configured", registry.entries.len());
        Ok(registry)
    }

    pub fn register(&mut self, kind: OperationKind, artifacts: CircuitArtifacts) {
        self.loaded.remove(&kind);
        self.entries.insert(kind, artifacts);
    }

    pub fn is_configured(&self, kind: OperationKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Load (or reuse) the artifacts of `kind`.
    pub fn load(&self, kind: OperationKind) -> Result<Arc<LoadedArtifacts>> {
        if let Some(hit) = self.loaded.get(&kind) {
            return Ok(Arc::clone(hit.value()));
        }

        let entry = self.entries.get(&kind).ok_or_else(|| CoreError::ArtifactMissing {
            kind: kind.to_string(),
            detail: "no circuit configured".to_string(),
        })?;

        let loaded = Arc::new(LoadedArtifacts {
            circuit: self.read(kind, &entry.circuit)?,
            proving_key: self.read(kind, &entry.proving_key)?,
            verification_key: entry
                .verification_key
                .as_deref()
                .map(|path| self.read(kind, path))
                .transpose()?,
            public_signals: entry.public_signals,
        });
        debug!("loaded {} artifacts", kind);
        self.loaded.insert(kind, Arc::clone(&loaded));
        Ok(loaded)
    }

    fn read(&self, kind: OperationKind, path: &Path) -> Result<Vec<u8>> {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        fs::read(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CoreError::ArtifactMissing {
                kind: kind.to_string(),
                detail: format!("{} not found", full.display()),
            },
            _ => CoreError::Storage(format!("reading {}: {}", full.display(), e)),
        })
    }

    /// Check the signal count against the configured expectation.
    pub fn check_public_signals(&self, kind: OperationKind, signals: &[Field]) -> Result<()> {
        match self.entries.get(&kind).and_then(|e| e.public_signals) {
            Some(expected) if expected != signals.len() => Err(CoreError::BadPublicSignals(
                format!("{kind} expects {expected} public signals, got {}", signals.len()),
            )),
            _ => Ok(()),
        }
    }
}

/// Decode prover-reported public signals (hex or decimal strings).
pub fn decode_public_signals<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Field>> {
    raw.iter()
        .enumerate()
        .map(|(i, s)| {
            s.as_ref().parse::<Field>().map_err(|e| {
                CoreError::BadPublicSignals(format!("signal {i} ({:?}): {e}", s.as_ref()))
            })
        })
        .collect()
}
