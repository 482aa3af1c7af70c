//! Shade Configuration
//!
//! Shared configuration crate for all Shade components.
//!
//! Handles loading configuration from:
//! 1. SHADE_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.shade/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;
use std::{env, fs};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<ShadeConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".shade";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_AUTHORITY_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 250;

const DEFAULT_TREE_DEPTH: usize = 20;
const DEFAULT_ROOT_HISTORY: usize = 100;

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_BATCH_DELAY_MS: u64 = 100;

const DEFAULT_DB_PATH: &str = "./shade-db";

const DEFAULT_PROVER_WORKERS: usize = 2;
const DEFAULT_PROOF_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadeConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub accumulator: AccumulatorConfig,
    #[serde(default)]
    pub nullifiers: NullifierConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub prover: ProverConfig,
}

/// Ledger authority endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Accumulator snapshots and operation submission
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    /// Nullifier record lookups; falls back to `authority_url`
    #[serde(default)]
    pub query_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            authority_url: DEFAULT_AUTHORITY_URL.into(),
            query_url: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
        }
    }
}

impl LedgerConfig {
    pub fn query_url(&self) -> &str {
        self.query_url.as_deref().unwrap_or(&self.authority_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_authority_url() -> String {
    DEFAULT_AUTHORITY_URL.into()
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_base_ms() -> u64 {
    DEFAULT_RETRY_BASE_MS
}

/// Commitment accumulator shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatorConfig {
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// How many recent roots stay acceptable
    #[serde(default = "default_root_history")]
    pub root_history: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_TREE_DEPTH,
            root_history: DEFAULT_ROOT_HISTORY,
        }
    }
}

fn default_depth() -> usize {
    DEFAULT_TREE_DEPTH
}
fn default_root_history() -> usize {
    DEFAULT_ROOT_HISTORY
}

/// Nullifier reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NullifierConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Default for lookups that do not say otherwise
    #[serde(default = "default_true")]
    pub check_external: bool,
}

impl Default for NullifierConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            check_external: true,
        }
    }
}

impl NullifierConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_batch_delay_ms() -> u64 {
    DEFAULT_BATCH_DELAY_MS
}
fn default_true() -> bool {
    true
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.into(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.into()
}

/// Prover mode for TOML config
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProverMode {
    #[default]
    Mock,
    Coordinator,
}

/// Artifacts of one circuit
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CircuitArtifacts {
    pub circuit: PathBuf,
    pub proving_key: PathBuf,
    #[serde(default)]
    pub verification_key: Option<PathBuf>,
    /// Expected number of public signals, checked after proving
    #[serde(default)]
    pub public_signals: Option<usize>,
}

/// Proving configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default)]
    pub mode: ProverMode,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub coordinator_url: Option<String>,
    #[serde(default = "default_proof_timeout_secs")]
    pub proof_timeout_secs: u64,
    /// Keyed by operation kind (`deposit`, `transfer`, `withdraw`, `audit`)
    #[serde(default)]
    pub circuits: BTreeMap<String, CircuitArtifacts>,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            mode: ProverMode::Mock,
            workers: DEFAULT_PROVER_WORKERS,
            coordinator_url: None,
            proof_timeout_secs: DEFAULT_PROOF_TIMEOUT_SECS,
            circuits: BTreeMap::new(),
        }
    }
}

fn default_workers() -> usize {
    DEFAULT_PROVER_WORKERS
}
fn default_proof_timeout_secs() -> u64 {
    DEFAULT_PROOF_TIMEOUT_SECS
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(key: &str, field: &mut Option<String>) {
    if let Ok(v) = env::var(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {key}={v}"),
        }
    }
}

/// Check if env var is set to a truthy value ("1" or "true")
fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl ShadeConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHADE_CONFIG env var
        if let Ok(path) = env::var("SHADE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("SHADE_CONFIG points at missing file {}", path.display());
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.shade/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Ledger
        env_string("SHADE_AUTHORITY_URL", &mut self.ledger.authority_url);
        env_option_string("SHADE_QUERY_URL", &mut self.ledger.query_url);
        env_parse("SHADE_REQUEST_TIMEOUT_MS", &mut self.ledger.request_timeout_ms);
        env_parse("SHADE_MAX_RETRIES", &mut self.ledger.max_retries);

        // Accumulator
        env_parse("SHADE_TREE_DEPTH", &mut self.accumulator.depth);

        // Nullifiers
        env_parse("SHADE_SYNC_BATCH_SIZE", &mut self.nullifiers.batch_size);
        env_parse("SHADE_SYNC_BATCH_DELAY_MS", &mut self.nullifiers.batch_delay_ms);
        if let Some(v) = env_bool("SHADE_CHECK_EXTERNAL") {
            self.nullifiers.check_external = v;
        }

        // Database
        env_string("SHADE_DB_PATH", &mut self.database.path);

        // Prover
        if let Ok(v) = env::var("SHADE_PROVER_MODE") {
            self.prover.mode = match v.to_ascii_lowercase().as_str() {
                "coordinator" => ProverMode::Coordinator,
                _ => ProverMode::Mock,
            };
        }
        env_parse("SHADE_PROVER_WORKERS", &mut self.prover.workers);
        env_option_string("SHADE_COORDINATOR_URL", &mut self.prover.coordinator_url);
        env_parse("SHADE_PROOF_TIMEOUT_SECS", &mut self.prover.proof_timeout_secs);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.prover.coordinator_url = Some("http://127.0.0.1:8090".into());
        sample.prover.circuits.insert(
            "transfer".into(),
            CircuitArtifacts {
                circuit: "circuits/transfer.json".into(),
                proving_key: "circuits/transfer.pk".into(),
                verification_key: Some("circuits/transfer.vk".into()),
                public_signals: Some(5),
            },
        );
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static ShadeConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Try to get the global config instance.
    ///
    /// Returns `None` if config hasn't been initialized yet.
    pub fn try_global() -> Option<&'static ShadeConfig> {
        GLOBAL_CONFIG.get()
    }

    /// Initialize the global config with a specific instance.
    ///
    /// Returns `Err(config)` if already initialized.
    pub fn set_global(config: ShadeConfig) -> Result<(), ShadeConfig> {
        GLOBAL_CONFIG.set(config)
    }
}

/// Shorthand for `ShadeConfig::global()`.
#[inline]
pub fn global_config() -> &'static ShadeConfig {
    ShadeConfig::global()
}

// ============================================================================
// Parsed Config (lazy-initialized constants)
// ============================================================================

/// Pre-parsed sync settings - access fields directly like a constant.
///
/// # Example
/// ```ignore
/// use shade_config::SYNC;
///
/// let pause = SYNC.batch_delay; // Duration - no function call!
/// ```
pub static SYNC: LazyLock<SyncRuntime> = LazyLock::new(|| {
    let cfg = ShadeConfig::global();
    SyncRuntime {
        batch_size: cfg.nullifiers.batch_size.max(1),
        batch_delay: cfg.nullifiers.batch_delay(),
        check_external: cfg.nullifiers.check_external,
    }
});

/// Pre-parsed nullifier sync settings.
#[derive(Debug, Clone, Copy)]
pub struct SyncRuntime {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub check_external: bool,
}

// ============================================================================
// Tests
// ============================================================================
