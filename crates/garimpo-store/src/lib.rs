//! Garimpo Knowledge Repository
//!
//! Durable, versioned, per-label storage for learned parser and validation
//! packs.
//!
//! # On-disk layout
//!
//! One directory per (safely encoded) label under the repository root:
//!
//! ```text
//! <root>/<label>/parser.v3       # ParserPack, JSON
//! <root>/<label>/validation.v3   # ValidationPack, JSON
//! <root>/<label>/meta.v3         # label, version, gabarito digest, timestamp
//! <root>/<label>/current         # "3", the live version
//! ```
//!
//! Every write is temp-file-then-atomic-rename; `current` is renamed last,
//! so a crash mid-`put` either fully publishes a version or leaves the
//! previous one live. Older version files are kept. Entries that fail
//! structural checks on load are quarantined (directory renamed, never
//! deleted) and reported as a miss.
//!
//! # Concurrency
//!
//! `put` is serialized per label; `get` observes the latest fully
//! published entry. Readers never block writers: `get` resolves `current`
//! once and reads the version files it names, which a concurrent `put`
//! never touches.

#![warn(missing_docs)]

use garimpo_domain::{KnowledgeEntry, ParserPack, ValidationPack};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on the compiled size of a stored pattern. Patterns beyond
/// this are rejected at `put`, so execution can never blow up on them.
pub const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Errors from repository operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure
    #[error("repository I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pack failed validation at `put`
    #[error("invalid pack for {label:?}: {reason}")]
    InvalidPack {
        /// Label whose pack was rejected
        label: String,
        /// What the check found
        reason: String,
    },

    /// Serialization failure while writing an entry
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct MetaFile {
    label: String,
    version: u32,
    gabarito_digest: String,
    created_at: u64,
}

/// Filesystem-backed knowledge repository.
pub struct FsRepository {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FsRepository {
    /// Open (creating if needed) a repository rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "knowledge repository ready");
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The live entry for `label`, if one exists and passes structural
    /// checks. A corrupt entry is quarantined and reported as a miss.
    pub fn get(&self, label: &str) -> Result<Option<KnowledgeEntry>, StoreError> {
        let dir = self.label_dir(label);
        if !dir.exists() {
            debug!(label, "knowledge miss");
            return Ok(None);
        }

        match self.load_entry(label, &dir) {
            Ok(entry) => {
                debug!(label, version = entry.version, "knowledge hit");
                Ok(Some(entry))
            }
            Err(reason) => {
                warn!(label, %reason, "corrupt knowledge entry, quarantining");
                self.quarantine(&dir)?;
                Ok(None)
            }
        }
    }

    /// Publish `entry` if its version is strictly higher than the live
    /// one. Returns `true` when published, `false` on the no-op path.
    pub fn put(&self, entry: KnowledgeEntry) -> Result<bool, StoreError> {
        validate_pack(&entry.label, &entry.parser)?;

        let lock = self.label_lock(&entry.label);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let dir = self.label_dir(&entry.label);
        fs::create_dir_all(&dir)?;

        if let Some(live) = read_current_version(&dir) {
            if entry.version <= live {
                debug!(
                    label = %entry.label,
                    offered = entry.version,
                    live,
                    "put superseded, keeping live version"
                );
                return Ok(false);
            }
        }

        let meta = MetaFile {
            label: entry.label.clone(),
            version: entry.version,
            gabarito_digest: entry.gabarito_digest.clone(),
            created_at: entry.created_at,
        };
        let v = entry.version;
        write_atomic(
            &dir.join(format!("parser.v{v}")),
            &serde_json::to_vec_pretty(&entry.parser)?,
        )?;
        write_atomic(
            &dir.join(format!("validation.v{v}")),
            &serde_json::to_vec_pretty(&entry.validation)?,
        )?;
        write_atomic(
            &dir.join(format!("meta.v{v}")),
            &serde_json::to_vec_pretty(&meta)?,
        )?;
        // Publish point: readers switch to the new version here.
        write_atomic(&dir.join("current"), v.to_string().as_bytes())?;

        info!(label = %entry.label, version = v, fields = entry.parser.len(), "knowledge published");
        Ok(true)
    }

    /// Remove all knowledge for `label`
    pub fn clear(&self, label: &str) -> Result<(), StoreError> {
        let lock = self.label_lock(label);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let dir = self.label_dir(label);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            info!(label, "knowledge cleared");
        }
        Ok(())
    }

    /// The directory that holds (or would hold) `label`'s knowledge
    pub fn label_dir(&self, label: &str) -> PathBuf {
        self.root.join(encode_label(label))
    }

    fn label_lock(&self, label: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(label.to_string()).or_default().clone()
    }

    fn load_entry(&self, label: &str, dir: &Path) -> Result<KnowledgeEntry, String> {
        let current = fs::read_to_string(dir.join("current"))
            .map_err(|e| format!("no current file: {e}"))?;
        let version: u32 = current
            .trim()
            .parse()
            .map_err(|e| format!("current file is not a version: {e}"))?;

        let parser: ParserPack = read_json(&dir.join(format!("parser.v{version}")))?;
        let validation: ValidationPack = read_json(&dir.join(format!("validation.v{version}")))?;
        let meta: MetaFile = read_json(&dir.join(format!("meta.v{version}")))?;

        if meta.version != version {
            return Err(format!(
                "meta version {} disagrees with current {}",
                meta.version, version
            ));
        }
        validate_pack(label, &parser).map_err(|e| e.to_string())?;

        Ok(KnowledgeEntry {
            label: label.to_string(),
            version,
            parser,
            validation,
            gabarito_digest: meta.gabarito_digest,
            created_at: meta.created_at,
        })
    }

    fn quarantine(&self, dir: &Path) -> Result<(), StoreError> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let base = dir.display().to_string();
        let mut target = PathBuf::from(format!("{base}.quarantined.{secs}"));
        let mut attempt = 1;
        while target.exists() {
            target = PathBuf::from(format!("{base}.quarantined.{secs}.{attempt}"));
            attempt += 1;
        }
        fs::rename(dir, &target)?;
        warn!(from = %dir.display(), to = %target.display(), "entry quarantined");
        Ok(())
    }
}

/// Structural checks every pack must pass before it is trusted: each
/// pattern compiles under the size limit and carries at least one capture
/// group.
fn validate_pack(label: &str, pack: &ParserPack) -> Result<(), StoreError> {
    for (field, pattern) in pack.iter() {
        let compiled = RegexBuilder::new(pattern)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|e| StoreError::InvalidPack {
                label: label.to_string(),
                reason: format!("pattern for {field:?} does not compile: {e}"),
            })?;
        if compiled.captures_len() < 2 {
            return Err(StoreError::InvalidPack {
                label: label.to_string(),
                reason: format!("pattern for {field:?} has no capture group"),
            });
        }
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let bytes = fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("{}: {e}", path.display()))
}

/// Write via a sibling temp file and atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_current_version(dir: &Path) -> Option<u32> {
    fs::read_to_string(dir.join("current"))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Encode a label into a safe directory name. Bytes outside
/// `[A-Za-z0-9._-]` become `_`; when anything was replaced (or the label
/// reduces to dots) a short digest of the original label is appended so
/// distinct labels never collide.
fn encode_label(label: &str) -> String {
    let encoded: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let lossless = encoded == label && !encoded.is_empty() && encoded.chars().any(|c| c != '.');
    if lossless {
        encoded
    } else {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("{}-{}", encoded.trim_matches('.'), &digest[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garimpo_domain::Predicate;

    fn entry(label: &str, version: u32, pattern: &str) -> KnowledgeEntry {
        let mut parser = ParserPack::new();
        parser.insert("inscricao", pattern);
        let mut validation = ValidationPack::new();
        validation.insert(
            "inscricao",
            Predicate::FormatTemplate {
                template: "######".into(),
            },
        );
        KnowledgeEntry {
            label: label.to_string(),
            version,
            parser,
            validation,
            gabarito_digest: "d".repeat(64),
            created_at: 1_720_000_000,
        }
    }

    #[test]
    fn test_put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::open(dir.path()).unwrap();

        assert!(repo.put(entry("carteira_oab", 1, r"Inscri[cç]ão\s*:?\s*(\d{6})")).unwrap());
        let loaded = repo.get("carteira_oab").unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert!(loaded.parser.pattern("inscricao").is_some());
    }

    #[test]
    fn test_get_miss() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::open(dir.path()).unwrap();
        assert!(repo.get("nunca_visto").unwrap().is_none());
    }

    #[test]
    fn test_version_monotonicity() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::open(dir.path()).unwrap();

        assert!(repo.put(entry("l", 1, r"a(\d+)")).unwrap());
        assert!(repo.put(entry("l", 2, r"b(\d+)")).unwrap());
        assert_eq!(repo.get("l").unwrap().unwrap().version, 2);

        // Lower and equal versions are no-ops.
        assert!(!repo.put(entry("l", 1, r"c(\d+)")).unwrap());
        assert!(!repo.put(entry("l", 2, r"c(\d+)")).unwrap());
        let live = repo.get("l").unwrap().unwrap();
        assert_eq!(live.version, 2);
        assert_eq!(live.parser.pattern("inscricao"), Some(r"b(\d+)"));
    }

    #[test]
    fn test_put_rejects_pattern_without_capture() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::open(dir.path()).unwrap();
        let err = repo.put(entry("l", 1, r"\d{6}")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPack { .. }));
    }

    #[test]
    fn test_put_rejects_uncompilable_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::open(dir.path()).unwrap();
        let err = repo.put(entry("l", 1, r"(unclosed")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPack { .. }));
    }

    #[test]
    fn test_truncated_entry_is_quarantined_and_missed() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::open(dir.path()).unwrap();
        repo.put(entry("carteira_oab", 1, r"a(\d+)")).unwrap();

        // Truncate the live parser file on disk.
        let parser_file = repo.label_dir("carteira_oab").join("parser.v1");
        fs::write(&parser_file, b"{\"inscricao\": \"a(").unwrap();

        assert!(repo.get("carteira_oab").unwrap().is_none());
        assert!(!repo.label_dir("carteira_oab").exists());

        let quarantined: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".quarantined."))
            .collect();
        assert_eq!(quarantined.len(), 1);
    }

    #[test]
    fn test_clear_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRepository::open(dir.path()).unwrap();
        repo.put(entry("l", 1, r"a(\d+)")).unwrap();
        repo.clear("l").unwrap();
        assert!(repo.get("l").unwrap().is_none());
    }

    #[test]
    fn test_label_encoding_keeps_distinct_labels_apart() {
        let a = encode_label("nota/fiscal");
        let b = encode_label("nota_fiscal");
        assert_ne!(a, b);
        assert!(!a.contains('/'));
    }

    #[test]
    fn test_label_encoding_is_stable() {
        assert_eq!(encode_label("carteira_oab"), "carteira_oab");
        assert_eq!(encode_label("é doc"), encode_label("é doc"));
    }
}
