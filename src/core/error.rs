use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the entire packsmith core.
/// Every module returns `Result<T, PackError>`.
#[derive(Debug, Error)]
pub enum PackError {
    // ── Configuration ───────────────────────────────────
    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Unknown loader: {0}")]
    UnknownLoader(String),

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No pack manifest found at {0:?}")]
    ManifestNotFound(PathBuf),

    #[error("Pack already exists: {0}")]
    PackExists(String),

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry returned HTTP {status} for {url}")]
    RegistryStatus { url: String, status: u16 },

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Resolution ──────────────────────────────────────
    #[error("No project found for '{0}'")]
    NotFound(String),

    #[error("No confident match for '{query}'; candidates (slug, score): {candidates:?}")]
    AmbiguousMatch {
        query: String,
        candidates: Vec<(String, u32)>,
    },

    #[error("No version of '{identifier}' supports {game_version}/{loader}")]
    IncompatibleVersion {
        identifier: String,
        game_version: String,
        loader: String,
    },

    #[error("Version {version_id} of '{identifier}' lists no files")]
    MissingPrimaryFile {
        identifier: String,
        version_id: String,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("{algo} mismatch for {path:?}: expected {expected}, got {actual}")]
    HashMismatch {
        algo: &'static str,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("No sha1 declared for '{0}'")]
    HashMissing(String),

    // ── Pack index ──────────────────────────────────────
    #[error("Invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("Unsafe file path in index: {0}")]
    UnsafePath(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type PackResult<T> = Result<T, PackError>;

impl From<std::io::Error> for PackError {
    fn from(source: std::io::Error) -> Self {
        PackError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
