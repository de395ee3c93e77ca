use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the entire host backend.
/// Every module returns `Result<T, HostError>`.
#[derive(Debug, Error)]
pub enum HostError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Configuration ───────────────────────────────────
    #[error("Invalid runtime configuration {path:?}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // ── Framework resolution ────────────────────────────
    #[error("Framework '{name}' version {requested} was not found")]
    FrameworkMissing { name: String, requested: String },

    #[error("Asset '{asset}' of library '{library}' was not found in any probe root")]
    AssetMissing { library: String, asset: String },

    // ── Bundle ──────────────────────────────────────────
    #[error("Bundle malformed: {0}")]
    BundleCorrupt(String),

    #[error("Extraction failed at {path:?}: {source}")]
    ExtractionIo {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Engine ──────────────────────────────────────────
    #[error("Engine load failure: {0}")]
    EngineLoad(String),

    // ── Caller input ────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience alias used throughout the crate.
pub type HostResult<T> = Result<T, HostError>;
