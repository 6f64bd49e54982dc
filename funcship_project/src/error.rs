// SPDX-License-Identifier: MIT
use funcship_api::error::RegistryError;

/// Failure of one function unit. Batch operations record these per unit
/// and keep going; none of them aborts the surrounding batch.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("missing required fields: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("source directory missing: {0}")]
    SourceMissing(std::path::PathBuf),
    #[error("source directory contains no deployable files: {0}")]
    SourceEmpty(std::path::PathBuf),
    #[error("declared inclusion path missing: {0}")]
    InclusionMissing(std::path::PathBuf),
    #[error("conflicting archive entries for {path}: {first} vs {second}")]
    Conflict {
        path: String,
        first: std::path::PathBuf,
        second: std::path::PathBuf,
    },
    #[error("archive size {size} bytes exceeds the registry limit of {limit} bytes")]
    SizeLimit { size: u64, limit: u64 },
    #[error("publishing qualifier {qualifier} failed: {source}")]
    Publish { qualifier: String, source: RegistryError },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("cancelled before completion")]
    Cancelled,
    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
