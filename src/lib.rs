// Packd - Deployment Package Versioning & Archival
// A Rust-powered tool for stage-aware versioning, deterministic archives
// and a checksum-indexed local package repository

pub mod archive;
pub mod cli;
pub mod consistency;
pub mod models;
pub mod repository;
pub mod state;
pub mod storage;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use archive::ArchiveBuilder;
pub use consistency::ConsistencyManager;
pub use models::{PackdError, Stage, VersionState};
pub use repository::PackageRepository;
pub use state::VersionStateManager;
