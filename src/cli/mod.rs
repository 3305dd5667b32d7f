//! CLI command implementations - thin orchestration over the core

pub mod build;
pub mod bump;
pub mod history;
pub mod init;
pub mod repo;
pub mod stage;
pub mod status;
pub mod suggest;
pub mod sync;

use std::path::PathBuf;

/// Directory holding packd state for a project
pub const PACKD_DIR: &str = ".packd";

/// Project-local packd directory under the current working directory
pub fn packd_dir() -> crate::Result<PathBuf> {
    Ok(std::env::current_dir()?.join(PACKD_DIR))
}

/// Default repository root: `<user data dir>/packd/repository`
pub fn default_repo_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("packd")
        .join("repository")
}
