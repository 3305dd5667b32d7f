pub mod errors;
pub mod manifest;
pub mod repository;
pub mod version_state;

pub use errors::{FileFailure, PackdError, Result};
pub use manifest::{ArchiveManifest, BuildReport, FileMeta, MANIFEST_SCHEMA_VERSION};
pub use repository::{EntryMetadata, RepositoryEntry, SearchCriteria};
pub use version_state::{
    IncrementKind, IncrementRecord, Stage, StageTransition, VersionCandidate, VersionState,
    DEFAULT_HISTORY_RETENTION, STATE_SCHEMA_VERSION,
};
