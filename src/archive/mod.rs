//! Concurrent, deterministic archive building

pub mod builder;
pub mod checksum;
pub mod collector;

pub use builder::{ArchiveBuilder, MANIFEST_MEMBER};
pub use checksum::{checksum_file, ChecksumPool, FileDigest, Progress, DEFAULT_WORKERS};
pub use collector::{collect_files, CollectionFilter, FileSpec};
