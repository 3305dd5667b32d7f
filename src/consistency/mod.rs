//! Cross-file version consistency enforcement

pub mod manager;
pub mod syntax;

pub use manager::{ApplyReport, ConsistencyManager, ConsistencyReport, ManagedFile, Observation};
pub use syntax::{EmbeddedLiteralSyntax, KeyValueSyntax, TomlFieldSyntax, VersionSyntax};
