//! End-to-end package build: deterministic archive, repository store,
//! idempotence and integrity.

use packd::archive::ArchiveBuilder;
use packd::models::{EntryMetadata, SearchCriteria};
use packd::repository::PackageRepository;
use semver::Version;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn fixture_tree(temp: &TempDir, files: usize) {
    std::fs::create_dir_all(temp.path().join("src")).unwrap();
    std::fs::create_dir_all(temp.path().join("assets/img")).unwrap();
    for i in 0..files {
        let rel = match i % 3 {
            0 => format!("src/mod_{:03}.rs", i),
            1 => format!("assets/img/sprite_{:03}.bin", i),
            _ => format!("file_{:03}.txt", i),
        };
        std::fs::write(temp.path().join(rel), format!("fixture payload {}", i)).unwrap();
    }
    // Noise that the build must exclude
    std::fs::write(temp.path().join("src/mod_000.pyc"), b"bytecode").unwrap();
}

fn metadata(name: &str, version: &str) -> EntryMetadata {
    EntryMetadata {
        name: name.into(),
        version: Some(Version::parse(version).unwrap()),
        platform: Some("linux-x86_64".into()),
        extra: BTreeMap::new(),
    }
}

#[test]
fn build_store_find_verify_roundtrip() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fixture_tree(&src, 30);

    let report = ArchiveBuilder::new(src.path())
        .exclude(["*.pyc".to_string()])
        .workers(4)
        .build(&work.path().join("pkg.tar.gz"), None)
        .unwrap();
    assert_eq!(report.manifest.file_count, 30);
    assert!(report.manifest.file("src/mod_000.pyc").is_none());

    let repo = PackageRepository::open(work.path().join("repo")).unwrap();
    let entry = repo
        .store(&report.output_path, metadata("fixture", "1.0.0"))
        .unwrap();
    assert_eq!(entry.id, entry.checksum);

    // Second store of the identical archive is a no-op
    let again = repo
        .store(&report.output_path, metadata("other-name", "2.0.0"))
        .unwrap();
    assert_eq!(again.id, entry.id);
    assert_eq!(repo.list_all().unwrap().len(), 1);

    // Findable by name and version requirement
    let found = repo
        .find(&SearchCriteria {
            name: Some("fixture".into()),
            version: Some("^1".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(found.len(), 1);

    // Blob matches its recorded checksum
    assert!(repo.validate_integrity().unwrap().is_clean());
}

#[test]
fn rebuilt_archive_is_byte_identical_and_content_addressed() {
    let src = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fixture_tree(&src, 150);

    let first = ArchiveBuilder::new(src.path())
        .exclude(["*.pyc".to_string()])
        .workers(4)
        .build(&work.path().join("first.tar.gz"), None)
        .unwrap();
    let second = ArchiveBuilder::new(src.path())
        .exclude(["*.pyc".to_string()])
        .workers(1)
        .build(&work.path().join("second.tar.gz"), None)
        .unwrap();

    // Worker-pool size must not leak into the output
    assert_eq!(
        first.manifest.aggregate_checksum,
        second.manifest.aggregate_checksum
    );
    let a = std::fs::read(&first.output_path).unwrap();
    let b = std::fs::read(&second.output_path).unwrap();
    assert_eq!(a, b);

    // Content addressing: both archives collapse to one entry
    let repo = PackageRepository::open(work.path().join("repo")).unwrap();
    let e1 = repo
        .store(&first.output_path, metadata("fixture", "1.0.0"))
        .unwrap();
    let e2 = repo
        .store(&second.output_path, metadata("fixture", "1.0.0"))
        .unwrap();
    assert_eq!(e1.id, e2.id);
    assert_eq!(repo.list_all().unwrap().len(), 1);
}
