use crate::archive::ArchiveBuilder;
use crate::cli::{default_repo_root, packd_dir};
use crate::models::EntryMetadata;
use crate::repository::PackageRepository;
use crate::state::VersionStateManager;
use crate::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

#[allow(clippy::too_many_arguments)]
pub fn run(
    root: &str,
    include: &[String],
    exclude: &[String],
    workers: usize,
    timeout_secs: Option<u64>,
    output: Option<&str>,
    name: &str,
    platform: Option<&str>,
    repo_root: Option<&str>,
    no_store: bool,
) -> Result<()> {
    let manager = VersionStateManager::load(packd_dir()?)?;
    let version = manager.current_state().current_version.clone();

    let output: PathBuf = match output {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(format!("{}-{}.tar.gz", name, version)),
    };

    let mut builder = ArchiveBuilder::new(root)
        .include(include.iter().cloned())
        .exclude(exclude.iter().cloned())
        .workers(workers);
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("   checksums {pos}/{len} {bar:30.cyan/blue}")
            .expect("progress template is valid"),
    );
    let bar_handle = bar.clone();
    let report = builder.build(
        &output,
        Some(Box::new(move |done, total| {
            bar_handle.set_length(total);
            bar_handle.set_position(done);
        })),
    )?;
    bar.finish_and_clear();

    println!(
        "{} {} ({} files, {} bytes, {:.1?})",
        "Built:".green(),
        report.output_path.display().to_string().bold(),
        report.manifest.file_count,
        report.archive_bytes,
        report.elapsed
    );
    println!("   aggregate {}", report.manifest.aggregate_checksum.bright_black());

    if no_store {
        return Ok(());
    }

    let repo_root = repo_root
        .map(PathBuf::from)
        .unwrap_or_else(default_repo_root);
    let repo = PackageRepository::open(&repo_root)?;
    let entry = repo.store(
        &report.output_path,
        EntryMetadata {
            name: name.to_string(),
            version: Some(version),
            platform: platform.map(str::to_string),
            extra: Default::default(),
        },
    )?;

    println!(
        "{} {} as {}",
        "Stored:".green(),
        entry.name.bold(),
        entry.id.bright_black()
    );
    Ok(())
}
