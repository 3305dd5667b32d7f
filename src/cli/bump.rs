use crate::cli::packd_dir;
use crate::models::IncrementKind;
use crate::state::VersionStateManager;
use crate::Result;
use colored::Colorize;
use semver::Version;

pub fn run(kind: &str, set: Option<&str>, dry_run: bool) -> Result<()> {
    let kind = IncrementKind::parse(kind)?;
    let explicit = set.map(Version::parse).transpose()?;

    let mut manager = VersionStateManager::load(packd_dir()?)?;
    let candidate = manager.propose_increment(kind, explicit)?;

    if dry_run {
        println!(
            "{} {}",
            "Would bump:".yellow(),
            candidate.to_string().bold()
        );
        return Ok(());
    }

    let record = manager.commit_increment(&candidate)?;
    println!(
        "{} {} -> {} ({})",
        "Bumped:".green(),
        record.from_version,
        record.to_version.to_string().bold(),
        record.kind
    );
    Ok(())
}
