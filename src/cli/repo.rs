use crate::cli::default_repo_root;
use crate::models::{RepositoryEntry, SearchCriteria};
use crate::repository::{IntegrityIssue, PackageRepository};
use crate::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use std::path::PathBuf;

fn open(repo_root: Option<&str>) -> Result<PackageRepository> {
    let root = repo_root.map(PathBuf::from).unwrap_or_else(default_repo_root);
    Ok(PackageRepository::open(root)?)
}

fn print_entry(entry: &RepositoryEntry) {
    let version = entry
        .version
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".into());
    let platform = entry.platform.as_deref().unwrap_or("-");
    println!(
        "   {}  {:<20} {:<12} {:<14} {:>10}  {}",
        entry.created_at.format("%Y-%m-%d"),
        entry.name,
        version,
        platform,
        entry.size_bytes,
        entry.id[..15.min(entry.id.len())].bright_black()
    );
}

pub fn list(repo_root: Option<&str>) -> Result<()> {
    let repo = open(repo_root)?;
    let entries = repo.list_all()?;
    if entries.is_empty() {
        println!("{}", "Repository is empty.".bright_black());
        return Ok(());
    }
    println!("{}", format!("{} package(s)", entries.len()).cyan().bold());
    for entry in &entries {
        print_entry(entry);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn find(
    repo_root: Option<&str>,
    name: Option<&str>,
    version: Option<&str>,
    platform: Option<&str>,
    after: Option<&str>,
    before: Option<&str>,
) -> Result<()> {
    let parse_date = |s: &str| -> Result<DateTime<Utc>> {
        Ok(s.parse::<DateTime<Utc>>()
            .map_err(|e| anyhow::anyhow!("bad date '{}': {}", s, e))?)
    };

    let criteria = SearchCriteria {
        name: name.map(str::to_string),
        version: version.map(str::to_string),
        platform: platform.map(str::to_string),
        created_after: after.map(parse_date).transpose()?,
        created_before: before.map(parse_date).transpose()?,
    };

    let repo = open(repo_root)?;
    let matches = repo.find(&criteria)?;
    if matches.is_empty() {
        println!("{}", "No matching packages.".bright_black());
        return Ok(());
    }
    println!("{}", format!("{} match(es)", matches.len()).cyan().bold());
    for entry in &matches {
        print_entry(entry);
    }
    Ok(())
}

pub fn remove(repo_root: Option<&str>, entry_id: &str) -> Result<()> {
    let repo = open(repo_root)?;
    let entry = repo.remove(entry_id)?;
    println!(
        "{} {} {}",
        "Removed:".green(),
        entry.name,
        entry.id.bright_black()
    );
    Ok(())
}

pub fn verify(repo_root: Option<&str>) -> Result<()> {
    let repo = open(repo_root)?;
    let report = repo.validate_integrity()?;

    if report.is_clean() {
        println!(
            "{}",
            format!("{} entries verified, no drift.", report.checked).green()
        );
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{} entries verified, {} problem(s):",
            report.checked,
            report.issues.len()
        )
        .red()
        .bold()
    );
    for issue in &report.issues {
        match issue {
            IntegrityIssue::MissingBlob { id, path } => {
                println!("   {} {} ({})", "missing ".red(), id, path.display());
            }
            IntegrityIssue::ChecksumMismatch {
                id,
                expected,
                observed,
            } => {
                println!(
                    "   {} {} expected {} observed {}",
                    "mismatch".red(),
                    id,
                    expected,
                    observed
                );
            }
        }
    }
    anyhow::bail!("repository integrity check failed");
}
