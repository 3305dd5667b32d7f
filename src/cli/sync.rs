use crate::cli::packd_dir;
use crate::consistency::{
    ConsistencyManager, EmbeddedLiteralSyntax, KeyValueSyntax, Observation, TomlFieldSyntax,
    VersionSyntax,
};
use crate::state::VersionStateManager;
use crate::Result;
use colored::Colorize;

/// Parse a `--file` spec: `<path>:kv[:<key>]`, `<path>:toml[:<table>]`
/// or `<path>:regex:<pattern>`. A leading `!` marks the file mandatory.
fn parse_spec(spec: &str) -> Result<(String, Box<dyn VersionSyntax>, bool)> {
    let (mandatory, spec) = match spec.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, spec),
    };

    let mut parts = spec.splitn(3, ':');
    let path = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow::anyhow!("empty file spec"))?;
    let syntax_kind = parts.next().unwrap_or("kv");
    let arg = parts.next();

    let syntax: Box<dyn VersionSyntax> = match syntax_kind {
        "kv" => Box::new(KeyValueSyntax::new(arg.unwrap_or("version"))),
        "toml" => Box::new(TomlFieldSyntax::new(arg.unwrap_or("package"))),
        "regex" => {
            let pattern = arg
                .ok_or_else(|| anyhow::anyhow!("regex syntax needs a pattern: {}", spec))?;
            Box::new(EmbeddedLiteralSyntax::new(pattern)?)
        }
        other => anyhow::bail!("unknown syntax '{}' (expected kv, toml or regex)", other),
    };

    Ok((path.to_string(), syntax, mandatory))
}

pub fn run(files: &[String], apply: bool) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("no files registered; pass at least one --file <path>:<syntax>");
    }

    let manager = VersionStateManager::load(packd_dir()?)?;
    let authoritative = manager.current_state().current_version.clone();

    let mut consistency = ConsistencyManager::new();
    for spec in files {
        let (path, syntax, mandatory) = parse_spec(spec)?;
        consistency.register(path, syntax, mandatory);
    }

    let report = consistency.detect_inconsistencies(&authoritative)?;

    println!(
        "{} (authoritative {})",
        "Version consistency".cyan().bold(),
        authoritative.to_string().bold()
    );
    println!();
    for (path, observation) in &report.observed {
        let line = match observation {
            Observation::Version(v) if *v == authoritative.to_string() => {
                format!("ok       {}", path.display()).green()
            }
            Observation::Version(v) => {
                format!("mismatch {} (found {})", path.display(), v).red()
            }
            Observation::NoToken => format!("skipped  {} (no token)", path.display()).yellow(),
            Observation::Missing => format!("skipped  {} (missing)", path.display()).yellow(),
        };
        println!("   {}", line);
    }

    if report.is_consistent() {
        println!();
        println!("{}", "All files consistent.".green());
        return Ok(());
    }

    if !apply {
        println!();
        println!(
            "{}",
            format!(
                "{} file(s) out of sync; re-run with --apply to synchronize.",
                report.mismatches.len()
            )
            .yellow()
        );
        return Ok(());
    }

    let applied = consistency.apply_version_all(&authoritative)?;
    println!();
    println!(
        "{} updated {}, unchanged {}, skipped {}",
        "Synchronized:".green(),
        applied.updated.len(),
        applied.unchanged.len(),
        applied.skipped.len()
    );
    Ok(())
}
