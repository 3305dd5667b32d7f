use crate::cli::packd_dir;
use crate::models::IncrementKind;
use crate::state::VersionStateManager;
use crate::Result;
use colored::Colorize;

pub fn run(kind: Option<&str>) -> Result<()> {
    let kind = kind.map(IncrementKind::parse).transpose()?;

    let manager = VersionStateManager::load(packd_dir()?)?;
    let state = manager.current_state();
    let candidates = manager.suggest_next_versions(kind)?;

    println!(
        "{} (currently {} / {})",
        "Next versions".cyan().bold(),
        state.current_version,
        state.current_stage
    );
    println!();

    if candidates.is_empty() {
        println!("   {}", "no compatible increments".bright_black());
        return Ok(());
    }

    for candidate in candidates {
        match candidate.kind {
            IncrementKind::StageChange => println!(
                "   {}  {} (enter {})",
                "=>".bright_black(),
                candidate.target.to_string().bold(),
                candidate.stage
            ),
            kind => println!(
                "   {}  {} ({})",
                "->".bright_black(),
                candidate.target.to_string().bold(),
                kind
            ),
        }
    }
    Ok(())
}
