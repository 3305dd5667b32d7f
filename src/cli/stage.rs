use crate::cli::packd_dir;
use crate::models::Stage;
use crate::state::VersionStateManager;
use crate::Result;
use colored::Colorize;

pub fn run(target: &str) -> Result<()> {
    let target = Stage::parse(target)?;

    let mut manager = VersionStateManager::load(packd_dir()?)?;
    let transition = manager.transition_stage(target)?;

    println!(
        "{} {} -> {} (version {})",
        "Stage:".green(),
        transition.from,
        transition.to.name().bold(),
        manager.current_state().current_version
    );
    Ok(())
}
