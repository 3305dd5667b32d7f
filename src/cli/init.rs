use crate::cli::{packd_dir, PACKD_DIR};
use crate::state::{VersionStateManager, STATE_FILE};
use crate::Result;
use colored::Colorize;

pub fn run(force: bool) -> Result<()> {
    let dir = packd_dir()?;
    let state_path = dir.join(STATE_FILE);

    if state_path.exists() && !force {
        println!(
            "{}",
            format!(
                "{} already initialized (use --force to re-seed at 0.0.0/dev)",
                PACKD_DIR
            )
            .yellow()
        );
        return Ok(());
    }

    std::fs::create_dir_all(&dir)?;
    let manager = VersionStateManager::reinitialize(&dir)?;
    println!(
        "{} {} at version {} / {}",
        "Initialized".green(),
        state_path.display(),
        manager.current_state().current_version,
        manager.current_state().current_stage
    );
    Ok(())
}
