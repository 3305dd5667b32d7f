use crate::cli::packd_dir;
use crate::models::Stage;
use crate::state::VersionStateManager;
use crate::Result;
use colored::Colorize;

pub fn run(json: bool) -> Result<()> {
    let manager = VersionStateManager::load(packd_dir()?)?;
    let state = manager.current_state();

    if json {
        println!(
            "{{\"version\": \"{}\", \"stage\": \"{}\", \"history\": {}}}",
            state.current_version,
            state.current_stage,
            state.history.len()
        );
        return Ok(());
    }

    println!("{}", "Version status".cyan().bold());
    println!();

    let stage_colored = match state.current_stage {
        Stage::Dev => state.current_stage.name().yellow(),
        Stage::Alpha | Stage::Beta => state.current_stage.name().cyan(),
        Stage::Rc => state.current_stage.name().blue(),
        Stage::Release | Stage::Stable => state.current_stage.name().green(),
        Stage::Hotfix => state.current_stage.name().red(),
    };

    println!("   Version:     {}", state.current_version.to_string().bold());
    println!("   Stage:       {}", stage_colored);
    println!("   Increments:  {}", state.history.len());
    println!("   Transitions: {}", state.stage_transitions.len());

    if let Some(last) = state.history.last() {
        println!(
            "   Last:        {} -> {} ({}) at {}",
            last.from_version,
            last.to_version,
            last.kind,
            last.at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}
