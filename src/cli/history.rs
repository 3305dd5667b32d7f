use crate::cli::packd_dir;
use crate::state::VersionStateManager;
use crate::Result;
use colored::Colorize;

pub fn run(limit: usize) -> Result<()> {
    let manager = VersionStateManager::load(packd_dir()?)?;
    let records = manager.history(limit);

    if records.is_empty() {
        println!("{}", "No increments recorded.".bright_black());
        return Ok(());
    }

    println!("{}", format!("Last {} increment(s)", records.len()).cyan().bold());
    println!();
    for record in records {
        let session = record.session_id.to_string();
        println!(
            "   {}  {} -> {}  {}  session {}",
            record.at.format("%Y-%m-%d %H:%M:%S"),
            record.from_version,
            record.to_version.to_string().bold(),
            format!("[{}]", record.kind).bright_black(),
            session[..8].bright_black()
        );
    }
    Ok(())
}
