//! Scan history commands

use anyhow::Result;
use eggscan_history::ScanHistoryItem;

use super::confirm;
use crate::app::AppContext;
use crate::cli::args::HistoryAction;

pub fn handle_history_command(action: &HistoryAction, app: &mut AppContext) -> Result<()> {
    let history = &mut app.history;

    match action {
        HistoryAction::List { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(history.list())?);
                return Ok(());
            }

            if history.is_empty() {
                println!("💡 No scans recorded yet");
                return Ok(());
            }

            println!("📜 Scan history ({} of {})", history.len(), history.capacity());
            for item in history.list() {
                println!("   {}", format_item(item));
            }
        }

        HistoryAction::Clear { yes } => {
            println!("🗑️  Clear scan history");
            println!("\n⚠️  Warning: This will delete ALL {} scans and their images", history.len());

            if !yes && !confirm("Continue?")? {
                println!("   Aborted");
                return Ok(());
            }

            history.clear();
            println!("\n✅ History cleared");
        }
    }

    Ok(())
}

fn format_item(item: &ScanHistoryItem) -> String {
    let mut line = format!(
        "{}  {:>4}  {}",
        item.date.format("%Y-%m-%d %H:%M"),
        item.confidence.to_string(),
        item.result
    );
    if item.scientific_name != item.result {
        line.push_str(&format!(" ({})", item.scientific_name));
    }
    line
}
