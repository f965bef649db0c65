pub mod cache;
pub mod history;
pub mod scan;

pub use cache::handle_cache_command;
pub use history::handle_history_command;
pub use scan::run_scan_command;

use anyhow::Result;
use std::io::{self, Write};

/// Ask a y/N question on stdin
pub(crate) fn confirm(question: &str) -> Result<bool> {
    print!("   {} [y/N]: ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}
