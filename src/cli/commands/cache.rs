//! Cache management commands

use anyhow::{Context, Result};
use eggscan_cache::{CacheStats, Fingerprint};

use super::confirm;
use crate::app::AppContext;
use crate::cli::args::CacheAction;

const MIB: f64 = 1_048_576.0;

/// Execute cache command
pub async fn handle_cache_command(action: &CacheAction, app: &AppContext) -> Result<()> {
    let cache = &app.cache;
    let cache_dir = cache.cache_dir();

    match action {
        CacheAction::Stats => {
            // Let the startup sweep finish so the numbers are current
            cache.flush().await;
            let stats = cache.stats();
            let policy = cache.policy();

            println!("📊 Cache statistics");
            println!("   Directory: {}", cache_dir.display());

            println!("\nDisk:");
            println!("   Entries: {}", stats.disk_entries);
            println!("   Size: {:.1} MB ({} bytes)", stats.disk_size_bytes as f64 / MIB, stats.disk_size_bytes);

            println!("\nMemory:");
            println!("   Entries: {}", stats.memory_entries);
            println!("   Size: {:.1} MB", stats.memory_cost_bytes as f64 / MIB);

            println!("\nConfiguration:");
            println!("   Max size: {} MB", app.config.cache.max_size_mb);
            println!("   Max age: {} days", app.config.cache.max_age_days);

            if stats.disk_entries == 0 {
                println!("\n💡 Cache is empty");
            } else {
                println!("\n📈 Usage: {:.1}% of limit", usage_pct(&stats, policy.max_size_bytes));
            }
        }

        CacheAction::Sweep => {
            println!("🧹 Cache sweep");
            println!("   Directory: {}", cache_dir.display());

            let stats = cache.sweep().await;

            println!("\n✅ Sweep complete");
            println!("   Removed {} entries", stats.removed_count);
            println!("   Freed {:.1} MB", stats.freed_bytes as f64 / MIB);
        }

        CacheAction::Clear { yes } => {
            cache.flush().await;
            let stats = cache.stats();

            println!("🗑️  Clear all cache");
            println!("   Directory: {}", cache_dir.display());
            println!(
                "\n⚠️  Warning: This will delete ALL {} cache entries ({:.1} MB)",
                stats.disk_entries,
                stats.disk_size_bytes as f64 / MIB
            );

            if !yes && !confirm("Continue?")? {
                println!("   Aborted");
                return Ok(());
            }

            cache.clear();
            cache.flush().await;
            println!("\n✅ Removed {} entries", stats.disk_entries);
        }

        CacheAction::Fetch { url, output } => {
            let bytes = cache.get_or_fetch(url, app.fetcher.as_ref()).await?;

            match output {
                Some(path) => {
                    tokio::fs::write(path, &bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("✅ Saved {} bytes to {}", bytes.len(), path.display());
                }
                None => {
                    println!("✅ {} bytes cached for {}", bytes.len(), url);
                    println!("   Key: {}", Fingerprint::of(url));
                }
            }
        }
    }

    Ok(())
}

fn usage_pct(stats: &CacheStats, limit_bytes: u64) -> f64 {
    if limit_bytes == 0 {
        return 100.0;
    }
    stats.disk_size_bytes as f64 / limit_bytes as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_pct() {
        let stats = CacheStats {
            disk_size_bytes: 50,
            ..CacheStats::default()
        };

        assert_eq!(usage_pct(&stats, 200), 25.0);
        assert_eq!(usage_pct(&stats, 0), 100.0);
    }
}
