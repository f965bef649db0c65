use anyhow::{bail, Context, Result};
use eggscan_cache::looks_like_image;
use std::path::Path;

use crate::app::AppContext;
use crate::scan::record_scan;

pub async fn run_scan_command(app: &mut AppContext, image_path: &Path) -> Result<()> {
    let image = tokio::fs::read(image_path)
        .await
        .with_context(|| format!("Failed to read {}", image_path.display()))?;

    if !looks_like_image(&image) {
        bail!("{} is not a recognised image", image_path.display());
    }

    println!("🔍 Identifying {}", image_path.display());

    let outcome = record_scan(app.identifier.as_ref(), &mut app.history, &image).await;
    let identification = &outcome.identification;

    if identification.is_unknown() {
        println!("\n❓ Could not identify these eggs");
    } else {
        println!("\n🥚 {}", identification.label);
        println!("   Scientific name: {}", identification.scientific_name);
        println!("   Confidence: {}", identification.confidence);
    }

    match outcome.item {
        Some(item) => println!("\n📜 Saved to history as {}", item.id),
        None => println!("\n⚠️  The scan could not be saved to history"),
    }

    Ok(())
}
