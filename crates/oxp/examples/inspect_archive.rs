//! Simple inspector for OXP archives.

use std::collections::BTreeMap;
use std::path::PathBuf;

use oxp::util::datetime::format_timestamp;
use oxp::{format_id, ImportPlan, validate::unresolved_assets};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "linkset.oxp".to_string()),
    );
    println!("Reading: {}", path.display());

    let plan = ImportPlan::open(&path).expect("Failed to read archive");
    let manifest = plan.manifest();

    println!("\n=== Summary ===");
    println!("{}", plan.summary());

    println!("\n=== Linksets ({}) ===", manifest.linksets.len());
    for (index, linkset) in manifest.linksets.iter().enumerate() {
        let Some(root) = manifest.root_of(index) else {
            continue;
        };
        let name = if root.name.is_empty() { "(unnamed)" } else { root.name.as_str() };
        println!(
            "  [{}] {} - {} prims at <{:.2}, {:.2}, {:.2}>",
            index,
            name,
            linkset.len(),
            root.position.x,
            root.position.y,
            root.position.z
        );
        if root.creation_date != 0 {
            println!("      created {}", format_timestamp(root.creation_date));
        }
        for id in linkset {
            let Some(prim) = manifest.prims.get(id) else {
                continue;
            };
            let marker = if prim.is_placeholder() { " (placeholder)" } else { "" };
            println!(
                "      {}{}: {} faces, {} items",
                format_id(id),
                marker,
                prim.textures.len(),
                prim.content.len()
            );
        }
    }

    println!("\n=== Inventory ({}) ===", manifest.inventory.len());
    for record in manifest.inventory.values() {
        println!("  {} [{}] -> {}", record.name, record.asset_type.name(), format_id(&record.asset_id));
    }

    let mut by_type: BTreeMap<&'static str, (usize, usize)> = BTreeMap::new();
    for blob in manifest.assets.values() {
        let entry = by_type.entry(blob.asset_type.name()).or_default();
        entry.0 += 1;
        entry.1 += blob.data.len();
    }
    println!("\n=== Assets ({}) ===", manifest.assets.len());
    for (name, (count, bytes)) in &by_type {
        println!("  {:<12} {:>5} ({} bytes)", name, count, bytes);
    }

    let missing = unresolved_assets(manifest);
    if !missing.is_empty() {
        println!("\n=== Referenced but not carried ({}) ===", missing.len());
        for id in missing {
            println!("  {}", format_id(&id));
        }
    }
}
