//! Inspect command implementation.

use super::{load, Format};
use ledgerkey_core::AuditAction;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Number of sealed frames.
    pub frame_count: usize,
    /// Number of sealed batches (committed writes).
    pub batch_count: usize,
    /// Frames that did not decode as ledger entries.
    pub undecodable: usize,
    /// Bytes after the last sealed batch.
    pub torn_bytes: u64,
    /// Intact frames in the torn tail.
    pub unsealed_frames: usize,
    /// Entry counts per family.
    pub families: BTreeMap<String, FamilyStats>,
    /// Keys live after replaying every entry.
    pub live_keys: Vec<String>,
}

/// Entry counts for a single family.
#[derive(Debug, Default, Serialize)]
pub struct FamilyStats {
    /// Create entries.
    pub creates: usize,
    /// Update entries.
    pub updates: usize,
    /// Delete entries.
    pub deletes: usize,
    /// Entries with an unknown action code.
    pub unknown: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::parse(format)?;
    let result = inspect(path)?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Format::Text => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Gathers journal statistics.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let contents = load(path)?;
    let mut families: BTreeMap<String, FamilyStats> = BTreeMap::new();
    let mut live: BTreeMap<String, bool> = BTreeMap::new();

    for entry in contents.entries() {
        let stats = families.entry(entry.family.clone()).or_default();
        let key = entry.natural_key_string();
        match entry.audit_action() {
            Some(AuditAction::Create) => {
                stats.creates += 1;
                live.insert(key, true);
            }
            Some(AuditAction::Update) => {
                stats.updates += 1;
                live.insert(key, true);
            }
            Some(AuditAction::Delete) => {
                stats.deletes += 1;
                live.insert(key, false);
            }
            None => stats.unknown += 1,
        }
    }

    let undecodable = contents.frames.len() - contents.entries().count();
    Ok(InspectResult {
        path: path.display().to_string(),
        size: contents.size,
        frame_count: contents.frames.len(),
        batch_count: contents.batches,
        undecodable,
        torn_bytes: contents.torn_bytes,
        unsealed_frames: contents.unsealed_frames,
        families,
        live_keys: live
            .into_iter()
            .filter_map(|(key, is_live)| is_live.then_some(key))
            .collect(),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("LedgerKey Journal Inspection");
    println!("============================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {} bytes", result.size);
    println!("Frames: {} in {} batches", result.frame_count, result.batch_count);
    if result.undecodable > 0 {
        println!("Undecodable frames: {}", result.undecodable);
    }
    if result.torn_bytes > 0 {
        println!(
            "Torn tail: {} bytes, {} unsealed frames",
            result.torn_bytes, result.unsealed_frames
        );
    }
    println!();

    println!("Families:");
    for (family, stats) in &result.families {
        println!(
            "  {family}: {} create, {} update, {} delete",
            stats.creates, stats.updates, stats.deletes
        );
        if stats.unknown > 0 {
            println!("    {} with unknown action", stats.unknown);
        }
    }
    println!();

    println!("Live keys ({}):", result.live_keys.len());
    for key in &result.live_keys {
        println!("  {key}");
    }
}
