//! Dump command implementation.

use super::{load, Format};
use ledgerkey_core::audit::EncodedEntry;
use ledgerkey_core::Timestamp;
use serde::Serialize;
use std::path::Path;

/// Ledger entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Frame offset in the journal.
    pub offset: u64,
    /// The decoded entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<EncodedEntry>,
    /// Why the frame could not be decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the dump command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::parse(format)?;
    let records = collect(path, limit)?;

    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Format::Text => {
            print_text_output(&records);
        }
    }

    Ok(())
}

/// Reads at most `limit` entries in journal order.
pub fn collect(path: &Path, limit: Option<usize>) -> Result<Vec<EntryInfo>, Box<dyn std::error::Error>> {
    let contents = load(path)?;
    Ok(contents
        .frames
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|frame| match frame.entry {
            Ok(entry) => EntryInfo {
                offset: frame.offset,
                entry: Some(entry),
                error: None,
            },
            Err(err) => EntryInfo {
                offset: frame.offset,
                entry: None,
                error: Some(err.to_string()),
            },
        })
        .collect())
}

/// One-line summary of an entry.
pub fn summary(entry: &EncodedEntry) -> String {
    let action = entry
        .audit_action()
        .map_or_else(|| format!("code {}", entry.action), |a| a.to_string());
    format!(
        "{:<6} {} rev:{} at {} cluster={} session={}",
        action,
        entry.natural_key_string(),
        entry.revision,
        Timestamp::from_micros(entry.stamp),
        entry.cluster,
        entry.session,
    )
}

fn print_text_output(records: &[EntryInfo]) {
    println!("Ledger Entries ({} total)", records.len());
    println!("==================");
    println!();

    for record in records {
        match (&record.entry, &record.error) {
            (Some(entry), _) => {
                println!("[{:08}] {}", record.offset, summary(entry));
                let values: Vec<String> = entry
                    .fields
                    .iter()
                    .filter(|f| !entry.primary_key.contains(&f.id))
                    .filter_map(|f| f.value.as_ref().map(|v| format!("{}={}", f.name, v)))
                    .collect();
                if !values.is_empty() {
                    println!("           {}", values.join(" "));
                }
            }
            (None, Some(error)) => println!("[{:08}] undecodable: {}", record.offset, error),
            (None, None) => println!("[{:08}] empty", record.offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_journal;

    #[test]
    fn entries_come_back_in_journal_order() {
        let journal = test_journal::sample();
        let records = collect(journal.path(), None).unwrap();
        let lines: Vec<String> = records
            .iter()
            .map(|r| summary(r.entry.as_ref().unwrap()))
            .collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("create HostNode(clusterA, nodeX) rev:1"));
        assert!(lines[1].starts_with("update HostNode(clusterA, nodeX) rev:2"));
        assert!(lines[3].starts_with("delete HostNode(clusterA, nodeX) rev:2"));
    }

    #[test]
    fn limit_truncates() {
        let journal = test_journal::sample();
        let records = collect(journal.path(), Some(1)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].offset, 0);

        let json = serde_json::to_value(&records).unwrap();
        assert_eq!(json[0]["entry"]["family"], "HostNode");
        assert!(json[0].get("error").is_none());
    }
}
