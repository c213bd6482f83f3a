//! Partition command implementation for rdist CLI.

use rdist_core::FileEntries;
use rdist_core::range::{partition, partition_files};

use crate::colors;

/// Parse a `PATH=ENTRIES` argument.
pub fn parse_file_entries(arg: &str) -> Result<FileEntries, String> {
    let (path, entries) = arg
        .rsplit_once('=')
        .ok_or_else(|| format!("expected PATH=ENTRIES, got '{}'", arg))?;
    if path.is_empty() {
        return Err(format!("missing path in '{}'", arg));
    }
    let entries = entries
        .parse::<u64>()
        .map_err(|e| format!("invalid entry count '{}': {}", entries, e))?;
    Ok(FileEntries::new(path, entries))
}

/// Print the ranges for an entry count or a file list.
pub fn execute(
    entries: Option<u64>,
    files: Vec<FileEntries>,
    npartitions: usize,
) -> anyhow::Result<()> {
    let ranges = match entries {
        Some(total) => partition(total, npartitions)?,
        None => partition_files(&files, npartitions)?,
    };

    if ranges.is_empty() {
        println!("{}No entries to partition.{}", colors::YELLOW, colors::RESET);
        return Ok(());
    }

    println!(
        "{}{} ranges{} (requested {})",
        colors::BOLD,
        ranges.len(),
        colors::RESET,
        npartitions
    );

    for range in &ranges {
        println!(
            "  {:>4}  [{}, {})  {} entries",
            range.id,
            range.start,
            range.end,
            range.len()
        );
        if let Some(span) = &range.files {
            let names: Vec<String> = span.files.iter().map(|p| p.display().to_string()).collect();
            println!(
                "        {}{} entries {}..{}{}",
                colors::DIM,
                names.join(", "),
                span.start_entry,
                span.end_entry,
                colors::RESET
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_entries() {
        let parsed = parse_file_entries("data/run=1.root=250").unwrap();
        assert_eq!(parsed, FileEntries::new("data/run=1.root", 250));

        assert!(parse_file_entries("run1.root").is_err());
        assert!(parse_file_entries("=10").is_err());
        assert!(parse_file_entries("run1.root=-3").is_err());
    }
}
