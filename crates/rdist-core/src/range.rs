//! Range partitioning for distributed execution.
//!
//! Splits a logical input of `total` entries into contiguous, non-overlapping
//! half-open ranges. Sizes differ by at most one entry: the first
//! `total % n` ranges get one extra entry.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Input description handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// A flat count of entries, addressed as `[0, total)`.
    Entries(u64),
    /// A collection of files with their entry counts.
    Files(Vec<FileEntries>),
}

impl DataSource {
    /// Total number of entries in the source.
    ///
    /// Fails with [`Error::Configuration`] when the file counts add up to
    /// more than `u64::MAX`.
    pub fn total_entries(&self) -> Result<u64> {
        match self {
            DataSource::Entries(total) => Ok(*total),
            DataSource::Files(files) => total_of(files),
        }
    }

    /// A single range covering the whole source.
    pub fn whole(&self) -> Result<Range> {
        match self {
            DataSource::Entries(total) => Ok(Range::new(0, 0, *total)),
            DataSource::Files(files) => {
                let files = sorted_files(files);
                let total = total_of(&files)?;
                let mut range = Range::new(0, 0, total);
                if total > 0 {
                    range.files = Some(FileSpan {
                        files: files.into_iter().map(|f| f.path).collect(),
                        start_entry: 0,
                        end_entry: total,
                    });
                }
                Ok(range)
            }
        }
    }
}

/// One input file and the number of entries it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntries {
    pub path: PathBuf,
    pub entries: u64,
}

impl FileEntries {
    pub fn new(path: impl Into<PathBuf>, entries: u64) -> Self {
        Self {
            path: path.into(),
            entries,
        }
    }
}

/// Files spanned by a range.
///
/// `start_entry` is the offset inside the first file; `end_entry` is the
/// exclusive offset counted across the concatenation of `files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpan {
    pub files: Vec<PathBuf>,
    pub start_entry: u64,
    pub end_entry: u64,
}

/// A half-open range of entries `[start, end)` assigned to one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    /// Position of this range in the partitioning.
    pub id: usize,
    /// First entry (global position).
    pub start: u64,
    /// One past the last entry (global position).
    pub end: u64,
    /// Present when the source is a file collection.
    pub files: Option<FileSpan>,
}

impl Range {
    pub fn new(id: usize, start: u64, end: u64) -> Self {
        Self {
            id,
            start,
            end,
            files: None,
        }
    }

    /// Number of entries in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Partition `total` entries into at most `npartitions` balanced ranges.
///
/// When `total < npartitions` exactly `total` ranges of size one are
/// produced. `total == 0` yields no ranges.
pub fn partition(total: u64, npartitions: usize) -> Result<Vec<Range>> {
    if npartitions == 0 {
        return Err(Error::Configuration(
            "npartitions must be at least 1".to_string(),
        ));
    }

    let mut count = npartitions as u64;
    if total < count {
        if total > 0 {
            tracing::warn!(
                "Number of partitions ({}) is greater than the number of entries ({}); using {} partitions",
                npartitions,
                total,
                total
            );
        }
        count = total;
    }
    if count == 0 {
        return Ok(Vec::new());
    }

    let base = total / count;
    let remainder = total % count;

    let mut ranges = Vec::with_capacity(count as usize);
    let mut start = 0;
    for i in 0..count {
        let size = if i < remainder { base + 1 } else { base };
        ranges.push(Range::new(i as usize, start, start + size));
        start += size;
    }

    debug_assert_eq!(start, total);
    Ok(ranges)
}

/// Partition a file collection into balanced ranges.
///
/// Files are ordered by path and files without entries are skipped. The
/// balancing rule of [`partition`] is applied to the concatenated entries and
/// every range lists the files it spans in that order.
pub fn partition_files(files: &[FileEntries], npartitions: usize) -> Result<Vec<Range>> {
    let files = sorted_files(files);
    let total = total_of(&files)?;
    let mut ranges = partition(total, npartitions)?;

    // Global offset at which each file begins.
    let mut offsets = Vec::with_capacity(files.len());
    let mut offset = 0;
    for file in &files {
        offsets.push(offset);
        offset += file.entries;
    }

    let mut first = 0;
    for range in &mut ranges {
        // Advance to the file containing `range.start`.
        while offsets[first] + files[first].entries <= range.start {
            first += 1;
        }
        let mut last = first;
        while offsets[last] + files[last].entries < range.end {
            last += 1;
        }

        let base = offsets[first];
        range.files = Some(FileSpan {
            files: files[first..=last].iter().map(|f| f.path.clone()).collect(),
            start_entry: range.start - base,
            end_entry: range.end - base,
        });
    }

    Ok(ranges)
}

/// Sum of the entry counts of `files`.
fn total_of(files: &[FileEntries]) -> Result<u64> {
    files.iter().try_fold(0u64, |total, file| {
        total.checked_add(file.entries).ok_or_else(|| {
            Error::Configuration(format!(
                "total entry count overflows u64 at '{}'",
                file.path.display()
            ))
        })
    })
}

/// Files sorted by path with empty files removed.
fn sorted_files(files: &[FileEntries]) -> Vec<FileEntries> {
    let mut files: Vec<FileEntries> = files.iter().filter(|f| f.entries > 0).cloned().collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}
