use anyhow::{Context, Result};
use std::path::Path;
// Single-level directory enumeration for the ListEntries reply

/// One entry of the served directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
}

impl DirEntry {
    pub fn kind_tag(&self) -> char {
        if self.is_directory {
            'd'
        } else {
            'f'
        }
    }
}

/// Enumerate the immediate children of `dir`, sorted by name.
pub fn list_directory(dir: &Path) -> Result<Vec<DirEntry>> {
    use walkdir::WalkDir;

    // Probe first so an unreadable root is an error, not an empty listing
    std::fs::read_dir(dir).with_context(|| format!("cannot open directory {}", dir.display()))?;

    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        // Entries that vanish or deny stat between readdir and lstat are skipped
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            is_directory: entry.file_type().is_dir(),
        });
    }
    Ok(entries)
}

/// Render entries as `index, kind, size, name` lines joined by newlines.
pub fn format_listing(entries: &[DirEntry]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(index, e)| format!("{}, {}, {}, {}", index, e.kind_tag(), e.size, e.name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inverse of [`format_listing`]; lines that do not parse are dropped.
pub fn parse_listing(text: &str) -> Vec<DirEntry> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, ", ");
            let _index = parts.next()?;
            let kind = parts.next()?;
            let size = parts.next()?.parse().ok()?;
            let name = parts.next()?.to_string();
            Some(DirEntry {
                name,
                size,
                is_directory: kind == "d",
            })
        })
        .collect()
}
