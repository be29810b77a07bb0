use std::collections::HashMap;

use crate::zip::ZipFileEntry;

use super::SEPARATOR;

/// Outcome of resolving a child name under a directory prefix.
/// Indices refer to the archive's entry list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    File(usize),
    Directory(usize),
    NotFound,
}

/// Exact entry-name lookup table, built once per mount.
///
/// Keeps the first occurrence of each name, so resolving against it
/// gives the same answer as scanning the entries in archive order and
/// stopping at the first match.
pub struct PathIndex {
    first_by_name: HashMap<String, usize>,
}

impl PathIndex {
    pub fn new(entries: &[ZipFileEntry]) -> Self {
        let mut first_by_name = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            first_by_name
                .entry(entry.file_name.clone())
                .or_insert(index);
        }
        Self { first_by_name }
    }

    /// Index of the first entry named exactly `name`.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.first_by_name.get(name).copied()
    }

    /// Resolve `name` under `prefix` ("" for the root, otherwise a
    /// directory entry name including its trailing separator).
    ///
    /// `prefix + name` matches a file entry; `prefix + name + "/"`
    /// matches a directory entry.
    pub fn resolve(&self, prefix: &str, name: &str) -> Resolved {
        if name.is_empty() || name.contains(SEPARATOR) {
            return Resolved::NotFound;
        }

        let mut candidate = String::with_capacity(prefix.len() + name.len() + 1);
        candidate.push_str(prefix);
        candidate.push_str(name);
        let file = self.get(&candidate);
        candidate.push(SEPARATOR);
        let dir = self.get(&candidate);

        match (file, dir) {
            (Some(file), Some(dir)) if dir < file => Resolved::Directory(dir),
            (Some(file), _) => Resolved::File(file),
            (None, Some(dir)) => Resolved::Directory(dir),
            (None, None) => Resolved::NotFound,
        }
    }
}
