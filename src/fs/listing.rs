use crate::zip::ZipFileEntry;

use super::SEPARATOR;

/// Immediate child of a directory prefix, as recorded in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListedChild<'a> {
    /// Name relative to the prefix, without a trailing separator.
    pub name: &'a str,
    pub index: usize,
    pub is_directory: bool,
}

/// Entries directly under `prefix`, in archive order.
///
/// The prefix's own entry and anything two or more levels below it are
/// skipped, as are entries that would produce an empty name (`"/"`,
/// `"dir//"`).
pub fn list_children<'a>(
    entries: &'a [ZipFileEntry],
    prefix: &'a str,
) -> impl Iterator<Item = ListedChild<'a>> + 'a {
    entries.iter().enumerate().filter_map(move |(index, entry)| {
        let remainder = entry.file_name.strip_prefix(prefix)?;
        let (name, is_directory) = match remainder.strip_suffix(SEPARATOR) {
            Some(name) => (name, true),
            None => (remainder, false),
        };
        if name.is_empty() || name.contains(SEPARATOR) {
            return None;
        }
        Some(ListedChild {
            name,
            index,
            is_directory,
        })
    })
}
