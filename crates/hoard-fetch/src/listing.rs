//! Directory listing ordered by a file attribute.
//!
//! Eviction scans use this to walk cache files oldest-first or largest-first.
//! Listing is best-effort: a directory that cannot be read is logged and
//! yields no entries, and entries whose attribute cannot be read still take
//! part in the ordering.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::error::FetchError;

/// File attribute used as the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortAttribute {
    /// File name (text).
    Name,
    /// File size in bytes (number).
    Size,
    /// Last content modification (date).
    Modified,
    /// Last access (date).
    Accessed,
    /// Creation (date). Not every filesystem records it.
    Created,
}

impl SortAttribute {
    /// Read this attribute for `path`.
    pub fn read(self, path: &Path) -> io::Result<AttributeValue> {
        let value = match self {
            Self::Name => {
                let name = path.file_name().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
                })?;
                AttributeValue::Text(name.to_string_lossy().into_owned())
            }
            Self::Size => AttributeValue::Number(fs::metadata(path)?.len()),
            Self::Modified => AttributeValue::Date(fs::metadata(path)?.modified()?.into()),
            Self::Accessed => AttributeValue::Date(fs::metadata(path)?.accessed()?.into()),
            Self::Created => AttributeValue::Date(fs::metadata(path)?.created()?.into()),
        };
        Ok(value)
    }
}

impl FromStr for SortAttribute {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "size" | "file-size" => Ok(Self::Size),
            "modified" | "content-modification-date" => Ok(Self::Modified),
            "accessed" | "content-access-date" => Ok(Self::Accessed),
            "created" | "creation-date" => Ok(Self::Created),
            other => Err(FetchError::Config {
                message: format!("unknown sort attribute: {}", other),
            }),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Value of a file attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Date(DateTime<Utc>),
    Number(u64),
}

impl AttributeValue {
    /// Compare two values of the same kind. Values of different kinds are unordered.
    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Number(a), Self::Number(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Whether the entry on the left sorts before the entry on the right.
///
/// `None` stands for an attribute that could not be read. An unreadable left
/// side always sorts first and an unreadable right side always sorts last,
/// regardless of `order`. Values of different kinds never sort before each
/// other.
pub fn is_ordered_before(
    left: Option<&AttributeValue>,
    right: Option<&AttributeValue>,
    order: SortOrder,
) -> bool {
    let Some(left) = left else {
        return true;
    };
    let Some(right) = right else {
        return false;
    };

    match left.compare(right) {
        Some(ordering) => directed(ordering, order) == Ordering::Less,
        None => false,
    }
}

// Total order consistent with `is_ordered_before` for every pair it decides.
// Two unreadable entries tie, so the stable sort keeps them in listing order.
fn sort_ordering(
    left: Option<&AttributeValue>,
    right: Option<&AttributeValue>,
    order: SortOrder,
) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .compare(b)
            .map(|ordering| directed(ordering, order))
            .unwrap_or(Ordering::Equal),
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

/// Visit the immediate children of `dir` sorted by `attribute`.
///
/// `visit` receives each entry, its zero-based rank and a stop flag; setting
/// the flag ends the walk. If `dir` cannot be listed the failure is logged
/// and `visit` is never called.
pub fn for_each_ordered_entry<F>(
    dir: &Path,
    attribute: SortAttribute,
    order: SortOrder,
    mut visit: F,
) where
    F: FnMut(&Path, usize, &mut bool),
{
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "failed to list directory");
            return;
        }
    };

    let mut keyed: Vec<(PathBuf, Option<AttributeValue>)> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                None
            }
        })
        .map(|path| {
            let value = match attribute.read(&path) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(path = %path.display(), ?attribute, error = %e, "attribute unavailable");
                    None
                }
            };
            (path, value)
        })
        .collect();

    keyed.sort_by(|(_, a), (_, b)| sort_ordering(a.as_ref(), b.as_ref(), order));

    for (index, (path, _)) in keyed.iter().enumerate() {
        let mut stop = false;
        visit(path, index, &mut stop);
        if stop {
            break;
        }
    }
}

/// Collect the immediate children of `dir` sorted by `attribute`.
///
/// Returns an empty list if `dir` cannot be listed.
pub fn ordered_entries(dir: &Path, attribute: SortAttribute, order: SortOrder) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for_each_ordered_entry(dir, attribute, order, |path, _, _| {
        paths.push(path.to_path_buf())
    });
    paths
}
