//! Turns `|Parent|Child` category paths into host categories.
//!
//! Categories are matched by name alone, so the same leaf name under two
//! different parents collapses into whichever node was created first.

use tracing::debug;

use crate::host::{CategoryStore, HostError};

pub const PATH_DELIMITER: char = '|';
pub const LIST_DELIMITER: char = ',';

/// Split one path into its non-empty, trimmed segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(PATH_DELIMITER)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Leaf of the path with the most segments in a comma separated list.
///
/// Ties go to the last of the longest paths.
pub fn deepest_leaf(paths: &str) -> Option<&str> {
    let mut best: Option<Vec<&str>> = None;
    for path in paths.split(LIST_DELIMITER) {
        let segments = split_path(path);
        if segments.is_empty() {
            continue;
        }
        if best
            .as_ref()
            .is_none_or(|current| segments.len() >= current.len())
        {
            best = Some(segments);
        }
    }
    best.and_then(|segments| segments.last().copied())
}

pub struct CategoryResolver<'a, C: ?Sized> {
    store: &'a C,
    root: Option<u64>,
}

impl<'a, C> CategoryResolver<'a, C>
where
    C: CategoryStore + ?Sized,
{
    /// `root` is the parent given to the first segment of every path.
    pub fn new(store: &'a C, root: Option<u64>) -> Self {
        Self { store, root }
    }

    /// Create every missing segment of `paths`, parents first.
    ///
    /// Returns how many categories were created.
    pub fn ensure_paths<S: AsRef<str>>(&self, paths: &[S]) -> Result<usize, HostError> {
        let mut created = 0;
        for path in paths {
            let mut parent = self.root;
            for segment in split_path(path.as_ref()) {
                let category = match self.store.find_category(segment)? {
                    Some(existing) => existing,
                    None => {
                        let category = self.store.create_category(segment, parent)?;
                        debug!(name = segment, id = category.id, ?parent, "created category");
                        created += 1;
                        category
                    }
                };
                parent = Some(category.id);
            }
        }
        if !paths.is_empty() {
            self.store.rebuild_paths()?;
        }
        Ok(created)
    }

    /// Host category for a course's comma separated paths.
    ///
    /// Falls back to the root category when there is no usable path or its
    /// leaf does not exist on the host.
    pub fn resolve_target(&self, paths: Option<&str>) -> Result<Option<u64>, HostError> {
        let Some(leaf) = paths.and_then(deepest_leaf) else {
            return Ok(self.root);
        };
        Ok(self
            .store
            .find_category(leaf)?
            .map(|category| category.id)
            .or(self.root))
    }
}
