//! Snapshots of a file tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::hash::ContentHash;
use crate::path::FilePath;

/// Error raised when a snapshot can't be read from disk.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SnapshotError {
    /// The root of the snapshot could not be read.
    #[error("Failed to read `{path}`")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
    /// A file name in the tree is not valid UTF-8.
    #[error("File name `{path}` is not valid UTF-8")]
    NonUtf8Name {
        /// The offending path.
        path: PathBuf,
    },
}

/// A single entry in a [`Snapshot`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Entry {
    /// A directory and the paths of its children.
    Dir {
        /// Children in sorted order.
        children: BTreeSet<FilePath>,
    },
    /// A file whose content was read at the time of the snapshot.
    File {
        /// Raw content.
        content: Arc<[u8]>,
        /// Fingerprint of the content.
        hash: ContentHash,
    },
    /// A file which changed after it was read, so its content can't be
    /// trusted.
    Skewed,
    /// A file that exists but could not be read.
    Unavailable,
}

/// An immutable view of a file tree, keyed by [`FilePath`].
///
/// # Examples
///
/// ```
/// use stagehand::{FilePath, Snapshot};
///
/// let mut snapshot = Snapshot::new();
/// snapshot.insert_file("work/src/a.st", "export a = 1;");
///
/// assert!(snapshot.get(&FilePath::dir("work/src")).is_some());
/// assert_eq!(snapshot.content(&FilePath::file("work/src/a.st")), Some(&b"export a = 1;"[..]));
/// ```
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: BTreeMap<FilePath, Entry>,
}

impl Snapshot {
    /// Construct a new snapshot containing only the empty root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();

        entries.insert(
            FilePath::root(),
            Entry::Dir {
                children: BTreeSet::new(),
            },
        );

        Self { entries }
    }

    /// Read a snapshot of the directory tree at `root`.
    ///
    /// Files that can't be read are recorded as [`Entry::Unavailable`]
    /// instead of failing the whole snapshot.
    pub fn from_directory(root: &Path) -> Result<Self, SnapshotError> {
        let mut snapshot = Self::new();
        let mut queue = vec![(root.to_owned(), FilePath::root())];

        while let Some((dir, path)) = queue.pop() {
            let read = fs::read_dir(&dir).map_err(|error| SnapshotError::Io {
                path: dir.clone(),
                error,
            })?;

            for entry in read {
                let entry = entry.map_err(|error| SnapshotError::Io {
                    path: dir.clone(),
                    error,
                })?;

                let os_path = entry.path();

                let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                    return Err(SnapshotError::NonUtf8Name { path: os_path });
                };

                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

                if is_dir {
                    let child = path.join(&name, true);
                    snapshot.insert_dir(&child);
                    queue.push((os_path, child));
                    continue;
                }

                let child = path.join(&name, false);

                match fs::read(&os_path) {
                    Ok(content) => snapshot.insert(child, content),
                    Err(error) => {
                        tracing::debug!(path = %os_path.display(), %error, "unreadable file");
                        snapshot.insert_entry(child, Entry::Unavailable);
                    }
                }
            }
        }

        Ok(snapshot)
    }

    /// Insert a file using a `/` separated path.
    pub fn insert_file(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        self.insert(FilePath::file(path), content.into());
    }

    /// Insert a file which exists but can't be read.
    pub fn insert_unavailable(&mut self, path: &str) {
        self.insert_entry(FilePath::file(path), Entry::Unavailable);
    }

    /// Insert a file whose content changed after it was read.
    pub fn insert_skewed(&mut self, path: &str) {
        self.insert_entry(FilePath::file(path), Entry::Skewed);
    }

    /// Remove a file from the snapshot.
    pub fn remove_file(&mut self, path: &str) -> bool {
        let path = FilePath::file(path);

        if self.entries.remove(&path).is_none() {
            return false;
        }

        if let Some(Entry::Dir { children }) = self.entries.get_mut(&path.dir_name()) {
            children.remove(&path);
        }

        true
    }

    fn insert(&mut self, path: FilePath, content: Vec<u8>) {
        let hash = ContentHash::of(&content);

        self.insert_entry(
            path,
            Entry::File {
                content: content.into(),
                hash,
            },
        );
    }

    fn insert_entry(&mut self, path: FilePath, entry: Entry) {
        let parent = path.dir_name();
        self.insert_dir(&parent);

        if let Some(Entry::Dir { children }) = self.entries.get_mut(&parent) {
            children.insert(path.clone());
        }

        self.entries.insert(path, entry);
    }

    fn insert_dir(&mut self, dir: &FilePath) {
        for n in 0..=dir.len() {
            let current = dir.prefix(n);

            if !self.entries.contains_key(&current) {
                self.entries.insert(
                    current.clone(),
                    Entry::Dir {
                        children: BTreeSet::new(),
                    },
                );
            }

            if n > 0 {
                if let Some(Entry::Dir { children }) = self.entries.get_mut(&dir.prefix(n - 1)) {
                    children.insert(current);
                }
            }
        }
    }

    /// Look up the entry at the given path.
    pub fn get(&self, path: &FilePath) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Look up the content of a readable file.
    pub fn content(&self, path: &FilePath) -> Option<&[u8]> {
        match self.entries.get(path)? {
            Entry::File { content, .. } => Some(&content[..]),
            _ => None,
        }
    }

    /// Iterate over all readable files.
    pub fn files(&self) -> impl Iterator<Item = (&FilePath, &[u8])> + '_ {
        self.entries.iter().filter_map(|(path, entry)| match entry {
            Entry::File { content, .. } => Some((path, &content[..])),
            _ => None,
        })
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Entry, Snapshot};
    use crate::path::FilePath;

    #[test]
    fn directories_are_implied() {
        let mut snapshot = Snapshot::new();
        snapshot.insert_file("a/b/c.st", "x");

        let Some(Entry::Dir { children }) = snapshot.get(&FilePath::root()) else {
            panic!("missing root");
        };

        assert!(children.contains(&FilePath::dir("a")));

        let Some(Entry::Dir { children }) = snapshot.get(&FilePath::dir("a/b")) else {
            panic!("missing a/b");
        };

        assert!(children.contains(&FilePath::file("a/b/c.st")));
    }

    #[test]
    fn same_content_same_hash() {
        let mut snapshot = Snapshot::new();
        snapshot.insert_file("a.st", "x");
        snapshot.insert_file("b.st", "x");
        snapshot.insert_file("c.st", "y");

        let hash = |path: &str| match snapshot.get(&FilePath::file(path)) {
            Some(Entry::File { hash, .. }) => *hash,
            _ => panic!("missing {path}"),
        };

        assert_eq!(hash("a.st"), hash("b.st"));
        assert_ne!(hash("a.st"), hash("c.st"));
    }

    #[test]
    fn remove() {
        let mut snapshot = Snapshot::new();
        snapshot.insert_file("a/b.st", "x");
        assert!(snapshot.remove_file("a/b.st"));
        assert!(!snapshot.remove_file("a/b.st"));

        let Some(Entry::Dir { children }) = snapshot.get(&FilePath::dir("a")) else {
            panic!("missing a");
        };

        assert!(children.is_empty());
    }
}
