use core::ops::Range;
use std::sync::Arc;

use crate::hash::ContentHash;
use crate::path::FilePath;

/// A fragment of a source file that a module is built from.
///
/// Files with a preface contribute one fragment to the preface module and
/// one to the body module. Both fragments share the content hash of the
/// whole file.
#[derive(Debug, Clone)]
pub struct ModuleSource {
    path: FilePath,
    hash: ContentHash,
    content: Arc<str>,
    range: Range<usize>,
}

impl ModuleSource {
    /// Construct a fragment covering `range` of the file `content`.
    pub fn new(path: FilePath, hash: ContentHash, content: Arc<str>, range: Range<usize>) -> Self {
        Self {
            path,
            hash,
            content,
            range,
        }
    }

    /// Construct a fragment covering all of `content`.
    pub fn whole(path: FilePath, content: &str) -> Self {
        let hash = ContentHash::of(content.as_bytes());
        let range = 0..content.len();
        Self::new(path, hash, content.into(), range)
    }

    /// The file the fragment was taken from.
    pub fn path(&self) -> &FilePath {
        &self.path
    }

    /// The fingerprint of the whole file.
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// The text of the fragment.
    pub fn as_str(&self) -> &str {
        &self.content[self.range.clone()]
    }

    /// Byte offset of the fragment in the file.
    pub fn offset(&self) -> usize {
        self.range.start
    }

    /// The text of the whole file.
    pub fn file_content(&self) -> &str {
        &self.content
    }
}
