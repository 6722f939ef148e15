//! Paths into a file tree snapshot.

use core::fmt;
use core::str::FromStr;

use relative_path::{Component, RelativePath, RelativePathBuf};
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The separator used between path segments.
pub const SEPARATOR: char = '/';

/// A path relative to the root of a file tree snapshot.
///
/// Unlike a plain string path, a `FilePath` remembers whether it names a
/// directory, which is rendered with a trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilePath {
    segments: Vec<Box<str>>,
    is_dir: bool,
}

impl FilePath {
    /// The empty directory path, the root of a snapshot.
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
            is_dir: true,
        }
    }

    /// Construct a path from segments.
    pub fn new<I>(segments: I, is_dir: bool) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Box<str>>,
    {
        let segments = segments.into_iter().map(Into::into).collect::<Vec<_>>();

        Self {
            is_dir: is_dir || segments.is_empty(),
            segments,
        }
    }

    /// Construct a directory path from a `/` separated string.
    pub fn dir(path: &str) -> Self {
        Self::new(split(path), true)
    }

    /// Construct a file path from a `/` separated string.
    pub fn file(path: &str) -> Self {
        Self::new(split(path), false)
    }

    /// Convert a relative path, normalizing `.` and `..` components.
    ///
    /// Returns `None` if the path escapes the root.
    pub fn from_relative(path: &RelativePath, is_dir: bool) -> Option<Self> {
        let mut segments = Vec::new();

        for component in path.normalize().components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => return None,
                Component::Normal(segment) => segments.push(Box::<str>::from(segment)),
            }
        }

        Some(Self::new(segments, is_dir))
    }

    /// Convert into a relative path.
    pub fn to_relative_path_buf(&self) -> RelativePathBuf {
        let mut buf = RelativePathBuf::new();

        for segment in &self.segments {
            buf.push(&**segment);
        }

        buf
    }

    /// The segments of the path.
    pub fn segments(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.segments.iter().map(|s| &**s)
    }

    /// The number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Test if this is the empty path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Test if the path names a directory.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Test if the path names a file.
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    /// The last segment of the path.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(|s| &**s)
    }

    /// Resolve a child of this directory.
    pub fn join(&self, segment: &str, is_dir: bool) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments, is_dir }
    }

    /// The directory containing this path.
    ///
    /// For directories this is the directory itself.
    pub fn dir_name(&self) -> Self {
        if self.is_dir {
            return self.clone();
        }

        self.prefix(self.segments.len().saturating_sub(1))
    }

    /// The directory made up of the first `count` segments.
    pub fn prefix(&self, count: usize) -> Self {
        Self::new(self.segments[..count.min(self.segments.len())].iter().cloned(), true)
    }

    /// The path with the first `count` segments removed.
    pub fn suffix(&self, count: usize) -> Self {
        Self::new(
            self.segments[count.min(self.segments.len())..].iter().cloned(),
            self.is_dir,
        )
    }

    /// Test if this path is `dir` or a descendant of it.
    pub fn is_within(&self, dir: &FilePath) -> bool {
        dir.is_dir
            && dir.segments.len() <= self.segments.len()
            && dir.segments.iter().zip(&self.segments).all(|(a, b)| a == b)
    }

    /// Write the segments joined by [`SEPARATOR`] with a trailing separator
    /// for non-empty directories.
    fn write_joined(&self, f: &mut dyn fmt::Write) -> fmt::Result {
        for (n, segment) in self.segments.iter().enumerate() {
            if n > 0 {
                f.write_char(SEPARATOR)?;
            }

            f.write_str(segment)?;
        }

        if self.is_dir && !self.segments.is_empty() {
            f.write_char(SEPARATOR)?;
        }

        Ok(())
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty() && *s != ".")
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_joined(f)
    }
}

impl FromStr for FilePath {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.ends_with(SEPARATOR) {
            Ok(Self::dir(s))
        } else {
            Ok(Self::file(s))
        }
    }
}

impl Serialize for FilePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FilePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = FilePath;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a `/` separated path")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match value.parse() {
                    Ok(path) => Ok(path),
                    Err(error) => match error {},
                }
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}
