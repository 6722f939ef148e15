use core::cmp::Ordering;
use core::fmt::{self, Display};

use serde::{Serialize, Serializer};

use crate::path::{FilePath, SEPARATOR};

/// Identifies a module.
///
/// Locations sort with [`ModuleLocation::Implicits`] first, then by path with
/// a preface sorting before the body module at the same path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleLocation {
    /// The module which is implicitly imported by every other module.
    Implicits,
    /// A module backed by files in the tree.
    Named(ModuleName),
}

impl ModuleLocation {
    /// Access the module name, if this is a named location.
    pub fn as_name(&self) -> Option<&ModuleName> {
        match self {
            ModuleLocation::Implicits => None,
            ModuleLocation::Named(name) => Some(name),
        }
    }
}

impl PartialOrd for ModuleLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ModuleLocation::Implicits, ModuleLocation::Implicits) => Ordering::Equal,
            (ModuleLocation::Implicits, ModuleLocation::Named(..)) => Ordering::Less,
            (ModuleLocation::Named(..), ModuleLocation::Implicits) => Ordering::Greater,
            (ModuleLocation::Named(a), ModuleLocation::Named(b)) => a.cmp(b),
        }
    }
}

impl From<ModuleName> for ModuleLocation {
    #[inline]
    fn from(name: ModuleName) -> Self {
        ModuleLocation::Named(name)
    }
}

impl fmt::Display for ModuleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleLocation::Implicits => f.write_str("implicits"),
            ModuleLocation::Named(name) => name.fmt(f),
        }
    }
}

impl Serialize for ModuleLocation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// The name of a module backed by source files.
///
/// A directory of source files forms one module, while the library
/// configuration file forms a module of its own. The first
/// `library_root_segment_count` segments of the path name the library root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleName {
    source_file: FilePath,
    library_root_segment_count: usize,
    is_preface: bool,
}

impl ModuleName {
    /// Construct a new module name.
    ///
    /// # Panics
    ///
    /// Panics if the library root has more segments than the path.
    pub fn new(source_file: FilePath, library_root_segment_count: usize, is_preface: bool) -> Self {
        assert!(
            library_root_segment_count <= source_file.len(),
            "library root of {library_root_segment_count} segments is outside of {source_file}"
        );

        Self {
            source_file,
            library_root_segment_count,
            is_preface,
        }
    }

    /// The path of the module, a directory or a configuration file.
    pub fn source_file(&self) -> &FilePath {
        &self.source_file
    }

    /// The number of segments in the path which belong to the library root.
    pub fn library_root_segment_count(&self) -> usize {
        self.library_root_segment_count
    }

    /// Test if this names a preface module.
    pub fn is_preface(&self) -> bool {
        self.is_preface
    }

    /// The same path but naming the preface or the body module.
    pub fn with_preface(&self, is_preface: bool) -> Self {
        Self {
            is_preface,
            ..self.clone()
        }
    }

    /// The library root directory.
    pub fn library_root(&self) -> FilePath {
        self.source_file.prefix(self.library_root_segment_count)
    }

    /// The path relative to the library root.
    pub fn relative_path(&self) -> FilePath {
        self.source_file.suffix(self.library_root_segment_count)
    }

    /// The directory the module lives in.
    pub fn dir(&self) -> FilePath {
        self.source_file.dir_name()
    }
}

impl PartialOrd for ModuleName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.source_file
            .cmp(&other.source_file)
            // preface sorts before the body.
            .then_with(|| other.is_preface.cmp(&self.is_preface))
            .then_with(|| {
                self.library_root_segment_count
                    .cmp(&other.library_root_segment_count)
            })
    }
}

impl fmt::Display for ModuleName {
    /// Renders as `lib/root//relative/path/` so that the library boundary is
    /// visible, with a `:preface` suffix for prefaces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, segment) in self
            .source_file
            .segments()
            .take(self.library_root_segment_count)
            .enumerate()
        {
            if n > 0 {
                write!(f, "{SEPARATOR}")?;
            }

            f.write_str(segment)?;
        }

        write!(f, "{SEPARATOR}{SEPARATOR}")?;
        self.relative_path().fmt(f)?;

        if self.is_preface {
            f.write_str(":preface")?;
        }

        Ok(())
    }
}

impl Serialize for ModuleName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{ModuleLocation, ModuleName};
    use crate::path::FilePath;

    #[test]
    fn display() {
        let name = ModuleName::new(FilePath::dir("work/src"), 1, false);
        assert_eq!(name.to_string(), "work//src/");
        assert_eq!(name.with_preface(true).to_string(), "work//src/:preface");

        let config = ModuleName::new(FilePath::file("work/config.st"), 1, false);
        assert_eq!(config.to_string(), "work//config.st");
        assert_eq!(config.library_root(), FilePath::dir("work"));
    }

    #[test]
    fn ordering() {
        let body = ModuleName::new(FilePath::dir("a"), 0, false);
        let preface = body.with_preface(true);
        let other = ModuleName::new(FilePath::dir("b"), 0, false);

        let mut locations = vec![
            ModuleLocation::from(other.clone()),
            ModuleLocation::from(body.clone()),
            ModuleLocation::Implicits,
            ModuleLocation::from(preface.clone()),
        ];

        locations.sort();

        assert_eq!(
            locations,
            vec![
                ModuleLocation::Implicits,
                ModuleLocation::from(preface),
                ModuleLocation::from(body),
                ModuleLocation::from(other),
            ]
        );
    }
}
