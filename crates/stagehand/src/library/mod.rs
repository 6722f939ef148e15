//! Library configurations and the registry mapping file tree locations to the
//! library which owns them.


use core::fmt;
use core::str::FromStr;

use semver::Version;
use serde::{Serialize, Serializer};

use crate::path::FilePath;
use crate::value::{Exports, Value};

/// The name of the standard library.
pub const STANDARD_LIBRARY_NAME: &str = "std";

/// The name given to libraries when nothing better can be guessed.
const FALLBACK_LIBRARY_NAME: &str = "unnamed";

/// Error raised for an invalid library name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{name}` is not a valid library name")]
pub struct LibraryNameError {
    name: Box<str>,
}

/// The name of a library, a dashed identifier like `my-library`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LibraryName(Box<str>);

impl LibraryName {
    /// Construct a library name, validating that it is a dashed identifier.
    pub fn new(name: &str) -> Result<Self, LibraryNameError> {
        if is_dashed_identifier(name) {
            Ok(Self(name.into()))
        } else {
            Err(LibraryNameError { name: name.into() })
        }
    }

    /// Coerce arbitrary text such as a directory name into a library name.
    ///
    /// ASCII letters are lowercased, runs of other characters turn into a
    /// single dash, and a leading digit is prefixed with `x-`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stagehand::LibraryName;
    ///
    /// assert_eq!(LibraryName::guess("My Library").unwrap().as_str(), "my-library");
    /// assert_eq!(LibraryName::guess("2d").unwrap().as_str(), "x-2d");
    /// assert!(LibraryName::guess("...").is_none());
    /// ```
    pub fn guess(text: &str) -> Option<Self> {
        let mut out = String::new();
        let mut pending_dash = false;

        for c in text.chars() {
            let c = c.to_ascii_lowercase();

            if is_continue(c) {
                if out.is_empty() {
                    if c.is_ascii_digit() {
                        out.push_str("x-");
                    }
                } else if pending_dash {
                    out.push('-');
                }

                pending_dash = false;
                out.push(c);
            } else if !out.is_empty() {
                pending_dash = true;
            }
        }

        Self::new(&out).ok()
    }

    /// The fallback name used when nothing can be guessed.
    pub fn fallback() -> Self {
        Self(FALLBACK_LIBRARY_NAME.into())
    }

    /// The name of the standard library.
    pub fn standard() -> Self {
        Self(STANDARD_LIBRARY_NAME.into())
    }

    /// Access the name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_dashed_identifier(text: &str) -> bool {
    let mut chars = text.chars();

    let Some(first) = chars.next() else {
        return false;
    };

    if !is_start(first) {
        return false;
    }

    let mut after_dash = false;

    for c in chars {
        match c {
            '-' if !after_dash => after_dash = true,
            c if is_continue(c) => after_dash = false,
            _ => return false,
        }
    }

    !after_dash
}

impl fmt::Display for LibraryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LibraryName {
    type Err = LibraryNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for LibraryName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// The configuration of a single library.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct LibraryConfiguration {
    /// The name of the library.
    pub name: LibraryName,
    /// The directory containing the library configuration file.
    pub root: FilePath,
    /// Output targets the library supports.
    pub targets: Vec<String>,
    /// Declared version of the library.
    #[serde(serialize_with = "serialize_version")]
    pub version: Option<Version>,
    /// Every value exported by the configuration module.
    pub values: Exports,
}

fn serialize_version<S>(version: &Option<Version>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match version {
        Some(version) => serializer.collect_str(version),
        None => serializer.serialize_none(),
    }
}

impl LibraryConfiguration {
    /// Construct a configuration with nothing but a name and a root, used
    /// until the configuration module of the library has been staged.
    pub fn tentative(name: LibraryName, root: FilePath) -> Self {
        debug_assert!(root.is_dir(), "library root {root} must be a directory");

        Self {
            name,
            root,
            targets: Vec::new(),
            version: None,
            values: Exports::new(),
        }
    }

    /// Set the version of the configuration.
    pub fn with_version(self, version: Version) -> Self {
        Self {
            version: Some(version),
            ..self
        }
    }

    /// Derive a configuration from the exports of a configuration module.
    ///
    /// Fields which are missing or malformed in the exports are inherited
    /// from `previous`.
    pub fn from_exports(
        root: FilePath,
        exports: &Exports,
        previous: Option<&LibraryConfiguration>,
    ) -> Self {
        let name = exports
            .get("name")
            .and_then(Value::as_str)
            .and_then(|name| LibraryName::new(name).ok())
            .or_else(|| previous.map(|c| c.name.clone()))
            .or_else(|| root.last().and_then(LibraryName::guess))
            .unwrap_or_else(LibraryName::fallback);

        let targets = match exports.get("targets").and_then(Value::as_list) {
            Some(targets) => targets
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            None => previous.map(|c| c.targets.clone()).unwrap_or_default(),
        };

        let version = match exports.get("version").and_then(Value::as_str) {
            Some(version) => Version::parse(version).ok(),
            None => previous.and_then(|c| c.version.clone()),
        };

        Self {
            name,
            root,
            targets,
            version,
            values: exports.clone(),
        }
    }

    /// Test if two configurations declare the same library, by name and
    /// version.
    pub fn same_identity(&self, other: &LibraryConfiguration) -> bool {
        self.name == other.name && self.version == other.version
    }
}

/// The registry of library configurations.
///
/// Configurations are kept ordered by descending root depth, so the first
/// configuration containing a path is the one with the deepest root.
#[derive(Debug, Clone, Default)]
pub struct LibraryConfigurations {
    configurations: Vec<LibraryConfiguration>,
}

impl LibraryConfigurations {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration.
    ///
    /// If a configuration is already registered for the same root it is only
    /// replaced if `replace` is set. Returns `true` if the registry changed.
    pub fn add(&mut self, configuration: LibraryConfiguration, replace: bool) -> bool {
        if let Some(existing) = self
            .configurations
            .iter_mut()
            .find(|c| c.root == configuration.root)
        {
            if !replace {
                return false;
            }

            *existing = configuration;
            return true;
        }

        let depth = configuration.root.len();
        let at = self
            .configurations
            .iter()
            .position(|c| c.root.len() < depth)
            .unwrap_or(self.configurations.len());

        self.configurations.insert(at, configuration);
        true
    }

    /// Find the configuration of the library with the deepest root
    /// containing `path`.
    pub fn get(&self, path: &FilePath) -> Option<&LibraryConfiguration> {
        self.configurations.iter().find(|c| path.is_within(&c.root))
    }

    /// Find the configuration registered for exactly `root`.
    pub fn get_root(&self, root: &FilePath) -> Option<&LibraryConfiguration> {
        self.configurations.iter().find(|c| c.root == *root)
    }

    /// Find a configuration by library name.
    pub fn get_by_name(&self, name: &LibraryName) -> Option<&LibraryConfiguration> {
        self.configurations.iter().find(|c| c.name == *name)
    }

    /// Iterate over configurations, deepest roots first.
    pub fn iter(&self) -> impl Iterator<Item = &LibraryConfiguration> + '_ {
        self.configurations.iter()
    }

    /// The number of registered configurations.
    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    /// Test if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Names which are claimed by more than one library root, along with
    /// those roots in sorted order.
    pub fn duplicate_names(&self) -> Vec<(LibraryName, Vec<FilePath>)> {
        let mut by_name = std::collections::BTreeMap::<_, Vec<_>>::new();

        for c in &self.configurations {
            by_name.entry(c.name.clone()).or_default().push(c.root.clone());
        }

        by_name
            .into_iter()
            .filter(|(_, roots)| roots.len() > 1)
            .map(|(name, mut roots)| {
                roots.sort();
                (name, roots)
            })
            .collect()
    }
}

impl IntoIterator for LibraryConfigurations {
    type Item = LibraryConfiguration;
    type IntoIter = std::vec::IntoIter<LibraryConfiguration>;

    fn into_iter(self) -> Self::IntoIter {
        self.configurations.into_iter()
    }
}
