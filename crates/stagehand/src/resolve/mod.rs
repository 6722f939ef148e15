//! Resolving import specifiers to the modules which export them.
//!
//! Specifiers come in a few forms:
//! * `file:<path>` names a module by its path from the root of the snapshot.
//! * `./<path>` and `../<path>` are relative to the directory of the
//!   importing module.
//! * `<library>/<path>` names a module in another library. Specifiers for the
//!   standard library are served by [`StandardLibrary`], everything else is
//!   passed to an [`ImportResolver`].

mod standard;

pub use self::standard::StandardLibrary;

use std::collections::BTreeMap;
use std::sync::Arc;

use relative_path::RelativePath;
use serde::Serialize;

use crate::hash::ContentHash;
use crate::library::{LibraryConfiguration, LibraryConfigurations, LibraryName};
use crate::location::{ModuleLocation, ModuleName};
use crate::module::{ImportRecord, Module, ModuleId};
use crate::path::{FilePath, SEPARATOR};
use crate::stage::Stage;
use crate::value::Exports;

/// Prefix of specifiers naming a module by its path in the snapshot.
pub const LOCAL_FILE_SPECIFIER_PREFIX: &str = "file:";

/// A module built elsewhere, such as a module of the standard library.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedModule {
    location: ModuleLocation,
    stage_completed: Option<Stage>,
    #[serde(skip)]
    source_hashes: Vec<ContentHash>,
    import_records: Vec<ImportRecord>,
    exports: Arc<Exports>,
}

impl ExportedModule {
    /// Construct an exported module.
    pub fn new(location: ModuleLocation, exports: Exports) -> Self {
        Self {
            location,
            stage_completed: Some(Stage::Export),
            source_hashes: Vec::new(),
            import_records: Vec::new(),
            exports: Arc::new(exports),
        }
    }

    /// Capture the state of an export ready module.
    pub fn from_module(module: &Module) -> Option<Self> {
        let exports = module.exports()?.clone();

        Some(Self {
            location: module.location().clone(),
            stage_completed: module.stage_completed(),
            source_hashes: module.source_hashes().collect(),
            import_records: module.import_records().to_vec(),
            exports,
        })
    }

    /// The location of the module.
    pub fn location(&self) -> &ModuleLocation {
        &self.location
    }

    /// The stage the module reached.
    pub fn stage_completed(&self) -> Option<Stage> {
        self.stage_completed
    }

    /// Fingerprints of the sources the module was built from.
    pub fn source_hashes(&self) -> &[ContentHash] {
        &self.source_hashes
    }

    /// Imports made by the module.
    pub fn import_records(&self) -> &[ImportRecord] {
        &self.import_records
    }

    /// The exports of the module.
    pub fn exports(&self) -> &Arc<Exports> {
        &self.exports
    }
}

/// Something which satisfies an import.
#[derive(Debug, Clone)]
pub enum Exporter {
    /// A module staged in the current build.
    Local(ModuleId),
    /// A module which was built elsewhere and is always export ready.
    External(Arc<ExportedModule>),
}

/// May be called into by an [`ImportResolver`] to register library
/// configurations and externally built modules on demand.
pub trait ModuleCollector {
    /// Register a configuration, unless its root is already configured.
    ///
    /// Returns `true` if the library was not previously configured.
    fn configure_library(&mut self, configuration: LibraryConfiguration) -> bool;

    /// Register a configuration, replacing any previous configuration for the
    /// same root. Used when a tentative configuration is replaced with one
    /// derived from the configuration module of a library.
    fn reconfigure_library(&mut self, configuration: LibraryConfiguration);

    /// Add a module which was built elsewhere.
    fn add_external(&mut self, module: Arc<ExportedModule>);
}

/// Makes an effort to resolve a non-local specifier to an exporter.
pub trait ImportResolver {
    /// Look up the exporter for `specifier`.
    fn lookup(&self, specifier: &str, collector: &mut dyn ModuleCollector) -> Option<Exporter>;

    /// Look up a library by name so it can be configured ahead of any import
    /// which needs it.
    fn lookup_library(
        &self,
        name: &LibraryName,
        collector: &mut dyn ModuleCollector,
    ) -> Option<LibraryConfiguration> {
        let _ = (name, collector);
        None
    }
}

/// An [`ImportResolver`] which resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
#[non_exhaustive]
pub struct ImportNone;

impl ImportResolver for ImportNone {
    #[inline]
    fn lookup(&self, _: &str, _: &mut dyn ModuleCollector) -> Option<Exporter> {
        None
    }
}

/// The library configurations and external modules registered during a
/// build.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    pub(crate) libraries: LibraryConfigurations,
    pub(crate) externals: BTreeMap<ModuleLocation, Arc<ExportedModule>>,
}

impl ModuleCollector for Collector {
    fn configure_library(&mut self, configuration: LibraryConfiguration) -> bool {
        let root = configuration.root.clone();
        let added = self.libraries.add(configuration, false);

        if added {
            tracing::debug!(%root, "library configured");
        }

        added
    }

    fn reconfigure_library(&mut self, configuration: LibraryConfiguration) {
        tracing::debug!(root = %configuration.root, name = %configuration.name, "library reconfigured");
        self.libraries.add(configuration, true);
    }

    fn add_external(&mut self, module: Arc<ExportedModule>) {
        self.externals.insert(module.location.clone(), module);
    }
}

/// Routes non-local lookups to the standard library or to the external
/// resolver.
pub(crate) struct NonLocal<'a> {
    pub(crate) standard: Option<&'a StandardLibrary>,
    pub(crate) external: &'a dyn ImportResolver,
}

impl NonLocal<'_> {
    fn standard_for(&self, name: &str) -> Option<&StandardLibrary> {
        self.standard.filter(|standard| standard.name().as_str() == name)
    }
}

impl ImportResolver for NonLocal<'_> {
    fn lookup(&self, specifier: &str, collector: &mut dyn ModuleCollector) -> Option<Exporter> {
        let library = specifier.split(SEPARATOR).next().unwrap_or_default();

        match self.standard_for(library) {
            Some(standard) => standard.lookup(specifier, collector),
            None => self.external.lookup(specifier, collector),
        }
    }

    fn lookup_library(
        &self,
        name: &LibraryName,
        collector: &mut dyn ModuleCollector,
    ) -> Option<LibraryConfiguration> {
        match self.standard_for(name.as_str()) {
            Some(standard) => standard.lookup_library(name, collector),
            None => self.external.lookup_library(name, collector),
        }
    }
}

/// The local specifier used to look up a module.
pub(crate) fn local_specifier(name: &ModuleName) -> String {
    format!("{LOCAL_FILE_SPECIFIER_PREFIX}{}", name.source_file())
}

/// Convert a `file:` or relative specifier into the local form, relative
/// specifiers being resolved against `dir`.
///
/// Returns `None` for non-local specifiers and for relative specifiers which
/// escape the root of the snapshot.
pub(crate) fn localize(specifier: &str, dir: &FilePath) -> Option<String> {
    if specifier.starts_with(LOCAL_FILE_SPECIFIER_PREFIX) {
        return Some(specifier.to_owned());
    }

    if !(specifier.starts_with("./") || specifier.starts_with("../")) {
        return None;
    }

    let joined = dir.to_relative_path_buf().join(RelativePath::new(specifier));
    let path = FilePath::from_relative(&joined, specifier.ends_with(SEPARATOR))?;
    Some(format!("{LOCAL_FILE_SPECIFIER_PREFIX}{path}"))
}

/// Try to convert a non-local specifier to a local specifier when it names
/// the library of the importer.
pub(crate) fn to_local_specifier(
    specifier: &str,
    importer: &ModuleName,
    configuration: &LibraryConfiguration,
) -> Option<String> {
    let (library, rest) = specifier.split_once(SEPARATOR)?;

    if library != configuration.name.as_str()
        || !importer.source_file().is_within(&configuration.root)
    {
        return None;
    }

    Some(format!(
        "{LOCAL_FILE_SPECIFIER_PREFIX}{}{rest}",
        configuration.root
    ))
}

#[cfg(test)]
mod tests {
    use super::{localize, to_local_specifier};
    use crate::library::{LibraryConfiguration, LibraryName};
    use crate::location::ModuleName;
    use crate::path::FilePath;

    #[test]
    fn localize_relative() {
        let dir = FilePath::dir("work/b");

        assert_eq!(localize("../a", &dir).as_deref(), Some("file:work/a"));
        assert_eq!(localize("../a/", &dir).as_deref(), Some("file:work/a/"));
        assert_eq!(localize("./c/", &dir).as_deref(), Some("file:work/b/c/"));
        assert_eq!(localize("file:x/", &dir).as_deref(), Some("file:x/"));
        assert_eq!(localize("../../../x", &dir), None);
        assert_eq!(localize("std/core", &dir), None);
    }

    #[test]
    fn same_library() {
        let name = LibraryName::new("my-lib").unwrap();
        let config = LibraryConfiguration::tentative(name, FilePath::dir("work"));
        let importer = ModuleName::new(FilePath::dir("work/src"), 1, false);

        assert_eq!(
            to_local_specifier("my-lib/util/", &importer, &config).as_deref(),
            Some("file:work/util/")
        );

        assert_eq!(to_local_specifier("other/util/", &importer, &config), None);

        let root = LibraryConfiguration::tentative(
            LibraryName::new("my-lib").unwrap(),
            FilePath::root(),
        );
        let importer = ModuleName::new(FilePath::dir("src"), 0, false);

        assert_eq!(
            to_local_specifier("my-lib/util/", &importer, &root).as_deref(),
            Some("file:util/")
        );
    }
}
