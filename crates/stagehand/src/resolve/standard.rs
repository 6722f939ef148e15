use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};

use crate::diagnostics::Diagnostics;
use crate::frontend::{Frontend, Simple};
use crate::library::{LibraryConfiguration, LibraryName};
use crate::options::Options;
use crate::path::{FilePath, SEPARATOR};
use crate::resolve::{ExportedModule, Exporter, ModuleCollector};
use crate::snapshot::Snapshot;

/// Sources of the embedded standard library.
const BUILTIN_SOURCES: &[(&str, &str)] = &[
    ("std/config.st", include_str!("../../std/config.st")),
    ("std/core/core.st", include_str!("../../std/core/core.st")),
    ("std/list/list.st", include_str!("../../std/list/list.st")),
    ("std/text/text.st", include_str!("../../std/text/text.st")),
];

static BUILTIN: Lazy<StandardLibrary> = Lazy::new(|| {
    let mut snapshot = Snapshot::new();

    for (path, content) in BUILTIN_SOURCES {
        snapshot.insert_file(path, *content);
    }

    StandardLibrary::from_snapshot(snapshot, Arc::new(Simple::new()))
});

/// A shared handle to the standard library.
///
/// The library is staged at most once per handle, the first time one of its
/// modules is looked up. Clone the handle to share the staged modules between
/// builds.
///
/// # Examples
///
/// ```
/// use stagehand::StandardLibrary;
///
/// let standard = StandardLibrary::builtin();
/// assert_eq!(standard.name().as_str(), "std");
/// assert!(standard.configuration().version.is_some());
/// assert!(standard.modules().any(|m| m.location().to_string() == "std//core/"));
/// ```
#[derive(Clone)]
pub struct StandardLibrary {
    inner: Arc<Inner>,
}

struct Inner {
    name: LibraryName,
    root: FilePath,
    snapshot: Snapshot,
    frontend: Arc<dyn Frontend>,
    built: OnceCell<Built>,
}

struct Built {
    configuration: LibraryConfiguration,
    by_specifier: BTreeMap<String, Arc<ExportedModule>>,
    diagnostics: Diagnostics,
}

impl StandardLibrary {
    /// The embedded standard library, staged with the [`Simple`] frontend.
    ///
    /// Every call returns a handle to the same process-wide library, so it is
    /// staged at most once no matter how many builds use it.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// A standard library built from the given snapshot, where the library
    /// lives in the top-level `std/` directory.
    pub fn from_snapshot(snapshot: Snapshot, frontend: Arc<dyn Frontend>) -> Self {
        let name = LibraryName::standard();
        let root = FilePath::dir(name.as_str());

        Self {
            inner: Arc::new(Inner {
                name,
                root,
                snapshot,
                frontend,
                built: OnceCell::new(),
            }),
        }
    }

    /// The name of the library.
    pub fn name(&self) -> &LibraryName {
        &self.inner.name
    }

    /// The configuration of the library, staging it if necessary.
    pub fn configuration(&self) -> &LibraryConfiguration {
        &self.built().configuration
    }

    /// The staged modules of the library.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<ExportedModule>> + '_ {
        self.built().by_specifier.values()
    }

    /// Diagnostics raised while staging the library.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.built().diagnostics
    }

    fn built(&self) -> &Built {
        self.inner.built.get_or_init(|| self.inner.build())
    }

    pub(crate) fn lookup(
        &self,
        specifier: &str,
        collector: &mut dyn ModuleCollector,
    ) -> Option<Exporter> {
        let module = self.built().by_specifier.get(specifier)?.clone();
        self.add_to(collector);
        Some(Exporter::External(module))
    }

    pub(crate) fn lookup_library(
        &self,
        name: &LibraryName,
        collector: &mut dyn ModuleCollector,
    ) -> Option<LibraryConfiguration> {
        if *name != self.inner.name || !self.add_to(collector) {
            return None;
        }

        Some(self.configuration().clone())
    }

    /// Register the library with a collector, returning `true` the first
    /// time.
    fn add_to(&self, collector: &mut dyn ModuleCollector) -> bool {
        let built = self.built();

        if !collector.configure_library(built.configuration.clone()) {
            return false;
        }

        for module in built.by_specifier.values() {
            collector.add_external(module.clone());
        }

        true
    }
}

impl Inner {
    #[tracing::instrument(skip_all, fields(root = %self.root))]
    fn build(&self) -> Built {
        let options = Options {
            external_libraries: Vec::new(),
            ..Options::default()
        };

        let mut diagnostics = Diagnostics::new();

        let result = crate::prepare(&self.snapshot)
            .with_options(options)
            .with_frontend(self.frontend.clone())
            .without_standard_library()
            .with_diagnostics(&mut diagnostics)
            .build();

        let tentative = LibraryConfiguration::tentative(self.name.clone(), self.root.clone());

        let output = match result {
            Ok(output) => output,
            Err(error) => {
                tracing::error!(%error, "standard library failed to build");

                return Built {
                    configuration: tentative,
                    by_specifier: BTreeMap::new(),
                    diagnostics,
                };
            }
        };

        if diagnostics.has_error() {
            tracing::warn!("standard library built with errors");
        }

        let configuration = output
            .libraries()
            .get_root(&self.root)
            .cloned()
            .unwrap_or(tentative);

        let mut by_specifier = BTreeMap::new();

        for module in output.modules() {
            let Some(name) = module.location().as_name() else {
                continue;
            };

            if name.is_preface() || name.library_root() != self.root {
                continue;
            }

            let Some(exported) = ExportedModule::from_module(module) else {
                tracing::warn!(module = %module.location(), "standard library module is not export ready");
                continue;
            };

            let specifier = format!("{}{SEPARATOR}{}", self.name, name.relative_path());
            by_specifier.insert(specifier, Arc::new(exported));
        }

        Built {
            configuration,
            by_specifier,
            diagnostics,
        }
    }
}

impl fmt::Debug for StandardLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardLibrary")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("built", &self.inner.built.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::StandardLibrary;
    use crate::tests::{build, snapshot};

    #[test]
    fn builtin_is_shared_across_builds() {
        let a = StandardLibrary::builtin();
        let b = StandardLibrary::builtin();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));

        let snapshot = snapshot(&[("a/a.st", "let { yes } = import(\"std/core\");\nexport a = yes;")]);

        let (first, _) = build(&snapshot);
        let (second, _) = build(&snapshot);

        let core = |output: &crate::BuildOutput| {
            output
                .externals()
                .find(|m| m.location().to_string() == "std//core/")
                .cloned()
        };

        match (core(&first), core(&second)) {
            (Some(first), Some(second)) => assert!(Arc::ptr_eq(&first, &second)),
            other => panic!("std//core/ missing from externals: {other:?}"),
        }
    }
}
