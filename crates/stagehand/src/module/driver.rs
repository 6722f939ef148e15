use crate::diagnostics::{Anchor, Diagnostics};
use crate::library::LibraryConfiguration;
use crate::location::ModuleLocation;
use crate::source::ModuleSource;
use crate::stage::Stage;
use crate::value::Exports;

/// A binding requested by a module, revealed while advancing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    /// The specifier text as written.
    pub specifier: String,
    /// Where the import appears, used for diagnostics and to identify the
    /// import site when resolving it.
    pub anchor: Anchor,
    /// Blocking imports keep the importer from advancing until the exporter
    /// is export ready. Fire-and-forget imports only register intent.
    pub blocking: bool,
}

/// How an import was resolved, passed back to the [`StageDriver`] which
/// revealed it.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub enum Resolution<'a> {
    /// The import is bound to the exports of an export ready module.
    Bound {
        /// The module providing the binding.
        exporter: &'a ModuleLocation,
        /// What it exports.
        exports: &'a Exports,
    },
    /// A fire-and-forget import was found, so the import site can be dropped.
    Dropped,
    /// The import could not be satisfied, the import site should be replaced
    /// with an error node carrying `message`.
    Failed {
        /// Description of the failure, already reported as a diagnostic.
        message: &'a str,
    },
}

/// Context passed to [`StageDriver::advance`].
#[non_exhaustive]
pub struct StageContext<'a> {
    /// The module being advanced.
    pub location: &'a ModuleLocation,
    /// The stage being advanced to.
    pub stage: Stage,
    /// Sources the module is built from.
    pub sources: &'a [ModuleSource],
    /// Exports of the preface module, once it is export ready.
    pub outer: Option<&'a Exports>,
    /// The configuration of the library the module belongs to.
    pub library: Option<&'a LibraryConfiguration>,
    /// Where problems with the module are reported.
    pub diagnostics: &'a mut Diagnostics,
}

/// The result of advancing a module by one stage.
#[derive(Debug)]
#[non_exhaustive]
pub struct Advanced {
    /// The stage which was completed.
    pub stage: Stage,
    /// Imports revealed by the stage.
    pub imports: Vec<ImportRequest>,
}

impl Advanced {
    /// Construct the result of completing `stage`.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            imports: Vec::new(),
        }
    }

    /// Add imports revealed by the stage.
    pub fn with_imports(self, imports: Vec<ImportRequest>) -> Self {
        Self { imports, ..self }
    }
}

/// The collaborator which does the actual work of each stage.
///
/// The scheduler only tracks which stage a module has completed, every
/// other piece of state belongs to the driver.
pub trait StageDriver {
    /// Do the work of [`StageContext::stage`], which is always the stage
    /// directly following the one most recently completed.
    ///
    /// # Panics
    ///
    /// The scheduler panics if the returned stage is not the requested one.
    fn advance(&mut self, cx: StageContext<'_>) -> Advanced;

    /// Test if the driver is able to advance any further.
    fn can_advance(&self) -> bool {
        true
    }

    /// Resolve an import previously revealed by [`StageDriver::advance`],
    /// identified by its anchor.
    fn resolve_import(&mut self, anchor: &Anchor, resolution: Resolution<'_>);

    /// The exports of the module. Only called once the export stage has been
    /// completed.
    fn exports(&self) -> Exports;
}
