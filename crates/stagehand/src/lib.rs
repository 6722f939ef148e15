//! A module staging scheduler for multi-stage compilers.
//!
//! Source trees are split into modules, one per directory plus one per
//! library configuration file. Every module is advanced one [Stage] at a
//! time by a [StageDriver], which reveals the imports of the module as it
//! goes. The scheduler:
//!
//! * Holds an importer back until the module it imports from is export
//!   ready.
//! * Resolves import specifiers to local modules, the [StandardLibrary], or
//!   whatever an [ImportResolver] provides.
//! * Breaks import cycles deterministically instead of rejecting them.
//! * Reuses modules from a [PriorBuild] whose sources and dependencies are
//!   unchanged.
//!
//! # Examples
//!
//! ```
//! use stagehand::{Diagnostics, Snapshot, Stage};
//!
//! let mut snapshot = Snapshot::new();
//! snapshot.insert_file("lib/config.st", "export name = \"lib\";");
//! snapshot.insert_file("lib/a/a.st", "let { b } = import(\"../b\");\nexport a = b;");
//! snapshot.insert_file("lib/b/b.st", "export b = 42;");
//!
//! let mut diagnostics = Diagnostics::new();
//!
//! let output = stagehand::prepare(&snapshot)
//!     .with_diagnostics(&mut diagnostics)
//!     .build()?;
//!
//! assert!(diagnostics.is_empty());
//! assert_eq!(output.libraries().get_by_name(&"lib".parse()?).map(|c| c.root.to_string()).as_deref(), Some("lib/"));
//!
//! // Nothing changed, so everything is reused the second time around.
//! let output = stagehand::prepare(&snapshot)
//!     .with_prior(output.into_prior())
//!     .build()?;
//!
//! assert_eq!(output.partition().reused_modules.len(), 3);
//! assert!(output.modules().all(|m| m.stage_completed() == Some(Stage::GenerateCode)));
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

mod build;
pub mod diagnostics;
pub mod frontend;
mod hash;
mod library;
mod location;
mod module;
mod options;
mod partition;
mod path;
mod resolve;
mod scheduler;
mod segment;
mod snapshot;
mod source;
mod stage;
mod value;

#[cfg(test)]
mod tests;

pub use self::build::{prepare, Build, BuildError, BuildOutput};
#[cfg(feature = "emit")]
pub use self::diagnostics::EmitError;
pub use self::diagnostics::{Anchor, Diagnostic, DiagnosticKind, Diagnostics, Level};
pub use self::hash::ContentHash;
pub use self::library::{
    LibraryConfiguration, LibraryConfigurations, LibraryName, LibraryNameError,
    STANDARD_LIBRARY_NAME,
};
pub use self::location::{ModuleLocation, ModuleName};
pub use self::module::{
    Advanced, ImportRecord, ImportRequest, Module, ModuleHook, ModuleId, Modules, NoopModuleHook,
    Resolution, StageContext, StageDriver, DEFAULT_STEP_QUOTA,
};
pub use self::options::{ConfigurationError, Options, ParseOptionError};
pub use self::partition::{PriorBuild, RebuildPartition};
pub use self::path::{FilePath, SEPARATOR};
pub use self::resolve::{
    ExportedModule, Exporter, ImportNone, ImportResolver, ModuleCollector, StandardLibrary,
    LOCAL_FILE_SPECIFIER_PREFIX,
};
pub use self::scheduler::Advancer;
pub use self::segment::{segment, Segments, PREFACE_MARKER};
pub use self::snapshot::{Entry, Snapshot, SnapshotError};
pub use self::source::ModuleSource;
pub use self::stage::{ParseStageError, Stage};
pub use self::value::{Exports, Value};

/// Exported for compatibility with the rendering of diagnostics.
#[cfg(feature = "emit")]
pub use codespan_reporting::term::termcolor;
