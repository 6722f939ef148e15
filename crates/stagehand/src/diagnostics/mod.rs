//! Diagnostics collected while scanning and staging modules.

#[cfg(feature = "emit")]
mod emit;
#[cfg(feature = "emit")]
pub use self::emit::EmitError;

use core::fmt;
use core::ops::Range;

use serde::Serialize;

use crate::library::LibraryName;
use crate::location::ModuleLocation;
use crate::path::FilePath;

/// The severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    /// No consistent set of modules can be formed.
    Fatal,
    /// A problem which was recovered from, the affected code is replaced by
    /// an error value.
    Error,
    /// Something suspicious.
    Warning,
    /// Supplementary information, such as the other participants of an
    /// import cycle.
    Info,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Fatal => f.write_str("fatal"),
            Level::Error => f.write_str("error"),
            Level::Warning => f.write_str("warning"),
            Level::Info => f.write_str("info"),
        }
    }
}

/// A place in a source file that a diagnostic refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Anchor {
    /// The file.
    pub file: FilePath,
    /// Byte range in the file.
    pub span: Range<usize>,
}

impl Anchor {
    /// Construct a new anchor.
    pub fn new(file: FilePath, span: Range<usize>) -> Self {
        Self { file, span }
    }

    /// An anchor covering the start of a file.
    pub fn file(file: FilePath) -> Self {
        Self { file, span: 0..0 }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.span.start)
    }
}

/// The kind of a [`Diagnostic`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
#[non_exhaustive]
pub enum DiagnosticKind {
    #[error("Failed to read `{path}`")]
    ReadFailed { path: FilePath },
    #[error("Failed to import `{specifier}`")]
    ImportFailed { specifier: String },
    #[error("Breaking import cycle at `{importer}`, cycle is {}", join(.cycle, " -> "))]
    BreakingImportCycle {
        importer: ModuleLocation,
        cycle: Vec<ModuleLocation>,
    },
    #[error("`{module}` is part of an import cycle")]
    InImportCycle { module: ModuleLocation },
    #[error("Library name `{name}` is used by more than one library: {}", join(.roots, ", "))]
    DuplicateLibraryName {
        name: LibraryName,
        roots: Vec<FilePath>,
    },
    #[error("{message}")]
    Parse { message: String },
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn join<T>(items: &[T], separator: &str) -> String
where
    T: fmt::Display,
{
    let mut out = String::new();

    for (n, item) in items.iter().enumerate() {
        if n > 0 {
            out.push_str(separator);
        }

        out.push('`');
        out.push_str(&item.to_string());
        out.push('`');
    }

    out
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    level: Level,
    location: Option<ModuleLocation>,
    anchor: Option<Anchor>,
    #[serde(flatten)]
    kind: DiagnosticKind,
}

impl Diagnostic {
    /// The severity of the diagnostic.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The module the diagnostic was raised for, if any.
    pub fn location(&self) -> Option<&ModuleLocation> {
        self.location.as_ref()
    }

    /// The source location the diagnostic refers to, if any.
    pub fn anchor(&self) -> Option<&Anchor> {
        self.anchor.as_ref()
    }

    /// The kind of the diagnostic.
    pub fn kind(&self) -> &DiagnosticKind {
        &self.kind
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.kind)?;

        if let Some(anchor) = &self.anchor {
            write!(f, " at {anchor}")?;
        }

        Ok(())
    }
}

/// The diagnostics mode to use.
#[derive(Debug, Clone, Copy)]
enum DiagnosticsMode {
    /// Collect all forms of diagnostics.
    All,
    /// Skip informational diagnostics.
    WithoutInfo,
}

/// Structure to collect diagnostics raised during a build.
///
/// # Examples
///
/// ```
/// use stagehand::{Diagnostics, Snapshot};
///
/// let mut snapshot = Snapshot::new();
/// snapshot.insert_file("a/b.st", "let { x } = import(\"./missing\");");
///
/// let mut diagnostics = Diagnostics::new();
/// let _ = stagehand::prepare(&snapshot)
///     .with_diagnostics(&mut diagnostics)
///     .build();
///
/// assert!(diagnostics.has_error());
/// assert!(!diagnostics.has_fatal());
/// ```
#[derive(Debug, Clone)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
    mode: DiagnosticsMode,
    /// Index of the first fatal diagnostic.
    first_fatal: Option<usize>,
    /// Index of the first error.
    first_error: Option<usize>,
}

impl Diagnostics {
    fn with_mode(mode: DiagnosticsMode) -> Self {
        Self {
            diagnostics: Vec::new(),
            mode,
            first_fatal: None,
            first_error: None,
        }
    }

    /// Construct a new, empty collection of diagnostics.
    pub fn new() -> Self {
        Self::with_mode(DiagnosticsMode::All)
    }

    /// Construct a collection which ignores informational diagnostics.
    pub fn without_info() -> Self {
        Self::with_mode(DiagnosticsMode::WithoutInfo)
    }

    /// Test if there are no diagnostics.
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Test if any fatal diagnostics have been raised.
    pub fn has_fatal(&self) -> bool {
        self.first_fatal.is_some()
    }

    /// Test if any errors or fatal diagnostics have been raised.
    pub fn has_error(&self) -> bool {
        self.first_error.is_some() || self.first_fatal.is_some()
    }

    /// The first fatal diagnostic, if any.
    pub fn first_fatal(&self) -> Option<&Diagnostic> {
        self.diagnostics.get(self.first_fatal?)
    }

    /// Access diagnostics in the order they were raised.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Convert into a list of diagnostics.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Report a fatal diagnostic.
    pub fn fatal(&mut self, anchor: Option<Anchor>, kind: DiagnosticKind) {
        self.push(Level::Fatal, None, anchor, kind);
    }

    /// Report an error for the given module.
    pub fn error(
        &mut self,
        location: Option<&ModuleLocation>,
        anchor: Option<Anchor>,
        kind: DiagnosticKind,
    ) {
        self.push(Level::Error, location.cloned(), anchor, kind);
    }

    /// Report a warning for the given module.
    pub fn warning(
        &mut self,
        location: Option<&ModuleLocation>,
        anchor: Option<Anchor>,
        kind: DiagnosticKind,
    ) {
        self.push(Level::Warning, location.cloned(), anchor, kind);
    }

    /// Report an informational diagnostic for the given module.
    pub fn info(
        &mut self,
        location: Option<&ModuleLocation>,
        anchor: Option<Anchor>,
        kind: DiagnosticKind,
    ) {
        if matches!(self.mode, DiagnosticsMode::WithoutInfo) {
            return;
        }

        self.push(Level::Info, location.cloned(), anchor, kind);
    }

    fn push(
        &mut self,
        level: Level,
        location: Option<ModuleLocation>,
        anchor: Option<Anchor>,
        kind: DiagnosticKind,
    ) {
        let index = self.diagnostics.len();

        match level {
            Level::Fatal => {
                self.first_fatal.get_or_insert(index);
            }
            Level::Error => {
                self.first_error.get_or_insert(index);
            }
            Level::Warning | Level::Info => {}
        }

        tracing::trace!(%level, %kind, "diagnostic");

        self.diagnostics.push(Diagnostic {
            level,
            location,
            anchor,
            kind,
        });
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
