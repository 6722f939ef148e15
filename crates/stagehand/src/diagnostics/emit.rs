//! Emitting diagnostics to a terminal.

use core::fmt::{self, Display};
use std::collections::BTreeMap;
use std::io;

use codespan_reporting::diagnostic as d;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::WriteColor;

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Level};
use crate::path::FilePath;
use crate::snapshot::Snapshot;

/// Errors that can be raised when formatting diagnostics.
#[derive(Debug)]
#[non_exhaustive]
pub enum EmitError {
    /// Source Error.
    Io(io::Error),
    /// Codespan reporting error.
    CodespanReporting(codespan_reporting::files::Error),
}

impl fmt::Display for EmitError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EmitError::Io(error) => error.fmt(f),
            EmitError::CodespanReporting(error) => error.fmt(f),
        }
    }
}

impl From<io::Error> for EmitError {
    fn from(error: io::Error) -> Self {
        EmitError::Io(error)
    }
}

impl From<codespan_reporting::files::Error> for EmitError {
    fn from(error: codespan_reporting::files::Error) -> Self {
        EmitError::CodespanReporting(error)
    }
}

impl std::error::Error for EmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EmitError::Io(error) => Some(error),
            EmitError::CodespanReporting(error) => Some(error),
        }
    }
}

/// Files referenced by diagnostics, loaded lazily from a snapshot.
struct Files<'a> {
    snapshot: &'a Snapshot,
    files: SimpleFiles<String, String>,
    ids: BTreeMap<FilePath, Option<usize>>,
}

impl<'a> Files<'a> {
    fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            snapshot,
            files: SimpleFiles::new(),
            ids: BTreeMap::new(),
        }
    }

    fn id(&mut self, path: &FilePath) -> Option<usize> {
        if let Some(id) = self.ids.get(path) {
            return *id;
        }

        let id = self.snapshot.content(path).map(|content| {
            let source = String::from_utf8_lossy(content).into_owned();
            self.files.add(path.to_string(), source)
        });

        self.ids.insert(path.clone(), id);
        id
    }
}

impl Diagnostics {
    /// Generate formatted diagnostics capable of referencing source lines.
    ///
    /// Source text is looked up in `snapshot`, so it should be the snapshot
    /// which was built.
    pub fn emit<O>(&self, out: &mut O, snapshot: &Snapshot) -> Result<(), EmitError>
    where
        O: WriteColor,
    {
        if self.is_empty() {
            return Ok(());
        }

        let config = term::Config::default();
        let mut files = Files::new(snapshot);

        for diagnostic in self.diagnostics() {
            diagnostic_emit(diagnostic, out, &mut files, &config)?;
        }

        Ok(())
    }
}

fn diagnostic_emit<O>(
    this: &Diagnostic,
    out: &mut O,
    files: &mut Files<'_>,
    config: &term::Config,
) -> Result<(), EmitError>
where
    O: WriteColor,
{
    let mut labels = Vec::new();
    let mut notes = Vec::new();

    if let Some(anchor) = this.anchor() {
        if let Some(id) = files.id(&anchor.file) {
            labels.push(d::Label::primary(id, anchor.span.clone()).with_message(label(this.kind())));
        } else {
            notes.push(format!("at {anchor}"));
        }
    }

    if let Some(location) = this.location() {
        notes.push(format!("in module `{location}`"));
    }

    if let DiagnosticKind::BreakingImportCycle { cycle, .. } = this.kind() {
        for (n, module) in cycle.iter().enumerate() {
            notes.push(format!("#{n}: `{module}`"));
        }
    }

    let diagnostic = match this.level() {
        Level::Fatal | Level::Error => d::Diagnostic::error(),
        Level::Warning => d::Diagnostic::warning(),
        Level::Info => d::Diagnostic::note(),
    };

    let diagnostic = diagnostic
        .with_message(this.kind().to_string())
        .with_labels(labels)
        .with_notes(notes);

    term::emit(out, config, &files.files, &diagnostic)?;
    Ok(())
}

fn label(kind: &DiagnosticKind) -> &'static str {
    match kind {
        DiagnosticKind::ReadFailed { .. } => "unreadable",
        DiagnosticKind::ImportFailed { .. } => "no module exports this",
        DiagnosticKind::BreakingImportCycle { .. } => "import severed here",
        DiagnosticKind::InImportCycle { .. } => "import in cycle",
        DiagnosticKind::DuplicateLibraryName { .. } => "duplicate name",
        DiagnosticKind::Parse { .. } => "here",
        DiagnosticKind::Internal { .. } => "here",
    }
}
