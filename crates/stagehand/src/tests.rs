//! Test cases for stagehand.

pub(crate) mod prelude {
    pub(crate) use crate::frontend::{Frontend, Simple};
    pub(crate) use crate::tests::{
        build, build_prior, diagnostic_kinds, exported, location, names, records, roots, snapshot,
        stages, Log, Script, Scripted,
    };
    pub(crate) use crate::{
        prepare, Advancer, BuildError, BuildOutput, DiagnosticKind, Diagnostics, ExportedModule,
        Exporter, Exports, FilePath, ImportRecord, ImportResolver, LibraryConfiguration,
        LibraryName, Level, Module, ModuleCollector, ModuleLocation, ModuleName, ModuleSource,
        Options, PriorBuild, Snapshot, Stage, StandardLibrary, Value,
    };
    pub(crate) use std::sync::Arc;
}

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::diagnostics::{Anchor, DiagnosticKind, Diagnostics, Level};
use crate::frontend::Frontend;
use crate::module::{Advanced, ImportRequest, Resolution, StageContext, StageDriver};
use crate::{
    prepare, BuildOutput, Exports, FilePath, ImportRecord, ModuleLocation, ModuleName,
    ModuleSource, PriorBuild, Snapshot, Stage, Value,
};

/// Parse a location in the form it is displayed, like `lib//src/` or
/// `lib//src/:preface`.
pub(crate) fn location(text: &str) -> ModuleLocation {
    let (text, is_preface) = match text.strip_suffix(":preface") {
        Some(text) => (text, true),
        None => (text, false),
    };

    let Some((root, rest)) = text.split_once("//") else {
        panic!("`{text}` is not a module location");
    };

    let root_count = FilePath::dir(root).len();
    let full = format!("{root}/{rest}");

    let path = if rest.is_empty() || rest.ends_with('/') {
        FilePath::dir(&full)
    } else {
        FilePath::file(&full)
    };

    ModuleLocation::from(ModuleName::new(path, root_count, is_preface))
}

/// Construct a snapshot out of `(path, content)` pairs.
pub(crate) fn snapshot(files: &[(&str, &str)]) -> Snapshot {
    let mut snapshot = Snapshot::new();

    for (path, content) in files {
        snapshot.insert_file(path, *content);
    }

    snapshot
}

/// Build with default settings, panicking if the build halts.
pub(crate) fn build(snapshot: &Snapshot) -> (BuildOutput, Diagnostics) {
    build_prior(snapshot, PriorBuild::new())
}

/// Build on top of a prior build, panicking if the build halts.
pub(crate) fn build_prior(snapshot: &Snapshot, prior: PriorBuild) -> (BuildOutput, Diagnostics) {
    let mut diagnostics = Diagnostics::new();

    let result = prepare(snapshot)
        .with_prior(prior)
        .with_diagnostics(&mut diagnostics)
        .build();

    match result {
        Ok(output) => (output, diagnostics),
        Err(error) => panic!("{error}: {:#?}", diagnostics.diagnostics()),
    }
}

/// The level and kind of every diagnostic, in the order they were raised.
pub(crate) fn diagnostic_kinds(diagnostics: &Diagnostics) -> Vec<(Level, DiagnosticKind)> {
    diagnostics
        .diagnostics()
        .iter()
        .map(|d| (d.level(), d.kind().clone()))
        .collect()
}

/// The stage each module completed, by displayed location.
pub(crate) fn stages(output: &BuildOutput) -> Vec<(String, Option<Stage>)> {
    output
        .modules()
        .map(|m| (m.location().to_string(), m.stage_completed()))
        .collect()
}

/// Import records of the module at `at`.
pub(crate) fn records(output: &BuildOutput, at: &str) -> Vec<ImportRecord> {
    match output.module(&location(at)) {
        Some(module) => module.import_records().to_vec(),
        None => panic!("no module at `{at}`"),
    }
}

/// A single exported value of the module at `at`.
pub(crate) fn exported(output: &BuildOutput, at: &str, name: &str) -> Option<Value> {
    let module = output.module(&location(at))?;
    module.exports()?.get(name).cloned()
}

pub(crate) fn names(locations: &BTreeSet<ModuleLocation>) -> Vec<String> {
    locations.iter().map(ToString::to_string).collect()
}

pub(crate) fn roots(roots: &BTreeSet<FilePath>) -> Vec<String> {
    roots.iter().map(ToString::to_string).collect()
}

/// Shared record of what scripted drivers were asked to do.
#[derive(Debug, Clone, Default)]
pub(crate) struct Log {
    events: Arc<Mutex<Vec<String>>>,
}

impl Log {
    fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub(crate) fn events(&self) -> Vec<String> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(..) => panic!("log poisoned"),
        }
    }

    /// Index of the first event equal to `event`.
    pub(crate) fn position(&self, event: &str) -> usize {
        match self.events().iter().position(|e| e == event) {
            Some(n) => n,
            None => panic!("no event `{event}` in {:#?}", self.events()),
        }
    }
}

/// What a scripted module does.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    /// Specifiers revealed when completing [`Stage::Import`], with whether
    /// the import is blocking.
    pub(crate) imports: Vec<(&'static str, bool)>,
    /// Values exported once [`Stage::Export`] is completed.
    pub(crate) exports: Vec<(&'static str, Value)>,
    /// The driver refuses to advance after completing this stage.
    pub(crate) halt_after: Option<Stage>,
}

impl Script {
    pub(crate) fn import(mut self, specifier: &'static str) -> Self {
        self.imports.push((specifier, true));
        self
    }

    pub(crate) fn import_later(mut self, specifier: &'static str) -> Self {
        self.imports.push((specifier, false));
        self
    }

    pub(crate) fn export(mut self, name: &'static str, value: Value) -> Self {
        self.exports.push((name, value));
        self
    }

    pub(crate) fn halt_after(self, stage: Stage) -> Self {
        Self {
            halt_after: Some(stage),
            ..self
        }
    }
}

/// A frontend whose modules follow a [`Script`] keyed by displayed location,
/// recording every stage and resolution in a [`Log`].
///
/// Modules without a script import and export nothing.
#[derive(Debug, Default)]
pub(crate) struct Scripted {
    scripts: BTreeMap<String, Script>,
    log: Log,
}

impl Scripted {
    pub(crate) fn new(log: &Log) -> Self {
        Self {
            scripts: BTreeMap::new(),
            log: log.clone(),
        }
    }

    pub(crate) fn script(mut self, at: &str, script: Script) -> Self {
        self.scripts.insert(at.to_owned(), script);
        self
    }
}

impl Frontend for Scripted {
    fn create_driver(&self, location: &ModuleLocation, _: &[ModuleSource]) -> Box<dyn StageDriver> {
        let name = location.to_string();
        let script = self.scripts.get(&name).cloned().unwrap_or_default();

        Box::new(ScriptedDriver {
            name,
            script,
            completed: None,
            log: self.log.clone(),
        })
    }
}

struct ScriptedDriver {
    name: String,
    script: Script,
    completed: Option<Stage>,
    log: Log,
}

impl StageDriver for ScriptedDriver {
    fn advance(&mut self, cx: StageContext<'_>) -> Advanced {
        self.log.push(format!("{} {}", self.name, cx.stage));
        self.completed = Some(cx.stage);

        if cx.stage != Stage::Import {
            return Advanced::new(cx.stage);
        }

        let file = match cx.location.as_name() {
            Some(name) => name.source_file().clone(),
            None => FilePath::root(),
        };

        let imports = self
            .script
            .imports
            .iter()
            .enumerate()
            .map(|(n, (specifier, blocking))| ImportRequest {
                specifier: (*specifier).to_owned(),
                anchor: Anchor::new(file.clone(), n..n + 1),
                blocking: *blocking,
            })
            .collect();

        Advanced::new(cx.stage).with_imports(imports)
    }

    fn can_advance(&self) -> bool {
        self.script.halt_after.is_none() || self.completed != self.script.halt_after
    }

    fn resolve_import(&mut self, anchor: &Anchor, resolution: Resolution<'_>) {
        let specifier = self.script.imports[anchor.span.start].0;

        let outcome = match resolution {
            Resolution::Bound { exporter, .. } => format!("bound to {exporter}"),
            Resolution::Dropped => String::from("dropped"),
            Resolution::Failed { .. } => String::from("failed"),
        };

        self.log
            .push(format!("{} import {specifier} {outcome}", self.name));
    }

    fn exports(&self) -> Exports {
        self.script
            .exports
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }
}

macro_rules! prelude {
    () => {
        #[allow(unused_imports)]
        use crate::tests::prelude::*;
    };
}

mod cycles;
mod libraries;
mod limits;
mod ordering;
mod prefaces;
