//! Modules tracked by the scheduler and the arena they live in.

mod driver;

pub use self::driver::{Advanced, ImportRequest, Resolution, StageContext, StageDriver};

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::diagnostics::{Anchor, Diagnostics};
use crate::hash::ContentHash;
use crate::library::LibraryConfiguration;
use crate::location::ModuleLocation;
use crate::source::ModuleSource;
use crate::stage::Stage;
use crate::value::Exports;

/// The default number of stages a module may advance through in one build.
pub const DEFAULT_STEP_QUOTA: usize = 1_000;

/// A handle to a module in [`Modules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ModuleId(usize);

impl ModuleId {
    #[cfg(test)]
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A record of an import made by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ImportRecord {
    /// The import was bound to an exporter.
    Ok {
        exporter: ModuleLocation,
        blocking: bool,
    },
    /// The import was severed to break an import cycle.
    Broken {
        exporter: ModuleLocation,
        blocking: bool,
    },
    /// No exporter could be found.
    Unresolvable { specifier: String, blocking: bool },
}

impl ImportRecord {
    /// The exporter the import was resolved to, if any.
    pub fn exporter(&self) -> Option<&ModuleLocation> {
        match self {
            ImportRecord::Ok { exporter, .. } | ImportRecord::Broken { exporter, .. } => {
                Some(exporter)
            }
            ImportRecord::Unresolvable { .. } => None,
        }
    }

    /// Test if the import was blocking.
    pub fn is_blocking(&self) -> bool {
        match self {
            ImportRecord::Ok { blocking, .. }
            | ImportRecord::Broken { blocking, .. }
            | ImportRecord::Unresolvable { blocking, .. } => *blocking,
        }
    }

    /// Test if the import was cleanly resolved.
    pub fn is_ok(&self) -> bool {
        matches!(self, ImportRecord::Ok { .. })
    }
}

/// A module which is advanced through stages.
pub struct Module {
    location: ModuleLocation,
    stage_completed: Option<Stage>,
    import_records: Vec<ImportRecord>,
    sources: Vec<ModuleSource>,
    outer: Option<ModuleLocation>,
    is_config: bool,
    may_run: bool,
    step_quota: usize,
    steps: usize,
    exports: Option<Arc<Exports>>,
    driver: Box<dyn StageDriver>,
}

impl Module {
    /// Construct a module which has not completed any stage.
    pub fn new(
        location: ModuleLocation,
        sources: Vec<ModuleSource>,
        driver: Box<dyn StageDriver>,
    ) -> Self {
        Self {
            location,
            stage_completed: None,
            import_records: Vec::new(),
            sources,
            outer: None,
            is_config: false,
            may_run: false,
            step_quota: DEFAULT_STEP_QUOTA,
            steps: 0,
            exports: None,
            driver,
        }
    }

    /// Mark the module as the configuration module of its library.
    pub fn with_config(self, is_config: bool) -> Self {
        Self { is_config, ..self }
    }

    /// The location of the module.
    pub fn location(&self) -> &ModuleLocation {
        &self.location
    }

    /// The most recently completed stage.
    pub fn stage_completed(&self) -> Option<Stage> {
        self.stage_completed
    }

    /// Imports recorded so far.
    pub fn import_records(&self) -> &[ImportRecord] {
        &self.import_records
    }

    /// The sources the module was built from.
    pub fn sources(&self) -> &[ModuleSource] {
        &self.sources
    }

    /// Fingerprints of the module sources, in order.
    pub fn source_hashes(&self) -> impl ExactSizeIterator<Item = ContentHash> + '_ {
        self.sources.iter().map(ModuleSource::hash)
    }

    /// The preface module which this module implicitly depends on, once that
    /// preface is export ready.
    pub fn outer(&self) -> Option<&ModuleLocation> {
        self.outer.as_ref()
    }

    /// Test if this is a library configuration module.
    pub fn is_config(&self) -> bool {
        self.is_config
    }

    /// Test if the module may advance to [`Stage::Run`].
    pub fn may_run(&self) -> bool {
        self.may_run
    }

    /// Permit or forbid advancing to [`Stage::Run`].
    pub fn set_may_run(&mut self, may_run: bool) {
        self.may_run = may_run;
    }

    /// Set the number of stages the module may advance through in a build.
    pub fn set_step_quota(&mut self, step_quota: usize) {
        self.step_quota = step_quota;
    }

    /// The exports of the module, available once it is export ready.
    pub fn exports(&self) -> Option<&Arc<Exports>> {
        self.exports.as_ref()
    }

    /// Test if the module has completed [`Stage::Export`].
    pub fn is_export_ready(&self) -> bool {
        self.stage_completed.map_or(false, Stage::is_export_ready)
    }

    /// The stage the module would advance to next.
    pub fn next_stage(&self) -> Option<Stage> {
        let next = Stage::after(self.stage_completed)?;

        if next == Stage::Run && !self.may_run {
            return None;
        }

        Some(next)
    }

    /// Test if the module may still advance.
    ///
    /// Once this returns `false` during a build it keeps returning `false`
    /// for the rest of it.
    pub fn can_advance(&self) -> bool {
        self.next_stage().is_some() && self.steps < self.step_quota && self.driver.can_advance()
    }

    /// Prepare the module for a new build, resetting its step count.
    pub(crate) fn begin_build(&mut self) {
        self.steps = 0;
    }

    /// Advance the module by exactly one stage, returning the imports the
    /// stage revealed.
    ///
    /// # Panics
    ///
    /// Panics if the module can't advance, or if the driver reports a stage
    /// other than the one it was asked to complete.
    pub(crate) fn advance(
        &mut self,
        outer: Option<&Exports>,
        library: Option<&LibraryConfiguration>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<ImportRequest> {
        let Some(stage) = self.next_stage() else {
            panic!("module {} can't advance past {:?}", self.location, self.stage_completed);
        };

        self.steps += 1;

        let advanced = self.driver.advance(StageContext {
            location: &self.location,
            stage,
            sources: &self.sources,
            outer,
            library,
            diagnostics,
        });

        assert_eq!(
            advanced.stage, stage,
            "driver for {} completed the wrong stage",
            self.location
        );

        self.stage_completed = Some(stage);

        if stage == Stage::Export {
            self.exports = Some(Arc::new(self.driver.exports()));
        }

        advanced.imports
    }

    pub(crate) fn resolve_import(&mut self, anchor: &Anchor, resolution: Resolution<'_>) {
        self.driver.resolve_import(anchor, resolution);
    }

    pub(crate) fn record_import(&mut self, record: ImportRecord) {
        self.import_records.push(record);
    }

    pub(crate) fn set_outer(&mut self, outer: ModuleLocation) {
        self.outer = Some(outer);
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("location", &self.location)
            .field("stage_completed", &self.stage_completed)
            .field("import_records", &self.import_records)
            .field("outer", &self.outer)
            .field("is_config", &self.is_config)
            .field("may_run", &self.may_run)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// Called before every advancement step.
pub trait ModuleHook {
    /// Customize `module` before it advances. `is_new` is set if the module
    /// hasn't completed any stage yet.
    fn customize(&self, module: &mut Module, is_new: bool);
}

/// A [`ModuleHook`] which does nothing.
#[derive(Debug, Default, Clone, Copy)]
#[non_exhaustive]
pub struct NoopModuleHook;

impl ModuleHook for NoopModuleHook {
    #[inline]
    fn customize(&self, _: &mut Module, _: bool) {}
}

impl<F> ModuleHook for F
where
    F: Fn(&mut Module, bool),
{
    #[inline]
    fn customize(&self, module: &mut Module, is_new: bool) {
        self(module, is_new)
    }
}

/// An arena of modules, indexed by [`ModuleId`] and by location.
#[derive(Debug, Default)]
pub struct Modules {
    modules: Vec<Module>,
    by_location: BTreeMap<ModuleLocation, ModuleId>,
}

impl Modules {
    /// Construct an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a module.
    ///
    /// # Panics
    ///
    /// Panics if a module is already present at the same location.
    pub fn insert(&mut self, module: Module) -> ModuleId {
        let id = ModuleId(self.modules.len());

        if self.by_location.insert(module.location.clone(), id).is_some() {
            panic!("two modules at {}", module.location);
        }

        self.modules.push(module);
        id
    }

    /// Look up a module by location.
    pub fn lookup(&self, location: &ModuleLocation) -> Option<ModuleId> {
        self.by_location.get(location).copied()
    }

    /// Access a module.
    pub fn get(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    /// Access a module mutably.
    pub fn get_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0]
    }

    /// Module ids in location order.
    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.by_location.values().copied()
    }

    /// Iterate over modules in location order.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> + '_ {
        self.by_location
            .values()
            .map(move |&id| (id, &self.modules[id.0]))
    }

    /// The number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Test if the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Convert into modules in location order.
    pub fn into_vec(self) -> Vec<Module> {
        let mut modules = self.modules;
        modules.sort_by(|a, b| a.location.cmp(&b.location));
        modules
    }
}
