//! The scheduler which advances a group of modules stage by stage.

mod cycle;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::diagnostics::{Anchor, DiagnosticKind, Diagnostics};
use crate::library::{LibraryConfiguration, LibraryConfigurations, LibraryName};
use crate::location::ModuleLocation;
use crate::module::{
    ImportRecord, ImportRequest, Module, ModuleHook, ModuleId, Modules, NoopModuleHook,
    Resolution,
};
use crate::path::FilePath;
use crate::resolve::{
    self, Collector, ExportedModule, Exporter, ImportNone, ImportResolver, ModuleCollector,
    NonLocal, StandardLibrary,
};
use crate::stage::Stage;

/// Advances modules until each of them is export ready or can't make
/// progress.
///
/// Most users go through [`prepare`][crate::prepare] which scans a snapshot
/// into modules first. The advancer can also be used directly with modules
/// constructed by hand.
///
/// # Examples
///
/// ```
/// use stagehand::frontend::{Frontend, Simple};
/// use stagehand::{Advancer, Diagnostics, FilePath, Module, ModuleLocation, ModuleName, ModuleSource, Stage};
///
/// let frontend = Simple::new();
/// let mut advancer = Advancer::new();
///
/// for (dir, source) in [("a", "let { b } = import(\"../b\"); export a = b;"), ("b", "export b = 1;")] {
///     let location = ModuleLocation::from(ModuleName::new(FilePath::dir(dir), 0, false));
///     let sources = vec![ModuleSource::whole(FilePath::file(&format!("{dir}/{dir}.st")), source)];
///     let driver = frontend.create_driver(&location, &sources);
///     advancer.add_module(Module::new(location, sources, driver));
/// }
///
/// let mut diagnostics = Diagnostics::new();
/// advancer.advance_modules(&mut diagnostics);
///
/// assert!(diagnostics.is_empty());
/// assert!(advancer.modules().iter().all(|(_, m)| m.stage_completed() == Some(Stage::GenerateCode)));
/// ```
pub struct Advancer<'a> {
    modules: Modules,
    collector: Collector,
    required: BTreeSet<LibraryName>,
    resolver: &'a dyn ImportResolver,
    standard: Option<&'a StandardLibrary>,
    hook: &'a dyn ModuleHook,
    stop_before: Box<dyn Fn(&Module) -> Option<Stage> + 'a>,
}

impl<'a> Advancer<'a> {
    /// Construct an advancer without any modules, which resolves no
    /// non-local imports.
    pub fn new() -> Self {
        Self {
            modules: Modules::new(),
            collector: Collector::default(),
            required: BTreeSet::new(),
            resolver: &ImportNone,
            standard: None,
            hook: &NoopModuleHook,
            stop_before: Box::new(|_| None),
        }
    }

    /// Use the given resolver for non-local imports.
    pub fn with_resolver(self, resolver: &'a dyn ImportResolver) -> Self {
        Self { resolver, ..self }
    }

    /// Serve imports of the standard library from `standard`.
    pub fn with_standard_library(self, standard: Option<&'a StandardLibrary>) -> Self {
        Self { standard, ..self }
    }

    /// Call `hook` before every advancement step.
    pub fn with_hook(self, hook: &'a dyn ModuleHook) -> Self {
        Self { hook, ..self }
    }

    /// Consult `stop_before` before every advancement step. A module is
    /// left alone once the stage it would advance to is the one returned.
    pub fn with_stop_before<F>(self, stop_before: F) -> Self
    where
        F: Fn(&Module) -> Option<Stage> + 'a,
    {
        Self {
            stop_before: Box::new(stop_before),
            ..self
        }
    }

    /// Add a module to the group, resetting its step count.
    ///
    /// # Panics
    ///
    /// Panics if a module at the same location has already been added.
    pub fn add_module(&mut self, mut module: Module) -> ModuleId {
        module.begin_build();
        self.modules.insert(module)
    }

    /// Require that the library `name` is configured before staging starts,
    /// whether or not any module imports from it.
    pub fn require_library(&mut self, name: LibraryName) {
        self.required.insert(name);
    }

    /// The modules in the group.
    pub fn modules(&self) -> &Modules {
        &self.modules
    }

    /// Access a single module.
    pub fn module(&self, id: ModuleId) -> &Module {
        self.modules.get(id)
    }

    /// Library configurations registered so far.
    pub fn libraries(&self) -> &LibraryConfigurations {
        &self.collector.libraries
    }

    /// Externally built modules registered so far.
    pub fn externals(&self) -> impl Iterator<Item = &Arc<ExportedModule>> + '_ {
        self.collector.externals.values()
    }

    pub(crate) fn into_parts(self) -> (Modules, Collector) {
        (self.modules, self.collector)
    }

    /// Advance every module as far as it can go.
    #[tracing::instrument(skip_all)]
    pub fn advance_modules(&mut self, diagnostics: &mut Diagnostics) {
        let resolver = NonLocal {
            standard: self.standard,
            external: self.resolver,
        };

        for name in &self.required {
            match resolver.lookup_library(name, &mut self.collector) {
                Some(configuration) => {
                    self.collector.configure_library(configuration);
                }
                None => {
                    tracing::debug!(%name, "required library is not available");
                }
            }
        }

        let mut group = Group::new(
            &mut self.modules,
            &mut self.collector,
            &resolver,
            self.hook,
            &*self.stop_before,
            diagnostics,
        );

        group.advance();

        for (name, roots) in self.collector.libraries.duplicate_names() {
            diagnostics.fatal(None, DiagnosticKind::DuplicateLibraryName { name, roots });
        }
    }

    /// Modules ordered so that every module comes after the modules it
    /// successfully imported from.
    ///
    /// Ties are broken by location. Modules in unbroken cycles can't be
    /// ordered, they are appended at the end in location order.
    pub fn modules_in_dependency_order(&self) -> Vec<&Module> {
        let order = self.modules.ids().collect::<Vec<_>>();

        let position = order
            .iter()
            .enumerate()
            .map(|(n, id)| (*id, n))
            .collect::<BTreeMap<_, _>>();

        let mut remaining = vec![0usize; order.len()];
        let mut dependents = vec![Vec::new(); order.len()];

        for (n, &id) in order.iter().enumerate() {
            let mut exporters = BTreeSet::new();

            for record in self.modules.get(id).import_records() {
                let ImportRecord::Ok { exporter, .. } = record else {
                    continue;
                };

                let Some(exporter) = self.modules.lookup(exporter) else {
                    continue;
                };

                if exporter != id && exporters.insert(exporter) {
                    dependents[position[&exporter]].push(n);
                    remaining[n] += 1;
                }
            }
        }

        let mut ready = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(n, _)| n)
            .collect::<BTreeSet<_>>();

        let mut emitted = vec![false; order.len()];
        let mut out = Vec::with_capacity(order.len());

        while let Some(n) = ready.pop_first() {
            emitted[n] = true;
            out.push(self.modules.get(order[n]));

            for &dependent in &dependents[n] {
                remaining[dependent] -= 1;

                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        for (n, &id) in order.iter().enumerate() {
            if !emitted[n] {
                out.push(self.modules.get(id));
            }
        }

        out
    }

    /// Modules grouped by library root, together with the configuration of
    /// each library.
    ///
    /// Libraries without a registered configuration get a tentative one
    /// which is registered as a side effect.
    pub fn partitioned_modules(
        &mut self,
    ) -> BTreeMap<FilePath, (LibraryConfiguration, Vec<ModuleId>)> {
        let mut by_root = BTreeMap::<_, Vec<_>>::new();

        for (id, module) in self.modules.iter() {
            if let Some(name) = module.location().as_name() {
                by_root.entry(name.library_root()).or_default().push(id);
            }
        }

        let mut out = BTreeMap::new();

        for (root, ids) in by_root {
            let configuration = match self.collector.libraries.get_root(&root) {
                Some(configuration) => configuration.clone(),
                None => {
                    let name = root
                        .last()
                        .and_then(LibraryName::guess)
                        .unwrap_or_else(LibraryName::fallback);

                    let configuration = LibraryConfiguration::tentative(name, root.clone());
                    self.collector.configure_library(configuration.clone());
                    configuration
                }
            };

            out.insert(root, (configuration, ids));
        }

        out
    }
}

impl Default for Advancer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleCollector for Advancer<'_> {
    fn configure_library(&mut self, configuration: LibraryConfiguration) -> bool {
        self.collector.configure_library(configuration)
    }

    fn reconfigure_library(&mut self, configuration: LibraryConfiguration) {
        self.collector.reconfigure_library(configuration)
    }

    fn add_external(&mut self, module: Arc<ExportedModule>) {
        self.collector.add_external(module)
    }
}

/// Handle to a [`PendingImport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingId(usize);

/// A blocking import waiting for its exporter to become export ready.
#[derive(Debug)]
struct PendingImport {
    importer: ModuleId,
    exporter: ModuleId,
    anchor: Anchor,
    specifier: String,
}

/// State of a single call to [`Advancer::advance_modules`].
struct Group<'g> {
    modules: &'g mut Modules,
    collector: &'g mut Collector,
    resolver: &'g dyn ImportResolver,
    hook: &'g dyn ModuleHook,
    stop_before: &'g dyn Fn(&Module) -> Option<Stage>,
    diagnostics: &'g mut Diagnostics,
    /// Modules by local specifier.
    local: BTreeMap<String, ModuleId>,
    pending: Vec<PendingImport>,
    /// Unsatisfied imports by importer. Lists are never empty.
    pending_by_importer: BTreeMap<ModuleId, Vec<PendingId>>,
    /// Unsatisfied imports by exporter.
    awaiting_export: BTreeMap<ModuleId, Vec<PendingId>>,
    /// Body modules waiting on their preface, by preface.
    awaiting_preface: BTreeMap<ModuleId, Vec<ModuleId>>,
    /// Outstanding dependencies of each module, by index.
    count_needed: Vec<usize>,
    ready: VecDeque<ModuleId>,
    queued: Vec<bool>,
}

impl<'g> Group<'g> {
    fn new(
        modules: &'g mut Modules,
        collector: &'g mut Collector,
        resolver: &'g dyn ImportResolver,
        hook: &'g dyn ModuleHook,
        stop_before: &'g dyn Fn(&Module) -> Option<Stage>,
        diagnostics: &'g mut Diagnostics,
    ) -> Self {
        let mut local = BTreeMap::new();
        let mut awaiting_preface = BTreeMap::<_, Vec<_>>::new();
        let mut count_needed = vec![0; modules.len()];
        let mut outers = Vec::new();

        for (id, module) in modules.iter() {
            let Some(name) = module.location().as_name() else {
                continue;
            };

            if name.is_preface() {
                continue;
            }

            local.insert(resolve::local_specifier(name), id);

            let preface = ModuleLocation::from(name.with_preface(true));

            let Some(preface) = modules.lookup(&preface) else {
                continue;
            };

            if modules.get(preface).is_export_ready() {
                outers.push((id, modules.get(preface).location().clone()));
            } else if !module.is_export_ready() {
                awaiting_preface.entry(preface).or_default().push(id);
                count_needed[id.index()] += 1;
            }
        }

        for (id, outer) in outers {
            modules.get_mut(id).set_outer(outer);
        }

        let queued = vec![false; modules.len()];

        Self {
            modules,
            collector,
            resolver,
            hook,
            stop_before,
            diagnostics,
            local,
            pending: Vec::new(),
            pending_by_importer: BTreeMap::new(),
            awaiting_export: BTreeMap::new(),
            awaiting_preface,
            count_needed,
            ready: VecDeque::new(),
            queued,
        }
    }

    fn advance(&mut self) {
        let (configs, others): (Vec<_>, Vec<_>) = self
            .modules
            .ids()
            .filter(|id| self.count_needed[id.index()] == 0)
            .partition(|&id| self.modules.get(id).is_config());

        // Configuration modules start ahead of their siblings.
        for id in configs.into_iter().chain(others) {
            self.enqueue(id, false);
        }

        loop {
            let Some(id) = self.ready.pop_front() else {
                if self.break_cycle() {
                    continue;
                }

                break;
            };

            self.queued[id.index()] = false;

            if !self.should_advance(id) {
                continue;
            }

            self.step(id);

            let module = self.modules.get(id);

            if module.can_advance() && self.count_needed[id.index()] == 0 {
                let front = module.is_config();
                self.enqueue(id, front);
            }
        }

        if !self.pending_by_importer.is_empty() {
            tracing::warn!(
                stalled = self.pending_by_importer.len(),
                "modules are waiting on imports which will never be export ready"
            );
        }
    }

    fn enqueue(&mut self, id: ModuleId, front: bool) {
        let queued = &mut self.queued[id.index()];

        if *queued {
            return;
        }

        *queued = true;

        if front {
            self.ready.push_front(id);
        } else {
            self.ready.push_back(id);
        }
    }

    fn should_advance(&self, id: ModuleId) -> bool {
        let module = self.modules.get(id);

        if !module.can_advance() || self.count_needed[id.index()] != 0 {
            return false;
        }

        match (self.stop_before)(module) {
            Some(stop) => Stage::after(module.stage_completed()) != Some(stop),
            None => true,
        }
    }

    /// Advance a single module by one stage.
    fn step(&mut self, id: ModuleId) {
        let outer = self
            .modules
            .get(id)
            .outer()
            .and_then(|outer| self.modules.lookup(outer))
            .and_then(|outer| self.modules.get(outer).exports().cloned());

        let module = self.modules.get_mut(id);
        let is_new = module.stage_completed().is_none();
        self.hook.customize(module, is_new);

        if !module.can_advance() {
            return;
        }

        let library = module
            .location()
            .as_name()
            .and_then(|name| self.collector.libraries.get(&name.library_root()));

        tracing::trace!(
            module = %module.location(),
            stage = ?module.next_stage(),
            "starting stage"
        );

        let imports = module.advance(outer.as_deref(), library, self.diagnostics);

        for request in imports {
            self.import(id, request);
        }

        if self.modules.get(id).stage_completed() == Some(Stage::Export) {
            self.release(id);
        }
    }

    /// Handle an import revealed by `importer`.
    fn import(&mut self, importer: ModuleId, request: ImportRequest) {
        let ImportRequest {
            specifier,
            anchor,
            blocking,
        } = request;

        match self.resolve(importer, &specifier) {
            None => {
                let module = self.modules.get_mut(importer);
                let kind = DiagnosticKind::ImportFailed {
                    specifier: specifier.clone(),
                };
                let message = kind.to_string();

                self.diagnostics
                    .error(Some(module.location()), Some(anchor.clone()), kind);

                module.resolve_import(&anchor, Resolution::Failed { message: &message });
                module.record_import(ImportRecord::Unresolvable {
                    specifier,
                    blocking,
                });
            }
            Some(Exporter::External(exported)) => {
                let module = self.modules.get_mut(importer);

                if blocking {
                    module.resolve_import(
                        &anchor,
                        Resolution::Bound {
                            exporter: exported.location(),
                            exports: exported.exports(),
                        },
                    );
                } else {
                    module.resolve_import(&anchor, Resolution::Dropped);
                }

                module.record_import(ImportRecord::Ok {
                    exporter: exported.location().clone(),
                    blocking,
                });
            }
            Some(Exporter::Local(exporter)) => {
                if !blocking {
                    let location = self.modules.get(exporter).location().clone();
                    let module = self.modules.get_mut(importer);
                    module.resolve_import(&anchor, Resolution::Dropped);
                    module.record_import(ImportRecord::Ok {
                        exporter: location,
                        blocking,
                    });
                    return;
                }

                let id = PendingId(self.pending.len());

                self.pending.push(PendingImport {
                    importer,
                    exporter,
                    anchor,
                    specifier,
                });

                if self.modules.get(exporter).is_export_ready() {
                    self.bind(id);
                    return;
                }

                self.count_needed[importer.index()] += 1;
                self.pending_by_importer.entry(importer).or_default().push(id);
                self.awaiting_export.entry(exporter).or_default().push(id);
            }
        }
    }

    /// Find the exporter for `specifier` as imported by `importer`.
    ///
    /// Tries local modules first, then the standard library and the external
    /// resolver, and finally the library of the importer under its own name.
    /// Each attempt also tries the specifier with a trailing separator so a
    /// directory module can be named without one.
    fn resolve(&mut self, importer: ModuleId, specifier: &str) -> Option<Exporter> {
        let mut variants = vec![specifier.to_owned()];

        if !specifier.ends_with('/') {
            variants.push(format!("{specifier}/"));
        }

        let name = self.modules.get(importer).location().as_name().cloned();
        let dir = name.as_ref().map_or_else(FilePath::root, |name| name.dir());

        for variant in &variants {
            if let Some(&id) = resolve::localize(variant, &dir).and_then(|s| self.local.get(&s)) {
                return Some(Exporter::Local(id));
            }
        }

        for variant in &variants {
            if resolve::localize(variant, &dir).is_some() {
                continue;
            }

            if let Some(exporter) = self.resolver.lookup(variant, &mut *self.collector) {
                return Some(exporter);
            }
        }

        let name = name?;
        let configuration = self.collector.libraries.get(&name.library_root())?;

        for variant in &variants {
            let local = resolve::to_local_specifier(variant, &name, configuration);

            if let Some(&id) = local.and_then(|s| self.local.get(&s)) {
                return Some(Exporter::Local(id));
            }
        }

        None
    }

    /// Bind a pending import to its export ready exporter.
    fn bind(&mut self, id: PendingId) {
        let pending = &self.pending[id.0];
        let exporter = self.modules.get(pending.exporter);
        let location = exporter.location().clone();
        let exports = exporter.exports().cloned().unwrap_or_default();

        let importer = self.modules.get_mut(pending.importer);

        tracing::trace!(
            importer = %importer.location(),
            exporter = %location,
            specifier = %pending.specifier,
            "import bound"
        );

        importer.resolve_import(
            &pending.anchor,
            Resolution::Bound {
                exporter: &location,
                exports: &exports,
            },
        );

        importer.record_import(ImportRecord::Ok {
            exporter: location,
            blocking: true,
        });
    }

    /// Release everything which was waiting for `exporter` to become export
    /// ready.
    fn release(&mut self, exporter: ModuleId) {
        if let Some(waiting) = self.awaiting_export.remove(&exporter) {
            for id in waiting {
                let importer = self.pending[id.0].importer;
                self.forget_pending(importer, id);
                self.bind(id);
                self.decrement(importer);
            }
        }

        if let Some(bodies) = self.awaiting_preface.remove(&exporter) {
            let location = self.modules.get(exporter).location().clone();

            for body in bodies {
                self.modules.get_mut(body).set_outer(location.clone());
                self.decrement(body);
            }
        }

        let module = self.modules.get(exporter);

        if !module.is_config() {
            return;
        }

        let (Some(name), Some(exports)) = (module.location().as_name(), module.exports()) else {
            return;
        };

        let root = name.library_root();
        let previous = self.collector.libraries.get_root(&root);
        let configuration = LibraryConfiguration::from_exports(root, exports, previous);
        self.collector.reconfigure_library(configuration);
    }

    fn forget_pending(&mut self, importer: ModuleId, id: PendingId) {
        if let Some(ids) = self.pending_by_importer.get_mut(&importer) {
            ids.retain(|p| *p != id);

            if ids.is_empty() {
                self.pending_by_importer.remove(&importer);
            }
        }
    }

    fn decrement(&mut self, id: ModuleId) {
        let count = &mut self.count_needed[id.index()];

        let Some(n) = count.checked_sub(1) else {
            panic!("outstanding dependency count of {id} underflowed");
        };

        *count = n;

        if n == 0 {
            self.enqueue(id, false);
        }
    }

    /// Break an import cycle among pending imports, returning `false` if
    /// there is none.
    ///
    /// The severed import belongs to the participant with the fewest pending
    /// imports, the first such participant in the cycle on ties. Its import
    /// site is replaced with an error, which lets the importer continue.
    fn break_cycle(&mut self) -> bool {
        let Some(cycle) = cycle::find_cycle(&self.pending_by_importer, &self.pending) else {
            return false;
        };

        let mut best = 0;
        let mut fewest = usize::MAX;

        for (n, id) in cycle.iter().enumerate() {
            let importer = self.pending[id.0].importer;
            let count = self.pending_by_importer.get(&importer).map_or(0, Vec::len);

            if count < fewest {
                best = n;
                fewest = count;
            }
        }

        let members = cycle
            .iter()
            .map(|id| self.modules.get(self.pending[id.0].importer).location().clone())
            .collect::<Vec<_>>();

        let broken = cycle[best];
        let PendingImport {
            importer, exporter, ..
        } = self.pending[broken.0];
        let anchor = self.pending[broken.0].anchor.clone();

        let kind = DiagnosticKind::BreakingImportCycle {
            importer: members[best].clone(),
            cycle: members.clone(),
        };

        let message = kind.to_string();

        tracing::debug!(importer = %members[best], "breaking import cycle");

        self.diagnostics
            .error(Some(&members[best]), Some(anchor.clone()), kind);

        for (n, id) in cycle.iter().enumerate() {
            if n == best {
                continue;
            }

            self.diagnostics.info(
                Some(&members[n]),
                Some(self.pending[id.0].anchor.clone()),
                DiagnosticKind::InImportCycle {
                    module: members[n].clone(),
                },
            );
        }

        self.forget_pending(importer, broken);

        if let Some(ids) = self.awaiting_export.get_mut(&exporter) {
            ids.retain(|p| *p != broken);

            if ids.is_empty() {
                self.awaiting_export.remove(&exporter);
            }
        }

        let exporter = self.modules.get(exporter).location().clone();
        let module = self.modules.get_mut(importer);
        module.resolve_import(&anchor, Resolution::Failed { message: &message });
        module.record_import(ImportRecord::Broken {
            exporter,
            blocking: true,
        });

        self.decrement(importer);
        true
    }
}
