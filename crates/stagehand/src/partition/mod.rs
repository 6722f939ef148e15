//! Scanning a snapshot into module plans, and combining the plans with a
//! prior build into the modules of the next build.

mod rebuild;

pub use self::rebuild::RebuildPartition;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::diagnostics::{Anchor, DiagnosticKind, Diagnostics};
use crate::frontend::Frontend;
use crate::hash::ContentHash;
use crate::library::{LibraryConfiguration, LibraryName};
use crate::location::{ModuleLocation, ModuleName};
use crate::module::Module;
use crate::options::Options;
use crate::path::FilePath;
use crate::resolve::{Collector, ExportedModule, ImportResolver, NonLocal, StandardLibrary};
use crate::segment::segment;
use crate::snapshot::{Entry, Snapshot};
use crate::source::ModuleSource;

use self::rebuild::{Class, PriorModule};

/// The sources a module at a location is built from.
pub(crate) struct ModulePlan {
    pub(crate) location: ModuleLocation,
    pub(crate) sources: Vec<ModuleSource>,
    pub(crate) is_config: bool,
}

/// The result of scanning a snapshot.
pub(crate) struct Scan {
    /// Plans in location order.
    pub(crate) plans: Vec<ModulePlan>,
    /// Library roots with the tentative name of each library.
    pub(crate) roots: BTreeMap<FilePath, LibraryName>,
}

/// The modules and libraries of a build before staging.
pub(crate) struct Populated {
    pub(crate) modules: Vec<Module>,
    pub(crate) libraries: Vec<LibraryConfiguration>,
    pub(crate) externals: Vec<Arc<ExportedModule>>,
    pub(crate) partition: RebuildPartition,
}

/// The state of a previous build which the next build may reuse.
///
/// Produced by [`BuildOutput::into_prior`][crate::BuildOutput::into_prior].
#[derive(Debug, Default)]
pub struct PriorBuild {
    pub(crate) modules: Vec<Module>,
    pub(crate) externals: Vec<Arc<ExportedModule>>,
    pub(crate) libraries: Vec<LibraryConfiguration>,
}

impl PriorBuild {
    /// An empty prior build, where every module is new.
    pub fn new() -> Self {
        Self::default()
    }

    /// Modules of the prior build.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Library configurations of the prior build.
    pub fn libraries(&self) -> &[LibraryConfiguration] {
        &self.libraries
    }
}

/// Walk `snapshot` depth-first and plan the modules it contains.
///
/// Problems reading files are reported as fatal diagnostics.
#[tracing::instrument(skip_all)]
pub(crate) fn scan(
    snapshot: &Snapshot,
    options: &Options,
    frontend: &dyn Frontend,
    diagnostics: &mut Diagnostics,
) -> Scan {
    let mut scanner = Scanner {
        snapshot,
        options,
        frontend,
        diagnostics,
        plans: BTreeMap::new(),
        roots: BTreeMap::new(),
    };

    scanner.walk(&FilePath::root(), 0);

    Scan {
        plans: scanner.plans.into_values().collect(),
        roots: scanner.roots,
    }
}

struct Scanner<'a> {
    snapshot: &'a Snapshot,
    options: &'a Options,
    frontend: &'a dyn Frontend,
    diagnostics: &'a mut Diagnostics,
    plans: BTreeMap<ModuleLocation, ModulePlan>,
    roots: BTreeMap<FilePath, LibraryName>,
}

struct ReadFile {
    content: Arc<str>,
    hash: ContentHash,
}

impl Scanner<'_> {
    fn walk(&mut self, dir: &FilePath, mut root_count: usize) {
        let snapshot = self.snapshot;

        let Some(Entry::Dir { children }) = snapshot.get(dir) else {
            return;
        };

        let config = dir.join(&self.options.configuration_file, false);

        if children.contains(&config) {
            root_count = dir.len();

            let file = self.read(&config);

            let name = file
                .as_ref()
                .and_then(|file| self.frontend.guess_library_name(&file.content))
                .or_else(|| dir.last().and_then(LibraryName::guess))
                .unwrap_or_else(LibraryName::fallback);

            tracing::debug!(root = %dir, %name, "found library");
            self.roots.insert(dir.clone(), name);

            if let Some(file) = file {
                let name = ModuleName::new(config.clone(), root_count, false);
                let (preface, body) = split(&config, &file);

                if let Some(preface) = preface {
                    self.plan(name.with_preface(true), vec![preface], false);
                }

                self.plan(name, vec![body], true);
            }
        }

        let mut prefaces = Vec::new();
        let mut bodies = Vec::new();

        for child in children {
            if child.is_dir() || *child == config {
                continue;
            }

            if !child.last().map_or(false, |name| self.options.is_source_file(name)) {
                continue;
            }

            let Some(file) = self.read(child) else {
                continue;
            };

            let (preface, body) = split(child, &file);
            prefaces.extend(preface);
            bodies.push(body);
        }

        if !bodies.is_empty() {
            let name = ModuleName::new(dir.clone(), root_count, false);

            if !prefaces.is_empty() {
                self.plan(name.with_preface(true), prefaces, false);
            }

            self.plan(name, bodies, false);
        }

        for child in children {
            if child.is_dir() {
                self.walk(child, root_count);
            }
        }
    }

    fn read(&mut self, path: &FilePath) -> Option<ReadFile> {
        if let Some(Entry::File { content, hash }) = self.snapshot.get(path) {
            if let Ok(content) = std::str::from_utf8(content) {
                return Some(ReadFile {
                    content: content.into(),
                    hash: *hash,
                });
            }
        }

        self.diagnostics.fatal(
            Some(Anchor::file(path.clone())),
            DiagnosticKind::ReadFailed { path: path.clone() },
        );

        None
    }

    fn plan(&mut self, name: ModuleName, sources: Vec<ModuleSource>, is_config: bool) {
        let location = ModuleLocation::from(name);

        self.plans.insert(
            location.clone(),
            ModulePlan {
                location,
                sources,
                is_config,
            },
        );
    }
}

/// Split a file into its preface and body fragments.
fn split(path: &FilePath, file: &ReadFile) -> (Option<ModuleSource>, ModuleSource) {
    let segments = segment(&file.content);

    let fragment = |range| ModuleSource::new(path.clone(), file.hash, file.content.clone(), range);

    (segments.preface.map(fragment), fragment(segments.body))
}

/// Combine scanned plans with a prior build.
///
/// Reused modules are moved out of `prior`, every other plan gets a fresh
/// module with a driver from `frontend`.
#[tracing::instrument(skip_all)]
pub(crate) fn populate(
    scan: Scan,
    prior: PriorBuild,
    options: &Options,
    frontend: &dyn Frontend,
    standard: Option<&StandardLibrary>,
    resolver: &dyn ImportResolver,
) -> Populated {
    let PriorBuild {
        modules: prior_modules,
        externals: prior_externals,
        libraries: prior_libraries,
    } = prior;

    let mut partition = RebuildPartition::default();
    let mut libraries = Vec::new();

    // Externally provided libraries are reused as long as their identity
    // doesn't change.
    let mut external_roots = Vec::new();

    for name in &options.external_libraries {
        let Some(previous) = prior_libraries.iter().find(|c| c.name == *name) else {
            continue;
        };

        let current = NonLocal {
            standard,
            external: resolver,
        }
        .lookup_library(name, &mut Collector::default());

        if current.map_or(false, |current| current.same_identity(previous)) {
            tracing::debug!(root = %previous.root, %name, "reusing external library");
            partition.reused_libraries.insert(previous.root.clone());
            external_roots.push(previous.root.clone());
            libraries.push(previous.clone());
        } else {
            tracing::debug!(root = %previous.root, %name, "external library changed");
            partition.dropped_libraries.insert(previous.root.clone());
        }
    }

    let within_external = |location: &ModuleLocation| {
        location.as_name().map_or(false, |name| {
            external_roots
                .iter()
                .any(|root| name.source_file().is_within(root))
        })
    };

    let externals = prior_externals
        .into_iter()
        .filter(|module| within_external(module.location()))
        .collect::<Vec<_>>();

    let plan_hashes = scan
        .plans
        .iter()
        .map(|plan| {
            let hashes = plan.sources.iter().map(ModuleSource::hash).collect();
            (plan.location.clone(), hashes)
        })
        .collect::<BTreeMap<_, Vec<_>>>();

    let external_locations = externals
        .iter()
        .map(|module| module.location().clone())
        .collect::<BTreeSet<_>>();

    let (classes, dropped) = {
        let prior = prior_modules
            .iter()
            .map(|module| {
                let info = PriorModule {
                    hashes: module.source_hashes().collect(),
                    import_records: module.import_records(),
                    is_config: module.is_config(),
                };

                (module.location().clone(), info)
            })
            .collect::<BTreeMap<_, _>>();

        let classes = rebuild::classify_modules(&plan_hashes, &prior, &external_locations);

        let dropped = prior
            .iter()
            .filter(|(location, _)| !plan_hashes.contains_key(location))
            .map(|(location, info)| (location.clone(), info.is_config))
            .collect::<BTreeMap<_, _>>();

        (classes, dropped)
    };

    let prior_roots = prior_libraries
        .iter()
        .filter(|c| !options.is_external(&c.name))
        .map(|c| c.root.clone())
        .collect::<BTreeSet<_>>();

    let current_roots = scan.roots.keys().cloned().collect::<BTreeSet<_>>();

    let (root_classes, gone) =
        rebuild::classify_libraries(&current_roots, &prior_roots, &classes, &dropped);

    for root in gone {
        tracing::debug!(%root, "library dropped");
        partition.dropped_libraries.insert(root);
    }

    for location in dropped.into_keys() {
        partition.dropped_modules.insert(location);
    }

    for (location, class) in &classes {
        partition.insert_module(location.clone(), *class);
    }

    // Reused configuration modules won't be staged again, so their library
    // keeps the configuration derived before.
    for (root, name) in scan.roots {
        let config_reused = scan.plans.iter().any(|plan| {
            plan.is_config
                && plan.location.as_name().map_or(false, |n| n.library_root() == root)
                && classes.get(&plan.location) == Some(&Class::Reused)
        });

        let previous = prior_libraries.iter().find(|c| c.root == root);

        let configuration = match previous {
            Some(previous) if config_reused => previous.clone(),
            _ => LibraryConfiguration::tentative(name, root.clone()),
        };

        if let Some(class) = root_classes.get(&root) {
            partition.insert_library(root, *class);
        }

        libraries.push(configuration);
    }

    let mut reusable = prior_modules
        .into_iter()
        .map(|module| (module.location().clone(), module))
        .collect::<BTreeMap<_, _>>();

    let mut modules = Vec::with_capacity(scan.plans.len());

    for plan in scan.plans {
        let reused = match classes.get(&plan.location) {
            Some(Class::Reused) => reusable.remove(&plan.location),
            _ => None,
        };

        let mut module = match reused {
            Some(module) => {
                tracing::trace!(module = %plan.location, "reusing module");
                module
            }
            None => {
                let driver = frontend.create_driver(&plan.location, &plan.sources);
                Module::new(plan.location, plan.sources, driver).with_config(plan.is_config)
            }
        };

        module.set_may_run(options.may_run);
        module.set_step_quota(options.step_quota);
        modules.push(module);
    }

    Populated {
        modules,
        libraries,
        externals,
        partition,
    }
}
