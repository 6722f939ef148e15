use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::diagnostics::Diagnostics;
use crate::frontend::{Frontend, Simple};
use crate::library::{LibraryConfigurations, LibraryName};
use crate::location::ModuleLocation;
use crate::module::{Module, ModuleHook, Modules, NoopModuleHook};
use crate::options::Options;
use crate::partition::{self, PriorBuild, RebuildPartition};
use crate::resolve::{ExportedModule, ImportNone, ImportResolver, ModuleCollector, StandardLibrary};
use crate::scheduler::Advancer;
use crate::snapshot::Snapshot;
use crate::stage::Stage;

/// Error raised when a build is halted.
///
/// Look at the passed in [Diagnostics] instance for details.
#[derive(Debug, Error)]
#[error("build halted by fatal diagnostics (see diagnostics for details)")]
pub struct BuildError;

/// Prepare a build of every module in the given [Snapshot].
///
/// # Examples
///
/// ```
/// use stagehand::termcolor::{ColorChoice, StandardStream};
/// use stagehand::{Diagnostics, Snapshot, Stage};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut snapshot = Snapshot::new();
/// snapshot.insert_file("app/config.st", "export name = \"app\";");
/// snapshot.insert_file("app/main/main.st", r#"
/// let { greeting } = import("../greet");
/// let { newline } = import("std/text");
/// export message = [greeting, newline];
/// "#);
/// snapshot.insert_file("app/greet/greet.st", "export greeting = \"hello\";");
///
/// let mut diagnostics = Diagnostics::new();
///
/// let result = stagehand::prepare(&snapshot)
///     .with_diagnostics(&mut diagnostics)
///     .build();
///
/// if !diagnostics.is_empty() {
///     let mut writer = StandardStream::stderr(ColorChoice::Always);
///     diagnostics.emit(&mut writer, &snapshot)?;
/// }
///
/// let output = result?;
///
/// for module in output.modules() {
///     assert_eq!(module.stage_completed(), Some(Stage::GenerateCode));
/// }
///
/// assert_eq!(output.partition().new_modules.len(), 3);
/// # Ok(()) }
/// ```
pub fn prepare(snapshot: &Snapshot) -> Build<'_> {
    Build {
        snapshot,
        options: None,
        diagnostics: None,
        prior: None,
        resolver: None,
        standard: StandardChoice::Builtin,
        frontend: None,
        hook: None,
        stop_before: None,
        required: Vec::new(),
    }
}

enum StandardChoice {
    Builtin,
    Custom(StandardLibrary),
    Disabled,
}

/// High level helper for setting up a build of the modules in a snapshot.
pub struct Build<'a> {
    snapshot: &'a Snapshot,
    options: Option<Options>,
    diagnostics: Option<&'a mut Diagnostics>,
    prior: Option<PriorBuild>,
    resolver: Option<&'a dyn ImportResolver>,
    standard: StandardChoice,
    frontend: Option<Arc<dyn Frontend>>,
    hook: Option<&'a dyn ModuleHook>,
    #[allow(clippy::type_complexity)]
    stop_before: Option<Box<dyn Fn(&Module) -> Option<Stage> + 'a>>,
    required: Vec<LibraryName>,
}

impl<'a> Build<'a> {
    /// Modify the current [Build] to use the given [Options].
    #[inline]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = Some(options);
        self
    }

    /// Modify the current [Build] to use the given [Diagnostics] collection.
    #[inline]
    pub fn with_diagnostics(mut self, diagnostics: &'a mut Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Reuse what can be reused from a prior build.
    #[inline]
    pub fn with_prior(mut self, prior: PriorBuild) -> Self {
        self.prior = Some(prior);
        self
    }

    /// Resolve non-local imports which aren't for the standard library with
    /// the given [ImportResolver].
    #[inline]
    pub fn with_resolver(mut self, resolver: &'a dyn ImportResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use the given [StandardLibrary] instead of the builtin one. Share one
    /// handle between builds to stage the library only once.
    #[inline]
    pub fn with_standard_library(mut self, standard: StandardLibrary) -> Self {
        self.standard = StandardChoice::Custom(standard);
        self
    }

    /// Build without a standard library.
    #[inline]
    pub fn without_standard_library(mut self) -> Self {
        self.standard = StandardChoice::Disabled;
        self
    }

    /// Construct stage drivers with the given [Frontend]. Defaults to
    /// [Simple].
    #[inline]
    pub fn with_frontend(mut self, frontend: Arc<dyn Frontend>) -> Self {
        self.frontend = Some(frontend);
        self
    }

    /// Call the given [ModuleHook] before every advancement step.
    #[inline]
    pub fn with_hook(mut self, hook: &'a dyn ModuleHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Decide per module which stage it should stop short of. Takes
    /// precedence over [Options::stop_before].
    #[inline]
    pub fn with_stop_before<F>(mut self, stop_before: F) -> Self
    where
        F: Fn(&Module) -> Option<Stage> + 'a,
    {
        self.stop_before = Some(Box::new(stop_before));
        self
    }

    /// Require the library `name` to be configured even if no module imports
    /// from it.
    #[inline]
    pub fn with_required_library(mut self, name: LibraryName) -> Self {
        self.required.push(name);
        self
    }

    /// Scan, classify and stage every module.
    pub fn build(mut self) -> Result<BuildOutput, BuildError> {
        let mut default_diagnostics;

        let diagnostics = match self.diagnostics.take() {
            Some(diagnostics) => diagnostics,
            None => {
                default_diagnostics = Diagnostics::new();
                &mut default_diagnostics
            }
        };

        let options = self.options.take().unwrap_or_default();

        let frontend = match self.frontend.take() {
            Some(frontend) => frontend,
            None => Arc::new(Simple::new()),
        };

        let standard = match std::mem::replace(&mut self.standard, StandardChoice::Disabled) {
            StandardChoice::Builtin => Some(StandardLibrary::builtin()),
            StandardChoice::Custom(standard) => Some(standard),
            StandardChoice::Disabled => None,
        };

        let resolver = self.resolver.unwrap_or(&ImportNone);
        let hook = self.hook.unwrap_or(&NoopModuleHook);

        let scan = partition::scan(self.snapshot, &options, &*frontend, diagnostics);

        if diagnostics.has_fatal() {
            return Err(BuildError);
        }

        let populated = partition::populate(
            scan,
            self.prior.take().unwrap_or_default(),
            &options,
            &*frontend,
            standard.as_ref(),
            resolver,
        );

        let default_stop = options.stop_before;
        let stop_before = self.stop_before.take();

        let mut advancer = Advancer::new()
            .with_resolver(resolver)
            .with_standard_library(standard.as_ref())
            .with_hook(hook)
            .with_stop_before(move |module: &Module| match &stop_before {
                Some(stop_before) => stop_before(module),
                None => default_stop,
            });

        for configuration in populated.libraries {
            advancer.configure_library(configuration);
        }

        for module in populated.externals {
            advancer.add_external(module);
        }

        for module in populated.modules {
            advancer.add_module(module);
        }

        for name in self.required.drain(..) {
            advancer.require_library(name);
        }

        advancer.advance_modules(diagnostics);

        if diagnostics.has_fatal() {
            return Err(BuildError);
        }

        let (modules, collector) = advancer.into_parts();

        Ok(BuildOutput {
            modules,
            libraries: collector.libraries,
            externals: collector.externals,
            partition: populated.partition,
        })
    }
}

/// The result of a successful build.
#[derive(Debug)]
pub struct BuildOutput {
    modules: Modules,
    libraries: LibraryConfigurations,
    externals: BTreeMap<ModuleLocation, Arc<ExportedModule>>,
    partition: RebuildPartition,
}

impl BuildOutput {
    /// Modules of the build in location order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> + '_ {
        self.modules.iter().map(|(_, module)| module)
    }

    /// Look up a module by location.
    pub fn module(&self, location: &ModuleLocation) -> Option<&Module> {
        let id = self.modules.lookup(location)?;
        Some(self.modules.get(id))
    }

    /// Configurations of every library known to the build.
    pub fn libraries(&self) -> &LibraryConfigurations {
        &self.libraries
    }

    /// Externally built modules used by the build.
    pub fn externals(&self) -> impl Iterator<Item = &Arc<ExportedModule>> + '_ {
        self.externals.values()
    }

    /// How the build relates to the prior build.
    pub fn partition(&self) -> &RebuildPartition {
        &self.partition
    }

    /// Convert into the prior build of the next build.
    pub fn into_prior(self) -> PriorBuild {
        PriorBuild {
            modules: self.modules.into_vec(),
            externals: self.externals.into_values().collect(),
            libraries: self.libraries.into_iter().collect(),
        }
    }
}
