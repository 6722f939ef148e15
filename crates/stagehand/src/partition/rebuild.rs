//! Deciding which modules of a prior build can be reused.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::hash::ContentHash;
use crate::location::ModuleLocation;
use crate::module::ImportRecord;
use crate::path::FilePath;

/// How a module or library root is carried over from a prior build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Class {
    /// Nothing existed at the location before.
    New,
    /// Reused as is, it is not staged again.
    Reused,
    /// Rebuilt from scratch.
    Dirty,
}

/// What the classifier needs to know about a module from a prior build.
pub(crate) struct PriorModule<'a> {
    pub(crate) hashes: Vec<ContentHash>,
    pub(crate) import_records: &'a [ImportRecord],
    pub(crate) is_config: bool,
}

/// Classify every planned module.
///
/// `plans` maps each planned location to the fingerprints of its sources.
/// `externals` are modules provided from outside the tree which are known to
/// be reusable.
pub(crate) fn classify_modules(
    plans: &BTreeMap<ModuleLocation, Vec<ContentHash>>,
    prior: &BTreeMap<ModuleLocation, PriorModule<'_>>,
    externals: &BTreeSet<ModuleLocation>,
) -> BTreeMap<ModuleLocation, Class> {
    let mut classes = BTreeMap::new();

    for (location, hashes) in plans {
        let class = match prior.get(location) {
            None => Class::New,
            Some(prior) if prior.hashes != *hashes => Class::Dirty,
            Some(..) => Class::Reused,
        };

        classes.insert(location.clone(), class);
    }

    let any_new = classes.values().any(|class| *class == Class::New);

    if any_new {
        for (location, class) in &mut classes {
            if *class != Class::Reused {
                continue;
            }

            let unresolved = prior
                .get(location)
                .map_or(false, |prior| prior.import_records.iter().any(|r| !r.is_ok()));

            let new_preface = preface_of(location)
                .map_or(false, |preface| plans.contains_key(&preface) && !prior.contains_key(&preface));

            if unresolved || new_preface {
                tracing::trace!(%location, unresolved, new_preface, "dirty since new modules appeared");
                *class = Class::Dirty;
            }
        }
    }

    let mut dependencies = BTreeMap::new();

    for (location, class) in &classes {
        if *class != Class::Reused {
            continue;
        }

        let mut deps = prior
            .get(location)
            .map(|prior| {
                prior
                    .import_records
                    .iter()
                    .filter_map(ImportRecord::exporter)
                    .cloned()
                    .collect::<BTreeSet<_>>()
            })
            .unwrap_or_default();

        if let Some(preface) = preface_of(location).filter(|p| plans.contains_key(p)) {
            deps.insert(preface);
        }

        deps.remove(location);
        dependencies.insert(location.clone(), deps);
    }

    loop {
        let mut changed = false;

        for (location, deps) in &dependencies {
            if classes.get(location) != Some(&Class::Reused) {
                continue;
            }

            let stale = deps.iter().find(|&dep| match classes.get(dep) {
                Some(class) => *class != Class::Reused,
                None => !externals.contains(dep),
            });

            if let Some(stale) = stale {
                tracing::trace!(%location, dependency = %stale, "dirty since a dependency is stale");
                classes.insert(location.clone(), Class::Dirty);
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    classes
}

fn preface_of(location: &ModuleLocation) -> Option<ModuleLocation> {
    let name = location.as_name()?;

    if name.is_preface() {
        return None;
    }

    Some(ModuleLocation::from(name.with_preface(true)))
}

/// Classify library roots.
///
/// A root is new if it wasn't a root before, or if its configuration module
/// from before was dropped. A reused root is dirty if any module in it is
/// not reused, or if any of its modules were dropped.
pub(crate) fn classify_libraries(
    current: &BTreeSet<FilePath>,
    prior: &BTreeSet<FilePath>,
    classes: &BTreeMap<ModuleLocation, Class>,
    dropped: &BTreeMap<ModuleLocation, bool>,
) -> (BTreeMap<FilePath, Class>, BTreeSet<FilePath>) {
    let mut out = BTreeMap::new();

    for root in current {
        if !prior.contains(root) {
            out.insert(root.clone(), Class::New);
            continue;
        }

        let in_root = |location: &ModuleLocation| {
            location
                .as_name()
                .map_or(false, |name| name.library_root() == *root)
        };

        let config_dropped = dropped
            .iter()
            .any(|(location, is_config)| *is_config && in_root(location));

        if config_dropped {
            out.insert(root.clone(), Class::New);
            continue;
        }

        let changed = classes
            .iter()
            .any(|(location, class)| *class != Class::Reused && in_root(location))
            || dropped.keys().any(|location| in_root(location));

        let class = if changed { Class::Dirty } else { Class::Reused };
        out.insert(root.clone(), class);
    }

    let gone = prior.difference(current).cloned().collect();
    (out, gone)
}

/// How the modules and library roots of a build relate to the prior build.
///
/// Every set is ordered, so the partition serializes deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct RebuildPartition {
    /// Modules which didn't exist before.
    pub new_modules: BTreeSet<ModuleLocation>,
    /// Modules carried over without being staged again.
    pub reused_modules: BTreeSet<ModuleLocation>,
    /// Modules rebuilt since they or their dependencies changed.
    pub dirty_modules: BTreeSet<ModuleLocation>,
    /// Modules which no longer exist.
    pub dropped_modules: BTreeSet<ModuleLocation>,
    /// Library roots which didn't exist before.
    pub new_libraries: BTreeSet<FilePath>,
    /// Library roots where every module was reused.
    pub reused_libraries: BTreeSet<FilePath>,
    /// Library roots with at least one changed module.
    pub dirty_libraries: BTreeSet<FilePath>,
    /// Library roots which no longer exist.
    pub dropped_libraries: BTreeSet<FilePath>,
}

impl RebuildPartition {
    pub(crate) fn insert_module(&mut self, location: ModuleLocation, class: Class) {
        match class {
            Class::New => self.new_modules.insert(location),
            Class::Reused => self.reused_modules.insert(location),
            Class::Dirty => self.dirty_modules.insert(location),
        };
    }

    pub(crate) fn insert_library(&mut self, root: FilePath, class: Class) {
        match class {
            Class::New => self.new_libraries.insert(root),
            Class::Reused => self.reused_libraries.insert(root),
            Class::Dirty => self.dirty_libraries.insert(root),
        };
    }

    /// Test if nothing was reused from a prior build.
    pub fn is_fresh(&self) -> bool {
        self.reused_modules.is_empty() && self.dirty_modules.is_empty()
    }
}
