//! Finding import cycles among pending imports.

use std::collections::{BTreeMap, BTreeSet};

use crate::module::ModuleId;

use super::{PendingId, PendingImport};

/// Find a cycle in the graph of pending imports, treating every pending
/// import as an edge from its importer to its exporter.
///
/// Importers are searched in id order and their imports in the order they
/// were revealed, so the same graph always produces the same cycle. The
/// returned cycle starts at the first importer whose search returns to
/// itself.
pub(super) fn find_cycle(
    by_importer: &BTreeMap<ModuleId, Vec<PendingId>>,
    pending: &[PendingImport],
) -> Option<Vec<PendingId>> {
    for (&start, imports) in by_importer {
        let mut search = Search {
            by_importer,
            pending,
            start,
            path: Vec::new(),
            visited: BTreeSet::from([start]),
        };

        for &id in imports {
            if search.visit(id) {
                return Some(search.path);
            }
        }
    }

    None
}

struct Search<'a> {
    by_importer: &'a BTreeMap<ModuleId, Vec<PendingId>>,
    pending: &'a [PendingImport],
    start: ModuleId,
    path: Vec<PendingId>,
    visited: BTreeSet<ModuleId>,
}

impl Search<'_> {
    fn visit(&mut self, id: PendingId) -> bool {
        self.path.push(id);

        let exporter = self.pending[id.0].exporter;

        if exporter == self.start {
            return true;
        }

        if self.visited.insert(exporter) {
            if let Some(imports) = self.by_importer.get(&exporter) {
                for &next in imports {
                    if self.visit(next) {
                        return true;
                    }
                }
            }
        }

        self.path.pop();
        false
    }
}
