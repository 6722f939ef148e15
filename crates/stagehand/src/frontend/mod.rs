//! Frontends construct the [`StageDriver`] which does the work of each stage
//! for a module.

mod parse;
mod simple;

pub use self::simple::Simple;

use crate::library::LibraryName;
use crate::location::ModuleLocation;
use crate::module::StageDriver;
use crate::source::ModuleSource;

/// Constructs stage drivers for new or changed modules.
pub trait Frontend: Send + Sync {
    /// Construct the driver for a module built from `sources`.
    fn create_driver(
        &self,
        location: &ModuleLocation,
        sources: &[ModuleSource],
    ) -> Box<dyn StageDriver>;

    /// Guess the name of a library from the text of its configuration file,
    /// without staging it. Used to pick a tentative name for the library
    /// until its configuration module is export ready.
    fn guess_library_name(&self, config_source: &str) -> Option<LibraryName> {
        let _ = config_source;
        None
    }
}
