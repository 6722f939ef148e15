use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// A compilation stage.
///
/// Stages are totally ordered and a module only ever moves from one stage to
/// the one directly following it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Split source text into tokens.
    Lex,
    /// Build a syntax tree.
    Parse,
    /// Reveal the imports of the module.
    Import,
    /// Resolve syntactic ambiguities.
    DisAmbiguate,
    /// Expand syntax macros.
    SyntaxMacro,
    /// Define declared names.
    Define,
    /// Infer types.
    Type,
    /// Expand function macros.
    FunctionMacro,
    /// Exports are complete, importers may bind to them.
    Export,
    /// Answer queries against the finished module.
    Query,
    /// Produce backend output.
    GenerateCode,
    /// Execute the module.
    Run,
}

impl Stage {
    /// All stages in order.
    pub const ALL: [Stage; 12] = [
        Stage::Lex,
        Stage::Parse,
        Stage::Import,
        Stage::DisAmbiguate,
        Stage::SyntaxMacro,
        Stage::Define,
        Stage::Type,
        Stage::FunctionMacro,
        Stage::Export,
        Stage::Query,
        Stage::GenerateCode,
        Stage::Run,
    ];

    /// The first stage.
    pub const FIRST: Stage = Stage::Lex;

    /// The last stage.
    pub const LAST: Stage = Stage::Run;

    /// The stage which follows `stage`, where `None` means that nothing has
    /// been completed yet.
    ///
    /// # Examples
    ///
    /// ```
    /// use stagehand::Stage;
    ///
    /// assert_eq!(Stage::after(None), Some(Stage::Lex));
    /// assert_eq!(Stage::after(Some(Stage::FunctionMacro)), Some(Stage::Export));
    /// assert_eq!(Stage::after(Some(Stage::Run)), None);
    /// ```
    pub fn after(stage: Option<Stage>) -> Option<Stage> {
        match stage {
            None => Some(Self::FIRST),
            Some(stage) => Self::ALL.get(stage.index() + 1).copied(),
        }
    }

    /// Test if a module which completed this stage can be imported from.
    pub fn is_export_ready(self) -> bool {
        self >= Stage::Export
    }

    fn index(self) -> usize {
        self as usize
    }

    /// The kebab-case name of the stage.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Lex => "lex",
            Stage::Parse => "parse",
            Stage::Import => "import",
            Stage::DisAmbiguate => "dis-ambiguate",
            Stage::SyntaxMacro => "syntax-macro",
            Stage::Define => "define",
            Stage::Type => "type",
            Stage::FunctionMacro => "function-macro",
            Stage::Export => "export",
            Stage::Query => "query",
            Stage::GenerateCode => "generate-code",
            Stage::Run => "run",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error raised when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown stage `{name}`")]
pub struct ParseStageError {
    name: Box<str>,
}

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStageError { name: s.into() })
    }
}
