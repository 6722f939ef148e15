use crate::diagnostics::{Anchor, DiagnosticKind};
use crate::library::LibraryName;
use crate::location::ModuleLocation;
use crate::module::{Advanced, ImportRequest, Resolution, StageContext, StageDriver};
use crate::path::FilePath;
use crate::source::ModuleSource;
use crate::stage::Stage;
use crate::value::{Exports, Value};

use super::parse::{self, Expr, Name, Statement, SyntaxError, Token};
use super::Frontend;

/// A frontend for a small declarative language, which is enough to write
/// library configurations and modules which import and export values.
///
/// Only [`Stage::Lex`], [`Stage::Parse`], [`Stage::Import`],
/// [`Stage::Define`] and [`Stage::Export`] do any work, the remaining stages
/// complete immediately.
///
/// # Examples
///
/// ```
/// use stagehand::frontend::{Frontend, Simple};
///
/// let name = Simple::new().guess_library_name("export name = \"my-lib\";");
/// assert_eq!(name.as_ref().map(|n| n.as_str()), Some("my-lib"));
/// ```
#[derive(Debug, Default, Clone, Copy)]
#[non_exhaustive]
pub struct Simple;

impl Simple {
    /// Construct the frontend.
    pub fn new() -> Self {
        Self
    }
}

impl Frontend for Simple {
    fn create_driver(&self, _: &ModuleLocation, _: &[ModuleSource]) -> Box<dyn StageDriver> {
        Box::<SimpleDriver>::default()
    }

    fn guess_library_name(&self, config_source: &str) -> Option<LibraryName> {
        let (tokens, _) = parse::lex(config_source, 0);
        let (statements, _) = parse::parse(&tokens);

        statements.into_iter().find_map(|statement| match statement {
            Statement::Let {
                name,
                value: Expr::String(value),
                export: true,
            } if &*name.text == "name" => LibraryName::new(&value).ok(),
            _ => None,
        })
    }
}

struct File {
    path: FilePath,
    tokens: Vec<Token>,
    statements: Vec<Statement>,
}

/// A blocking import and the values bound to its names.
struct ImportSite {
    anchor: Anchor,
    names: Vec<Name>,
    values: Option<Vec<Value>>,
}

#[derive(Default)]
struct SimpleDriver {
    files: Vec<File>,
    imports: Vec<ImportSite>,
    /// Problems found while resolving imports, reported during definition.
    deferred: Vec<(Anchor, String)>,
    defined: Exports,
    exports: Exports,
}

impl SimpleDriver {
    fn lex(&mut self, cx: &mut StageContext<'_>) {
        for source in cx.sources {
            let (tokens, errors) = parse::lex(source.as_str(), source.offset());
            report(cx, source.path(), errors);

            self.files.push(File {
                path: source.path().clone(),
                tokens,
                statements: Vec::new(),
            });
        }
    }

    fn parse(&mut self, cx: &mut StageContext<'_>) {
        for file in &mut self.files {
            let (statements, errors) = parse::parse(&file.tokens);
            report(cx, &file.path, errors);
            file.statements = statements;
            file.tokens = Vec::new();
        }
    }

    fn reveal_imports(&mut self) -> Vec<ImportRequest> {
        let mut requests = Vec::new();

        for file in &self.files {
            for statement in &file.statements {
                let Statement::Import {
                    names,
                    specifier,
                    span,
                } = statement
                else {
                    continue;
                };

                let anchor = Anchor::new(file.path.clone(), span.clone());

                if let Some(names) = names {
                    self.imports.push(ImportSite {
                        anchor: anchor.clone(),
                        names: names.clone(),
                        values: None,
                    });
                }

                requests.push(ImportRequest {
                    specifier: specifier.to_string(),
                    anchor,
                    blocking: names.is_some(),
                });
            }
        }

        requests
    }

    fn define(&mut self, cx: &mut StageContext<'_>) {
        let mut env = cx.outer.cloned().unwrap_or_default();
        let mut errors = Vec::new();

        for file in &self.files {
            for statement in &file.statements {
                match statement {
                    Statement::Import {
                        names: Some(names),
                        span,
                        ..
                    } => {
                        let anchor = Anchor::new(file.path.clone(), span.clone());

                        let values = self
                            .imports
                            .iter()
                            .find(|site| site.anchor == anchor)
                            .and_then(|site| site.values.as_deref());

                        for (n, name) in names.iter().enumerate() {
                            let value = match values.and_then(|values| values.get(n)) {
                                Some(value) => value.clone(),
                                None => Value::Error(format!("`{}` was never imported", name.text)),
                            };

                            env.insert(&*name.text, value);
                        }
                    }
                    Statement::Import { names: None, .. } => {}
                    Statement::Let {
                        name,
                        value,
                        export,
                    } => {
                        let value = eval(value, &env, &file.path, &mut errors);

                        if *export {
                            self.defined.insert(&*name.text, value.clone());
                        }

                        env.insert(&*name.text, value);
                    }
                }
            }
        }

        for (anchor, message) in self.deferred.drain(..).chain(errors) {
            cx.diagnostics.error(
                Some(cx.location),
                Some(anchor),
                DiagnosticKind::Parse { message },
            );
        }
    }

    fn export(&mut self, cx: &StageContext<'_>) {
        let mut exports = cx.outer.cloned().unwrap_or_default();

        for (name, value) in self.defined.iter() {
            exports.insert(name, value.clone());
        }

        self.exports = exports;
    }
}

impl StageDriver for SimpleDriver {
    fn advance(&mut self, mut cx: StageContext<'_>) -> Advanced {
        let stage = cx.stage;
        let mut imports = Vec::new();

        match stage {
            Stage::Lex => self.lex(&mut cx),
            Stage::Parse => self.parse(&mut cx),
            Stage::Import => imports = self.reveal_imports(),
            Stage::Define => self.define(&mut cx),
            Stage::Export => self.export(&cx),
            _ => {}
        }

        Advanced::new(stage).with_imports(imports)
    }

    fn resolve_import(&mut self, anchor: &Anchor, resolution: Resolution<'_>) {
        let Some(site) = self.imports.iter_mut().find(|site| site.anchor == *anchor) else {
            return;
        };

        let values = match resolution {
            Resolution::Bound { exporter, exports } => {
                let mut values = Vec::with_capacity(site.names.len());

                for name in &site.names {
                    match exports.get(&name.text) {
                        Some(value) => values.push(value.clone()),
                        None => {
                            let message = format!("`{exporter}` does not export `{}`", name.text);
                            let anchor = Anchor::new(site.anchor.file.clone(), name.span.clone());
                            self.deferred.push((anchor, message.clone()));
                            values.push(Value::Error(message));
                        }
                    }
                }

                values
            }
            Resolution::Dropped => return,
            Resolution::Failed { message } => site
                .names
                .iter()
                .map(|_| Value::Error(message.to_owned()))
                .collect(),
        };

        site.values = Some(values);
    }

    fn exports(&self) -> Exports {
        self.exports.clone()
    }
}

fn report(cx: &mut StageContext<'_>, path: &FilePath, errors: Vec<SyntaxError>) {
    for error in errors {
        cx.diagnostics.error(
            Some(cx.location),
            Some(Anchor::new(path.clone(), error.span.clone())),
            DiagnosticKind::Parse {
                message: error.to_string(),
            },
        );
    }
}

fn eval(expr: &Expr, env: &Exports, path: &FilePath, errors: &mut Vec<(Anchor, String)>) -> Value {
    match expr {
        Expr::String(string) => Value::String(string.to_string()),
        Expr::Integer(n) => Value::Integer(*n),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::List(items) => Value::List(
            items
                .iter()
                .map(|item| eval(item, env, path, errors))
                .collect(),
        ),
        Expr::Name(name) => match env.get(&name.text) {
            Some(value) => value.clone(),
            None => {
                let message = format!("`{}` is not defined", name.text);
                errors.push((Anchor::new(path.clone(), name.span.clone()), message.clone()));
                Value::Error(message)
            }
        },
    }
}
