//! The stagehand command line driver.
//!
//! Stages every module in a directory tree and reports how far each module
//! got, along with any diagnostics raised on the way.
//!
//! ```text
//! stagehand build path/to/tree --stop-before generate-code -O step-quota=50
//! ```
//!
//! If the directory contains a `stagehand.toml` file, build options are read
//! from it before any option passed on the command line is applied.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Error, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codespan_reporting::term::termcolor::{
    Color, ColorChoice, ColorSpec, StandardStream, WriteColor,
};
use serde::Serialize;
use stagehand::{
    BuildOutput, Diagnostic, Diagnostics, ImportRecord, LibraryConfiguration, ModuleLocation,
    Options, RebuildPartition, Snapshot, Stage,
};
use tracing_subscriber::filter::EnvFilter;

/// Name of the optional configuration file at the root of a tree.
const CONFIG_FILE: &str = "stagehand.toml";

// Our own ExitCode so the numbers are stable across platforms.
#[repr(i32)]
#[derive(Debug, Clone, Copy)]
enum ExitCode {
    Success = 0,
    Failure = 1,
}

#[derive(Default, Debug, Clone, Copy, ValueEnum)]
enum ColorArgument {
    #[default]
    /// Automatically enable coloring if the output is a terminal.
    Auto,
    /// Force ANSI coloring.
    Ansi,
    /// Always color using the platform-specific coloring implementation.
    Always,
    /// Never color output.
    Never,
}

#[derive(Parser, Debug)]
#[command(name = "stagehand", version, about = "Stage the modules of a source tree")]
struct Args {
    /// Control if output is colored or not.
    #[arg(long, value_enum, default_value_t)]
    color: ColorArgument,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage every module found in a directory.
    Build(BuildFlags),
}

#[derive(Parser, Debug)]
#[command(rename_all = "kebab-case")]
struct BuildFlags {
    /// The root of the tree to build.
    path: PathBuf,
    /// Read build options from this file instead of `stagehand.toml` in the
    /// root of the tree.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop every module one stage short of the given stage.
    #[arg(long)]
    stop_before: Option<Stage>,
    /// Let modules advance to the run stage.
    #[arg(long)]
    may_run: bool,
    /// Set a build option, like `-O step-quota=10`.
    #[arg(short = 'O', long = "option", num_args = 1)]
    options: Vec<String>,
    /// Write a JSON report to standard output instead of a summary.
    #[arg(long)]
    json: bool,
}

impl BuildFlags {
    /// Assemble build options from the configuration file and the command
    /// line, in that order.
    fn build_options(&self) -> Result<Options> {
        let config = match &self.config {
            Some(path) => Some(path.clone()),
            None => Some(self.path.join(CONFIG_FILE)).filter(|path| path.is_file()),
        };

        let mut options = match config {
            Some(path) => load_options(&path)?,
            None => Options::default(),
        };

        if let Some(stage) = self.stop_before {
            options.stop_before = Some(stage);
        }

        if self.may_run {
            options.may_run(true);
        }

        for option in &self.options {
            options.parse_option(option)?;
        }

        Ok(options)
    }
}

fn load_options(path: &Path) -> Result<Options> {
    let document = fs::read_to_string(path)
        .with_context(|| format!("Reading {}", path.display()))?;

    let options = Options::from_toml(&document)
        .with_context(|| format!("Loading options from {}", path.display()))?;

    tracing::debug!(path = %path.display(), "loaded options");
    Ok(options)
}

/// A machine readable report of a build.
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Report<'a> {
    ok: bool,
    modules: Vec<ModuleReport<'a>>,
    libraries: Vec<&'a LibraryConfiguration>,
    partition: Option<&'a RebuildPartition>,
    diagnostics: &'a [Diagnostic],
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ModuleReport<'a> {
    location: &'a ModuleLocation,
    stage_completed: Option<Stage>,
    is_config: bool,
    outer: Option<&'a ModuleLocation>,
    imports: &'a [ImportRecord],
}

impl<'a> Report<'a> {
    fn new(output: Option<&'a BuildOutput>, diagnostics: &'a Diagnostics) -> Self {
        let modules = output
            .into_iter()
            .flat_map(|output| output.modules())
            .map(|module| ModuleReport {
                location: module.location(),
                stage_completed: module.stage_completed(),
                is_config: module.is_config(),
                outer: module.outer(),
                imports: module.import_records(),
            })
            .collect();

        let libraries = output
            .into_iter()
            .flat_map(|output| output.libraries().iter())
            .collect();

        Self {
            ok: output.is_some() && !diagnostics.has_error(),
            modules,
            libraries,
            partition: output.map(BuildOutput::partition),
            diagnostics: diagnostics.diagnostics(),
        }
    }
}

fn main() {
    match try_main() {
        Ok(code) => std::process::exit(code as i32),
        Err(error) => {
            let o = io::stderr();
            // ignore error because stderr might've been closed.
            let _ = format_errors(o.lock(), &error);
            std::process::exit(ExitCode::Failure as i32);
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let args = Args::parse();

    let choice = match args.color {
        ColorArgument::Always => ColorChoice::Always,
        ColorArgument::Ansi => ColorChoice::AlwaysAnsi,
        ColorArgument::Auto => {
            if io::stdout().is_terminal() {
                ColorChoice::Auto
            } else {
                ColorChoice::Never
            }
        }
        ColorArgument::Never => ColorChoice::Never,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match &args.cmd {
        Command::Build(flags) => build(flags, choice),
    }
}

#[tracing::instrument(skip_all, fields(path = %flags.path.display()))]
fn build(flags: &BuildFlags, choice: ColorChoice) -> Result<ExitCode> {
    let options = flags.build_options()?;

    let snapshot = Snapshot::from_directory(&flags.path)
        .with_context(|| format!("Reading tree at {}", flags.path.display()))?;

    let mut diagnostics = Diagnostics::new();

    let result = stagehand::prepare(&snapshot)
        .with_options(options)
        .with_diagnostics(&mut diagnostics)
        .build();

    let output = match result {
        Ok(output) => Some(output),
        Err(error) => {
            tracing::debug!(%error, "build halted");
            None
        }
    };

    let mut stderr = StandardStream::stderr(choice);

    if !diagnostics.is_empty() {
        diagnostics.emit(&mut stderr, &snapshot)?;
    }

    if flags.json {
        let report = Report::new(output.as_ref(), &diagnostics);
        let o = io::stdout();
        let mut o = o.lock();
        serde_json::to_writer_pretty(&mut o, &report)?;
        writeln!(o)?;
    } else if let Some(output) = &output {
        let mut stdout = StandardStream::stdout(choice);
        summarize(&mut stdout, output)?;
    }

    if output.is_none() || diagnostics.has_error() {
        return Ok(ExitCode::Failure);
    }

    Ok(ExitCode::Success)
}

/// Print the stage of every module followed by how the build relates to the
/// prior build.
fn summarize<O>(o: &mut O, output: &BuildOutput) -> io::Result<()>
where
    O: WriteColor,
{
    let mut done = ColorSpec::new();
    done.set_fg(Some(Color::Green)).set_bold(true);

    let mut partial = ColorSpec::new();
    partial.set_fg(Some(Color::Yellow)).set_bold(true);

    for module in output.modules() {
        let stage = module.stage_completed();

        let spec = if stage.map_or(false, |stage| stage >= Stage::GenerateCode) {
            &done
        } else {
            &partial
        };

        o.set_color(spec)?;
        write!(o, "{:>14}", stage.map_or("-", Stage::name))?;
        o.reset()?;
        writeln!(o, " {}", module.location())?;
    }

    let partition = output.partition();

    writeln!(
        o,
        "{} modules: {} new, {} reused, {} dirty, {} dropped",
        output.modules().count(),
        partition.new_modules.len(),
        partition.reused_modules.len(),
        partition.dirty_modules.len(),
        partition.dropped_modules.len(),
    )?;

    for c in output.libraries().iter() {
        match &c.version {
            Some(version) => writeln!(o, "library {} {} at {}", c.name, version, c.root)?,
            None => writeln!(o, "library {} at {}", c.name, c.root)?,
        }
    }

    Ok(())
}

/// Format the given error.
fn format_errors<O>(mut o: O, error: &Error) -> io::Result<()>
where
    O: io::Write,
{
    writeln!(o, "Error: {}", error)?;

    for error in error.chain().skip(1) {
        writeln!(o, "Caused by: {}", error)?;
    }

    Ok(())
}
