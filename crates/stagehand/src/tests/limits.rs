prelude!();

use std::cell::RefCell;

fn pair() -> Snapshot {
    snapshot(&[
        ("a/a.st", "let { b } = import(\"../b\");\nexport a = b;"),
        ("b/b.st", "export b = 2;"),
    ])
}

fn build_with(snapshot: &Snapshot, options: Options) -> BuildOutput {
    let mut diagnostics = Diagnostics::new();

    let output = prepare(snapshot)
        .with_options(options)
        .with_diagnostics(&mut diagnostics)
        .build()
        .unwrap();

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    output
}

#[test]
fn stop_before() {
    let mut options = Options::default();
    options.stop_before = Some(Stage::Export);

    let output = build_with(&pair(), options);

    // `b` never becomes export ready, so `a` is held at its imports.
    assert_eq!(
        stages(&output),
        [
            (String::from("//a/"), Some(Stage::Import)),
            (String::from("//b/"), Some(Stage::FunctionMacro)),
        ]
    );
    assert!(records(&output, "//a/").is_empty());
}

#[test]
fn stop_before_per_module() {
    let a = location("//a/");

    let output = prepare(&pair())
        .with_stop_before(move |module: &Module| {
            (*module.location() == a).then_some(Stage::Define)
        })
        .build()
        .unwrap();

    assert_eq!(
        stages(&output),
        [
            (String::from("//a/"), Some(Stage::SyntaxMacro)),
            (String::from("//b/"), Some(Stage::GenerateCode)),
        ]
    );
}

#[test]
fn step_quota() {
    let mut snapshot = pair();
    snapshot.insert_file("config.st", "export name = \"top\";");

    let mut options = Options::default();
    options.step_quota = 3;

    let output = build_with(&snapshot, options);

    for (at, stage) in stages(&output) {
        assert_eq!(stage, Some(Stage::Import), "{at}");
    }

    // The configuration module never exported anything, so the library
    // keeps its tentative configuration.
    let top = output.libraries().get_root(&FilePath::root()).unwrap();
    assert_eq!(top.name.as_str(), "top");
    assert!(top.values.is_empty());
}

#[test]
fn may_run() {
    let mut options = Options::default();
    options.may_run = true;

    let output = build_with(&pair(), options);

    for (at, stage) in stages(&output) {
        assert_eq!(stage, Some(Stage::Run), "{at}");
    }
}

#[test]
fn options_from_toml() {
    let options = Options::from_toml("stop-before = \"define\"\nmay-run = true").unwrap();
    let output = build_with(&pair(), options);

    assert_eq!(
        stages(&output),
        [
            (String::from("//a/"), Some(Stage::Import)),
            (String::from("//b/"), Some(Stage::SyntaxMacro)),
        ]
    );
}

#[test]
fn hook_customizes_modules() {
    let calls = RefCell::new(Vec::new());

    let hook = |module: &mut Module, is_new: bool| {
        calls.borrow_mut().push((module.location().to_string(), is_new));

        if is_new && module.location().to_string() == "//a/" {
            module.set_may_run(true);
        }
    };

    let output = prepare(&pair()).with_hook(&hook).build().unwrap();

    assert_eq!(
        stages(&output),
        [
            (String::from("//a/"), Some(Stage::Run)),
            (String::from("//b/"), Some(Stage::GenerateCode)),
        ]
    );

    let calls = calls.into_inner();
    assert_eq!(calls.len(), Stage::ALL.len() + Stage::ALL.len() - 1);

    let new = calls
        .iter()
        .filter(|(_, is_new)| *is_new)
        .map(|(at, _)| at.as_str())
        .collect::<Vec<_>>();

    assert_eq!(new, ["//a/", "//b/"]);
}

#[test]
fn hook_can_hold_modules_back() {
    let hook = |module: &mut Module, _: bool| {
        if module.location().to_string() == "//b/" {
            module.set_step_quota(0);
        }
    };

    let output = prepare(&pair()).with_hook(&hook).build().unwrap();

    assert_eq!(
        stages(&output),
        [
            (String::from("//a/"), Some(Stage::Import)),
            (String::from("//b/"), None),
        ]
    );
}

#[test]
fn halted_drivers_stall_importers() {
    let log = Log::default();

    let frontend = Scripted::new(&log)
        .script("//a/", Script::default().import("../b"))
        .script("//b/", Script::default().halt_after(Stage::Parse));

    let snapshot = snapshot(&[("a/a.st", ""), ("b/b.st", "")]);

    let output = prepare(&snapshot)
        .with_frontend(Arc::new(frontend))
        .build()
        .unwrap();

    assert_eq!(
        stages(&output),
        [
            (String::from("//a/"), Some(Stage::Import)),
            (String::from("//b/"), Some(Stage::Parse)),
        ]
    );

    assert!(!log.events().iter().any(|e| e.starts_with("//a/ import ../b")));
}

#[test]
fn unreadable_files_halt_the_build() {
    let mut snapshot = pair();
    snapshot.insert_unavailable("a/gone.st");
    snapshot.insert_skewed("b/moving.st");

    let mut diagnostics = Diagnostics::new();
    let result = prepare(&snapshot).with_diagnostics(&mut diagnostics).build();

    assert!(result.is_err());

    assert_eq!(
        diagnostic_kinds(&diagnostics),
        [
            (
                Level::Fatal,
                DiagnosticKind::ReadFailed {
                    path: FilePath::file("a/gone.st"),
                }
            ),
            (
                Level::Fatal,
                DiagnosticKind::ReadFailed {
                    path: FilePath::file("b/moving.st"),
                }
            ),
        ]
    );

    let fatal = diagnostics.first_fatal().unwrap();
    assert_eq!(
        fatal.anchor().map(|a| a.file.clone()),
        Some(FilePath::file("a/gone.st"))
    );
}
