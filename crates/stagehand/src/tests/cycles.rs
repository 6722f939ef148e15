prelude!();

fn two_cycle() -> Snapshot {
    snapshot(&[
        ("a/a.st", "let { b } = import(\"../b\");\nexport a = 1;\nexport seen = b;"),
        ("b/b.st", "let { a } = import(\"../a\");\nexport b = 2;\nexport seen = a;"),
    ])
}

#[test]
fn two_modules_importing_each_other() {
    let (output, diagnostics) = build(&two_cycle());

    assert_eq!(
        diagnostic_kinds(&diagnostics),
        [
            (
                Level::Error,
                DiagnosticKind::BreakingImportCycle {
                    importer: location("//a/"),
                    cycle: vec![location("//a/"), location("//b/")],
                }
            ),
            (
                Level::Info,
                DiagnosticKind::InImportCycle {
                    module: location("//b/"),
                }
            ),
        ]
    );

    let message = "Breaking import cycle at `//a/`, cycle is `//a/` -> `//b/`";
    assert_eq!(diagnostics.diagnostics()[0].kind().to_string(), message);

    assert_eq!(
        records(&output, "//a/"),
        [ImportRecord::Broken {
            exporter: location("//b/"),
            blocking: true,
        }]
    );

    assert_eq!(
        records(&output, "//b/"),
        [ImportRecord::Ok {
            exporter: location("//a/"),
            blocking: true,
        }]
    );

    assert_eq!(
        exported(&output, "//a/", "seen"),
        Some(Value::Error(String::from(message)))
    );
    assert_eq!(exported(&output, "//b/", "seen"), Some(Value::Integer(1)));

    for (at, stage) in stages(&output) {
        assert_eq!(stage, Some(Stage::GenerateCode), "{at}");
    }
}

#[test]
fn cycles_are_broken_the_same_way_every_time() {
    let snapshot = two_cycle();
    let (first, first_diagnostics) = build(&snapshot);
    let (second, second_diagnostics) = build(&snapshot);

    assert_eq!(first_diagnostics.diagnostics(), second_diagnostics.diagnostics());

    for at in ["//a/", "//b/"] {
        assert_eq!(records(&first, at), records(&second, at));
    }
}

#[test]
fn importer_with_fewest_pending_imports_gives_up() {
    let snapshot = snapshot(&[
        (
            "a/a.st",
            "let { b } = import(\"../b\");\nlet { b } = import(\"file:b\");\nexport a = 1;",
        ),
        ("b/b.st", "let { c } = import(\"../c\");\nexport b = 2;"),
        ("c/c.st", "let { a } = import(\"../a\");\nexport c = a;"),
    ]);

    let (output, diagnostics) = build(&snapshot);

    assert_eq!(
        diagnostic_kinds(&diagnostics),
        [
            (
                Level::Error,
                DiagnosticKind::BreakingImportCycle {
                    importer: location("//b/"),
                    cycle: vec![location("//a/"), location("//b/"), location("//c/")],
                }
            ),
            (
                Level::Info,
                DiagnosticKind::InImportCycle {
                    module: location("//a/"),
                }
            ),
            (
                Level::Info,
                DiagnosticKind::InImportCycle {
                    module: location("//c/"),
                }
            ),
        ]
    );

    let ok = |at: &str| ImportRecord::Ok {
        exporter: location(at),
        blocking: true,
    };

    assert_eq!(records(&output, "//a/"), [ok("//b/"), ok("//b/")]);
    assert_eq!(
        records(&output, "//b/"),
        [ImportRecord::Broken {
            exporter: location("//c/"),
            blocking: true,
        }]
    );
    assert_eq!(records(&output, "//c/"), [ok("//a/")]);
    assert_eq!(exported(&output, "//c/", "c"), Some(Value::Integer(1)));
}

#[test]
fn self_import() {
    let snapshot = snapshot(&[("a/a.st", "let { a } = import(\"./\");\nexport a = 1;")]);
    let (output, diagnostics) = build(&snapshot);

    assert_eq!(
        diagnostic_kinds(&diagnostics),
        [(
            Level::Error,
            DiagnosticKind::BreakingImportCycle {
                importer: location("//a/"),
                cycle: vec![location("//a/")],
            }
        )]
    );

    assert_eq!(
        records(&output, "//a/"),
        [ImportRecord::Broken {
            exporter: location("//a/"),
            blocking: true,
        }]
    );
    assert_eq!(exported(&output, "//a/", "a"), Some(Value::Integer(1)));
}

#[test]
fn informational_diagnostics_can_be_left_out() {
    let mut diagnostics = Diagnostics::without_info();

    prepare(&two_cycle())
        .with_diagnostics(&mut diagnostics)
        .build()
        .unwrap();

    let levels = diagnostics
        .diagnostics()
        .iter()
        .map(|d| d.level())
        .collect::<Vec<_>>();

    assert_eq!(levels, [Level::Error]);
}
