prelude!();

fn with_preface() -> Snapshot {
    snapshot(&[
        ("a/a.st", "export shared = 1;\n;;;\nexport a = shared;"),
        ("a/b.st", "export b = [shared, 2];"),
    ])
}

#[test]
fn bodies_see_the_preface() {
    let (output, diagnostics) = build(&with_preface());

    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    assert_eq!(
        stages(&output),
        [
            (String::from("//a/:preface"), Some(Stage::GenerateCode)),
            (String::from("//a/"), Some(Stage::GenerateCode)),
        ]
    );

    let body = output.module(&location("//a/")).unwrap();
    assert_eq!(body.outer(), Some(&location("//a/:preface")));
    assert_eq!(body.sources().len(), 2);

    assert_eq!(exported(&output, "//a/", "a"), Some(Value::Integer(1)));
    assert_eq!(
        exported(&output, "//a/", "b"),
        Some(Value::List(vec![Value::Integer(1), Value::Integer(2)]))
    );
    assert_eq!(exported(&output, "//a/", "shared"), Some(Value::Integer(1)));

    assert_eq!(exported(&output, "//a/:preface", "shared"), Some(Value::Integer(1)));
    assert_eq!(exported(&output, "//a/:preface", "a"), None);
}

#[test]
fn bodies_wait_for_their_preface() {
    let log = Log::default();
    let frontend = Scripted::new(&log);

    let output = prepare(&with_preface())
        .with_frontend(Arc::new(frontend))
        .build()
        .unwrap();

    assert!(log.position("//a/:preface export") < log.position("//a/ lex"));
    assert!(output.module(&location("//a/")).unwrap().outer().is_some());
}

#[test]
fn importers_bind_to_the_body() {
    let mut snapshot = with_preface();
    snapshot.insert_file("c/c.st", "let { shared, a } = import(\"../a\");\nexport c = [shared, a];");

    let (output, diagnostics) = build(&snapshot);

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(
        records(&output, "//c/"),
        [ImportRecord::Ok {
            exporter: location("//a/"),
            blocking: true,
        }]
    );
    assert_eq!(
        exported(&output, "//c/", "c"),
        Some(Value::List(vec![Value::Integer(1), Value::Integer(1)]))
    );
}

#[test]
fn stalled_preface_holds_back_the_body() {
    let log = Log::default();
    let frontend = Scripted::new(&log).script("//a/:preface", Script::default().halt_after(Stage::Parse));

    let output = prepare(&with_preface())
        .with_frontend(Arc::new(frontend))
        .build()
        .unwrap();

    assert_eq!(
        stages(&output),
        [
            (String::from("//a/:preface"), Some(Stage::Parse)),
            (String::from("//a/"), None),
        ]
    );
}
