prelude!();

use anyhow::Context as _;
use semver::Version;

#[test]
fn configuration_module_reconfigures_its_library() -> anyhow::Result<()> {
    let snapshot = snapshot(&[
        (
            "lib/config.st",
            "let n = \"fancy\";\nexport name = n;\nexport version = \"1.2.0\";\nexport targets = [\"js\", \"lua\"];",
        ),
        ("lib/a/a.st", "let { b } = import(\"fancy/b\");\nexport a = b;"),
        ("lib/b/b.st", "export b = \"from b\";"),
    ]);

    let (output, diagnostics) = build(&snapshot);

    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    let lib = output
        .libraries()
        .get_root(&FilePath::dir("lib"))
        .context("missing configuration for lib/")?;

    assert_eq!(lib.name.as_str(), "fancy");
    assert_eq!(lib.version, Some(Version::new(1, 2, 0)));
    assert_eq!(lib.targets, ["js", "lua"]);
    assert_eq!(lib.values.get("version"), Some(&Value::String(String::from("1.2.0"))));
    assert_eq!(lib.values.get("n"), None);

    assert!(output.libraries().get_by_name(&"lib".parse()?).is_none());

    assert_eq!(
        exported(&output, "lib//a/", "a"),
        Some(Value::String(String::from("from b")))
    );

    Ok(())
}

#[test]
fn invalid_names_keep_the_guessed_name() {
    let snapshot = snapshot(&[
        ("My Lib/config.st", "export name = \"not valid\";\nexport version = \"two\";"),
        ("My Lib/a/a.st", "export a = 1;"),
    ]);

    let (output, _) = build(&snapshot);

    let lib = output.libraries().get_root(&FilePath::dir("My Lib")).unwrap();
    assert_eq!(lib.name.as_str(), "my-lib");
    assert_eq!(lib.version, None);
}

#[test]
fn modules_belong_to_the_deepest_library() {
    let snapshot = snapshot(&[
        ("lib/config.st", "export name = \"outer\";"),
        ("lib/sub/config.st", "export name = \"inner\";"),
        ("lib/sub/x/x.st", "let { y } = import(\"../../y\");\nexport x = y;"),
        ("lib/y/y.st", "export y = 1;"),
    ]);

    let (output, diagnostics) = build(&snapshot);

    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    let locations = stages(&output)
        .into_iter()
        .map(|(at, _)| at)
        .collect::<Vec<_>>();

    assert_eq!(
        locations,
        [
            "lib//config.st",
            "lib/sub//config.st",
            "lib/sub//x/",
            "lib//y/",
        ]
    );

    let name_of = |path: &str| {
        output
            .libraries()
            .get(&FilePath::dir(path))
            .map(|c| c.name.to_string())
    };

    assert_eq!(name_of("lib/sub/x").as_deref(), Some("inner"));
    assert_eq!(name_of("lib/y").as_deref(), Some("outer"));
    assert_eq!(name_of("elsewhere"), None);

    assert_eq!(exported(&output, "lib/sub//x/", "x"), Some(Value::Integer(1)));
}

#[test]
fn duplicate_library_names_are_fatal() {
    let snapshot = snapshot(&[
        ("two/config.st", "export name = \"same\";"),
        ("one/config.st", "export name = \"same\";"),
        ("one/a/a.st", "export a = 1;"),
    ]);

    let mut diagnostics = Diagnostics::new();

    let result = prepare(&snapshot)
        .with_diagnostics(&mut diagnostics)
        .build();

    assert!(matches!(result, Err(BuildError)));

    assert_eq!(
        diagnostic_kinds(&diagnostics),
        [(
            Level::Fatal,
            DiagnosticKind::DuplicateLibraryName {
                name: LibraryName::new("same").unwrap(),
                roots: vec![FilePath::dir("one"), FilePath::dir("two")],
            }
        )]
    );

    let fatal = diagnostics.first_fatal().unwrap();
    assert_eq!(
        fatal.kind().to_string(),
        "Library name `same` is used by more than one library: `one/`, `two/`"
    );
}

#[test]
fn required_libraries_are_configured() {
    let snapshot = snapshot(&[("a/a.st", "export a = 1;")]);

    let output = prepare(&snapshot)
        .with_required_library(LibraryName::standard())
        .with_required_library(LibraryName::new("unheard-of").unwrap())
        .build()
        .unwrap();

    let std = output.libraries().get_by_name(&LibraryName::standard());
    assert_eq!(std.map(|c| c.root.clone()), Some(FilePath::dir("std")));
    assert!(output.externals().count() > 0);
    assert_eq!(output.libraries().len(), 1);
}

#[test]
fn shared_standard_library_is_staged_once() {
    let standard = StandardLibrary::builtin();
    let snapshot = snapshot(&[("a/a.st", "let { yes } = import(\"std/core\");\nexport a = yes;")]);

    for _ in 0..2 {
        let output = prepare(&snapshot)
            .with_standard_library(standard.clone())
            .build()
            .unwrap();

        assert_eq!(exported(&output, "//a/", "a"), Some(Value::Bool(true)));
    }

    assert!(format!("{standard:?}").contains("built: true"));
}
