prelude!();

fn simple_module(dir: &str, source: &str) -> Module {
    let location = ModuleLocation::from(ModuleName::new(FilePath::dir(dir), 0, false));
    let sources = vec![ModuleSource::whole(
        FilePath::file(&format!("{dir}/{dir}.st")),
        source,
    )];
    let driver = Simple::new().create_driver(&location, &sources);
    Module::new(location, sources, driver)
}

#[test]
fn exporters_reach_export_before_importers_continue() {
    let log = Log::default();
    let frontend = Scripted::new(&log).script("lib//a/", Script::default().import("../b"));

    let snapshot = snapshot(&[
        ("lib/config.st", ""),
        ("lib/a/a.st", ""),
        ("lib/b/b.st", ""),
    ]);

    let mut diagnostics = Diagnostics::new();

    let output = prepare(&snapshot)
        .with_frontend(Arc::new(frontend))
        .with_diagnostics(&mut diagnostics)
        .build()
        .unwrap();

    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    let exported = log.position("lib//b/ export");
    let bound = log.position("lib//a/ import ../b bound to lib//b/");
    let next = log.position("lib//a/ dis-ambiguate");

    assert!(log.position("lib//a/ import") < exported);
    assert!(exported < bound);
    assert!(bound < next);

    assert_eq!(
        records(&output, "lib//a/"),
        [ImportRecord::Ok {
            exporter: location("lib//b/"),
            blocking: true,
        }]
    );

    for (at, stage) in stages(&output) {
        assert_eq!(stage, Some(Stage::GenerateCode), "{at}");
    }
}

#[test]
fn configuration_modules_go_first() {
    let log = Log::default();
    let frontend = Scripted::new(&log);

    let snapshot = snapshot(&[
        ("lib/config.st", ""),
        ("lib/x.st", ""),
        ("lib/a/a.st", ""),
        ("lib/b/b.st", ""),
    ]);

    prepare(&snapshot)
        .with_frontend(Arc::new(frontend))
        .build()
        .unwrap();

    // `lib//` and `lib//a/` sort ahead of the configuration module, but it
    // still takes the first step.
    assert_eq!(log.events()[0], "lib//config.st lex");

    for sibling in ["lib//", "lib//a/", "lib//b/"] {
        assert!(log.position("lib//config.st lex") < log.position(&format!("{sibling} lex")));
    }

    // Once started, the configuration module runs to completion before any
    // other module takes another step.
    let first = log.position("lib//config.st lex");
    let last = log.position("lib//config.st generate-code");

    assert_eq!(last - first, Stage::GenerateCode as usize - Stage::Lex as usize);
    assert!(log.position("lib//a/ lex") > last);
    assert!(log.position("lib//a/ parse") > last);
}

#[test]
fn dependency_order() {
    let mut advancer = Advancer::new();
    advancer.add_module(simple_module("a", "let { b } = import(\"../b\");\nexport a = b;"));
    advancer.add_module(simple_module("b", "let { c } = import(\"../c\");\nexport b = c;"));
    advancer.add_module(simple_module("c", "export c = 1;"));
    advancer.add_module(simple_module("d", "export d = 2;"));

    let mut diagnostics = Diagnostics::new();
    advancer.advance_modules(&mut diagnostics);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    let order = advancer
        .modules_in_dependency_order()
        .into_iter()
        .map(|m| m.location().to_string())
        .collect::<Vec<_>>();

    assert_eq!(order, ["//c/", "//b/", "//a/", "//d/"]);

    let a = advancer
        .modules()
        .lookup(&location("//a/"))
        .map(|id| advancer.module(id));

    assert_eq!(
        a.and_then(|a| a.exports()).and_then(|e| e.get("a")).cloned(),
        Some(Value::Integer(1))
    );
}

#[test]
fn dependency_order_ignores_broken_imports() {
    let mut advancer = Advancer::new();
    advancer.add_module(simple_module("a", "let { b } = import(\"../b\");\nexport a = 1;"));
    advancer.add_module(simple_module("b", "let { a } = import(\"../a\");\nexport b = a;"));

    let mut diagnostics = Diagnostics::new();
    advancer.advance_modules(&mut diagnostics);

    // `a` gave up on `b`, so `b` depends on `a` but not the other way around.
    let order = advancer
        .modules_in_dependency_order()
        .into_iter()
        .map(|m| m.location().to_string())
        .collect::<Vec<_>>();

    assert_eq!(order, ["//a/", "//b/"]);
}

#[test]
fn partitioned_modules() {
    let mut advancer = Advancer::new();

    for (dir, root) in [("lib/a", 1), ("lib/b", 1), ("other/c", 1)] {
        let location = ModuleLocation::from(ModuleName::new(FilePath::dir(dir), root, false));
        let sources = vec![ModuleSource::whole(FilePath::file(&format!("{dir}/x.st")), "")];
        let driver = Simple::new().create_driver(&location, &sources);
        advancer.add_module(Module::new(location, sources, driver));
    }

    let name = LibraryName::new("the-lib").unwrap();
    advancer.configure_library(LibraryConfiguration::tentative(name, FilePath::dir("lib")));

    let partitioned = advancer.partitioned_modules();

    let summary = partitioned
        .iter()
        .map(|(root, (configuration, ids))| {
            let modules = ids
                .iter()
                .map(|id| advancer.module(*id).location().to_string())
                .collect::<Vec<_>>();

            (root.to_string(), configuration.name.to_string(), modules)
        })
        .collect::<Vec<_>>();

    assert_eq!(
        summary,
        [
            (
                String::from("lib/"),
                String::from("the-lib"),
                vec![String::from("lib//a/"), String::from("lib//b/")]
            ),
            (
                String::from("other/"),
                String::from("other"),
                vec![String::from("other//c/")]
            ),
        ]
    );

    // Missing configurations are registered as a side effect.
    assert!(advancer.libraries().get_root(&FilePath::dir("other")).is_some());
}
