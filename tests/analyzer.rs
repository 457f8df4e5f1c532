//! End-to-end tests driving the analyzer through its public surface.

use pike_analyzer::{
    runtime::{Instance, ModuleNode, Runtime, Value},
    symbols::{ImportKind, SymbolKind},
    Analyzer, AnalyzerConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn analyzer_at(root: &Path) -> Analyzer {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    Analyzer::new(AnalyzerConfig::new(root))
}

#[test]
fn resolves_quoted_include_relative_to_current_file() {
    let dir = TempDir::new().unwrap();
    let header = write(dir.path(), "src/defs.h", "#define X 1\n");
    let current = write(dir.path(), "src/main.pike", "int x;\n");

    let mut analyzer = analyzer_at(dir.path());
    let resolution =
        analyzer.resolve_import(ImportKind::Include, "\"defs.h\"", Some(&current));
    assert!(resolution.exists);
    assert_eq!(resolution.path, header);
    assert!(resolution.mtime.is_some());
}

#[test]
fn resolves_angled_include_from_configured_roots() {
    let dir = TempDir::new().unwrap();
    let sys = write(dir.path(), "sysinclude/system.h", "#define Y 2\n");
    let config = AnalyzerConfig::new(dir.path())
        .with_include_dirs([dir.path().join("sysinclude")]);
    let mut analyzer = Analyzer::new(config);

    let resolution = analyzer.resolve_import(ImportKind::Include, "<system.h>", None);
    assert!(resolution.exists);
    assert_eq!(resolution.path, sys);

    let missing = analyzer.resolve_import(ImportKind::Include, "<absent.h>", None);
    assert!(!missing.exists);
    assert!(missing.error.is_some());
    assert_eq!(missing.path, PathBuf::new());
}

#[test]
fn resolve_import_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/defs.h", "#define X 1\n");
    let current = write(dir.path(), "src/main.pike", "int x;\n");

    let mut analyzer = analyzer_at(dir.path());
    let first = analyzer.resolve_import(ImportKind::Include, "\"defs.h\"", Some(&current));
    let second = analyzer.resolve_import(ImportKind::Include, "\"defs.h\"", Some(&current));
    assert_eq!((first.path, first.exists), (second.path, second.exists));
}

#[test]
fn inherit_resolves_through_workspace_walk() {
    let dir = TempDir::new().unwrap();
    let base = write(dir.path(), "lib/connection.pike", "class Connection {\n  int fd;\n}\n");
    let current = write(dir.path(), "lib/server/handler.pike", "inherit Connection;\n");

    let mut analyzer = analyzer_at(dir.path());
    let resolution =
        analyzer.resolve_import(ImportKind::Inherit, "Connection", Some(&current));
    assert!(resolution.exists);
    assert_eq!(resolution.path, base);
}

#[test]
fn inherit_resolves_through_qualification_sweep() {
    let dir = TempDir::new().unwrap();
    let mut analyzer = analyzer_at(dir.path());
    let hash = write(dir.path(), "stdlib/Hash.pike", "int hash_block;\n");
    analyzer
        .runtime_mut()
        .register_module("Crypto.Hash", ModuleNode::leaf(hash.to_string_lossy()));

    let resolution = analyzer.resolve_import(ImportKind::Inherit, "Hash", None);
    assert!(resolution.exists);
    assert_eq!(resolution.path, hash);
}

#[test]
fn require_falls_back_to_relative_join() {
    let dir = TempDir::new().unwrap();
    let helper = write(dir.path(), "src/helper.pike", "int h;\n");
    let current = write(dir.path(), "src/main.pike", "int x;\n");

    let mut analyzer = analyzer_at(dir.path());
    let resolution =
        analyzer.resolve_import(ImportKind::Require, "helper.pike", Some(&current));
    assert!(resolution.exists);
    assert_eq!(resolution.path, helper);
}

#[test]
fn resolve_stdlib_introspects_registered_modules() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "stdlib/Random.pike",
        "//! Random byte source.\nint seed;\nstring random_string(int len) { return \"\"; }\n",
    );
    let mut analyzer = analyzer_at(dir.path());
    analyzer.runtime_mut().register_source_module(
        "Crypto.Random",
        &path,
        &fs::read_to_string(&path).unwrap(),
    );

    let resolution = analyzer.resolve_stdlib("Crypto.Random");
    assert!(resolution.found);
    assert!(!resolution.circular);
    assert_eq!(resolution.path.as_deref(), Some(path.as_path()));
    let names: Vec<&str> = resolution.symbols.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"seed"));
    assert!(names.contains(&"random_string"));

    // second lookup is served by the stdlib store
    let stats_before = analyzer.cache_stats().stdlib;
    let again = analyzer.resolve_stdlib("Crypto.Random");
    assert!(again.found);
    let stats_after = analyzer.cache_stats().stdlib;
    assert_eq!(stats_after.hits, stats_before.hits + 1);
}

#[test]
fn resolve_stdlib_reports_missing_modules_as_results() {
    let dir = TempDir::new().unwrap();
    let mut analyzer = analyzer_at(dir.path());
    let resolution = analyzer.resolve_stdlib("No.Such.Module");
    assert!(!resolution.found);
    assert!(resolution.error.unwrap().contains("No.Such.Module"));
    // a failed resolve leaves no guard entry behind
    let again = analyzer.resolve_stdlib("No.Such.Module");
    assert!(!again.circular);
}

#[test]
fn bootstrap_singletons_are_introspected_without_instantiation() {
    let dir = TempDir::new().unwrap();
    let mut analyzer = analyzer_at(dir.path());
    analyzer.runtime_mut().register_singleton(
        "Stdio",
        Instance::new(vec![
            ("stdout".into(), Value::Object),
            (
                "read_file".into(),
                Value::Function { type_string: "function(string : string)".into() },
            ),
        ]),
    );

    let resolution = analyzer.resolve_stdlib("Stdio");
    assert!(resolution.found);
    let read_file = resolution.symbols.iter().find(|s| s.name == "read_file").unwrap();
    assert_eq!(read_file.kind, SymbolKind::Function);
    assert_eq!(read_file.return_type.as_deref(), Some("string"));
    assert_eq!(read_file.arg_names.as_deref(), Some(&["arg1".to_string()][..]));
}

#[test]
fn introspect_skips_compilation_for_require_sources() {
    let dir = TempDir::new().unwrap();
    let mut analyzer = analyzer_at(dir.path());
    let outcome = analyzer.handle_introspect(
        "#require constant(Crypto)\nint x;\n",
        Path::new("/proj/uses_require.pike"),
    );
    assert!(outcome.success);
    assert!(outcome.parser_only);
    assert!(outcome.require_directive_skipped);
    assert!(outcome.symbols.is_empty());
}

#[test]
fn introspect_rewrites_relative_references_in_pmod_members() {
    let dir = TempDir::new().unwrap();
    let random = write(dir.path(), "Crypto.pmod/Random.pike", "int seed;\n");
    let mut analyzer = analyzer_at(dir.path());
    analyzer
        .runtime_mut()
        .register_module("Crypto.Random", ModuleNode::leaf(random.to_string_lossy()));

    let member = dir.path().join("Crypto.pmod/PGP.pike");
    let outcome = analyzer.handle_introspect("inherit .Random;\nint key_bits;\n", &member);
    assert!(outcome.success);
    // the relative inherit resolved against the parent module
    assert_eq!(outcome.inherits.len(), 1);
    assert_eq!(outcome.inherits[0].path, random);
}

#[test]
fn introspect_marks_inherited_symbols() {
    let dir = TempDir::new().unwrap();
    let base = write(dir.path(), "lib/Base.pike", "int base_field;\nvoid base_fn() {}\n");
    let mut analyzer = analyzer_at(dir.path());
    analyzer.runtime_mut().register_source_module(
        "Base",
        &base,
        &fs::read_to_string(&base).unwrap(),
    );

    let child = dir.path().join("src/child.pike");
    let outcome =
        analyzer.handle_introspect("inherit Base;\nint own_field;\n", &child);
    assert!(outcome.success);
    let base_field = outcome.symbols.iter().find(|s| s.name == "base_field").unwrap();
    assert!(base_field.inherited);
    assert_eq!(base_field.inherited_from.as_deref(), Some("Base.pike"));
    let own = outcome.symbols.iter().find(|s| s.name == "own_field").unwrap();
    assert!(!own.inherited);
}

#[test]
fn failed_instantiation_degrades_to_inheritance_only() {
    let dir = TempDir::new().unwrap();
    let base = write(dir.path(), "lib/Base.pike", "int base_field;\n");
    let mut analyzer = analyzer_at(dir.path());
    analyzer.runtime_mut().register_source_module(
        "Base",
        &base,
        &fs::read_to_string(&base).unwrap(),
    );
    let child_path = dir.path().join("src/child.pike");
    let result = analyzer
        .runtime_mut()
        .compile("inherit Base;\nint own_field;\n", &child_path);
    let program = result.program.unwrap();
    analyzer.runtime_mut().fail_instantiation(&child_path, "create() has side effects");

    let outcome = analyzer.introspect_program(program);
    assert!(outcome.success);
    assert_eq!(outcome.inherits.len(), 1);
    assert!(outcome.symbols.iter().all(|s| s.kind == SymbolKind::Inherit));
}

#[test]
fn file_change_invalidates_transitive_dependents() {
    let dir = TempDir::new().unwrap();
    let base = write(dir.path(), "src/base.pike", "int base_field;\n");
    let child = write(dir.path(), "src/child.pike", "#include \"base.pike\"\nint c;\n");

    let mut analyzer = analyzer_at(dir.path());
    let base_code = fs::read_to_string(&base).unwrap();
    let child_code = fs::read_to_string(&child).unwrap();
    assert!(analyzer.handle_introspect(&base_code, &base).success);
    assert!(analyzer.handle_introspect(&child_code, &child).success);

    let mut invalidated = analyzer.file_changed(&base);
    invalidated.sort();
    let mut expected = vec![base.clone(), child.clone()];
    expected.sort();
    assert_eq!(invalidated, expected);
}

#[test]
fn waterfall_aggregates_symbols_with_provenance() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/c.pike", "int from_c;\n");
    write(dir.path(), "src/b.pike", "#include \"c.pike\"\nint from_b;\nint shared;\n");
    let a = write(
        dir.path(),
        "src/a.pike",
        "#include \"b.pike\"\nint from_a;\nint shared;\n",
    );

    let mut analyzer = analyzer_at(dir.path());
    let code = fs::read_to_string(&a).unwrap();
    let result = analyzer.waterfall_symbols(&code, &a, 2);

    let find = |name: &str| result.symbols.iter().find(|s| s.name == name).unwrap();
    assert_eq!(find("from_a").provenance_depth, Some(0));
    assert_eq!(find("from_b").provenance_depth, Some(1));
    assert_eq!(find("from_c").provenance_depth, Some(2));
    // the shallower definition wins
    assert_eq!(find("shared").provenance_depth, Some(0));
    assert_eq!(result.transitive.len(), 2);
    assert_eq!(result.provenance.get(&a.to_string_lossy().into_owned()), Some(&0));
}

#[test]
fn waterfall_depth_limit_prunes_the_walk() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/c.pike", "int from_c;\n");
    write(dir.path(), "src/b.pike", "#include \"c.pike\"\nint from_b;\n");
    let a = write(dir.path(), "src/a.pike", "#include \"b.pike\"\nint from_a;\n");

    let mut analyzer = analyzer_at(dir.path());
    let code = fs::read_to_string(&a).unwrap();
    let result = analyzer.waterfall_symbols(&code, &a, 1);
    assert!(result.symbols.iter().any(|s| s.name == "from_b"));
    assert!(result.symbols.iter().all(|s| s.name != "from_c"));
}

#[test]
fn check_circular_detects_include_cycles_on_disk() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "src/a.pike", "#include \"b.pike\"\nint a;\n");
    write(dir.path(), "src/b.pike", "#include \"a.pike\"\nint b;\n");

    let mut analyzer = analyzer_at(dir.path());
    let code = fs::read_to_string(&a).unwrap();
    let report = analyzer.check_circular_code(&code, &a);
    assert!(report.has_circular);
    assert!(!report.cycle.is_empty());
    assert_eq!(report.dependencies.len(), 1);
}

#[test]
fn get_inherited_lists_parent_members() {
    let dir = TempDir::new().unwrap();
    let base = write(dir.path(), "lib/Base.pike", "int base_field;\nvoid base_fn() {}\n");
    let child = write(dir.path(), "lib/Child.pike", "inherit Base;\nint own;\n");
    let mut analyzer = analyzer_at(dir.path());
    analyzer.runtime_mut().register_source_module(
        "Base",
        &base,
        &fs::read_to_string(&base).unwrap(),
    );
    analyzer.runtime_mut().register_source_module(
        "Child",
        &child,
        &fs::read_to_string(&child).unwrap(),
    );

    let inherited = analyzer.get_inherited("Child");
    assert!(inherited.found);
    assert_eq!(inherited.inherit_count, 1);
    let names: Vec<&str> = inherited.members.iter().map(|m| m.name.as_str()).collect();
    assert!(names.contains(&"base_field"));
    assert!(names.contains(&"base_fn"));
    assert!(!names.contains(&"own"));

    let missing = analyzer.get_inherited("Absent");
    assert!(!missing.found);
}

#[test]
fn parse_request_attaches_hover_documentation() {
    let dir = TempDir::new().unwrap();
    let mut analyzer = analyzer_at(dir.path());
    let response = analyzer.handle_request(
        "parse",
        json!({
            "code": "//! Do a thing.\n//! @param name Who to greet\n//! @returns The greeting\n//! @seealso other_fn\nstring greet(string name) { return name; }\n",
            "filename": "/proj/greeter.pike",
        }),
    );
    let doc = &response["result"]["symbols"][0]["documentation"];
    assert_eq!(doc["text"], "Do a thing.");
    assert_eq!(doc["params"]["name"], "Who to greet");
    assert_eq!(doc["paramOrder"][0], "name");
    assert_eq!(doc["returns"], "The greeting");
    assert_eq!(doc["seealso"][0], "other_fn");
    assert!(doc.get("deprecated").is_none());
}

#[test]
fn stats_expose_hits_misses_and_sizes() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/defs.h", "#define X 1\n");
    let current = write(dir.path(), "src/main.pike", "int x;\n");
    let mut analyzer = analyzer_at(dir.path());

    analyzer.resolve_import(ImportKind::Include, "\"defs.h\"", Some(&current));
    analyzer.resolve_import(ImportKind::Include, "\"defs.h\"", Some(&current));
    let imports = analyzer.cache_stats().imports;
    assert_eq!(imports.size, 1);
    assert!(imports.hits >= 1);
    assert_eq!(imports.capacity, 100);
}
