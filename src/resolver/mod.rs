//! Resolution of `include`, `import`, `inherit` and `require` directives.
//!
//! Extraction of directives from source lives in [`parse`]; this module turns
//! one extracted directive into a filesystem path using the multi-strategy
//! search the editor layer expects, detects resolution cycles, and aggregates
//! symbols across the import graph (waterfall loading).

pub mod parse;
mod rewrite;

pub use parse::{extract_imports, PikeData};
pub use rewrite::rewrite_relative_references;

use crate::{
    runtime::{ModuleNode, ProgramId, Runtime},
    symbols::{ImportEntry, ImportKind, Symbol},
    utils, Analyzer,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Outcome of resolving a single directive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Empty when resolution failed.
    pub path: PathBuf,
    pub exists: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ImportKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Resolution {
    pub fn found(path: PathBuf, mtime: Option<u64>) -> Self {
        Self { path, exists: true, kind: None, mtime, error: None }
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self {
            path: PathBuf::new(),
            exists: false,
            kind: None,
            mtime: None,
            error: Some(error.into()),
        }
    }

    fn with_kind(mut self, kind: ImportKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A stdlib module the analyzer has resolved and introspected, as held by
/// the stdlib LRU store.
#[derive(Clone, Debug, Serialize)]
pub struct StdlibModule {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub symbols: Vec<Symbol>,
}

/// Result shape of `resolve_stdlib`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StdlibResolution {
    pub found: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub circular: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result shape of `check_circular`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CircularReport {
    pub has_circular: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycle: Vec<String>,
    pub dependencies: Vec<String>,
}

/// Result shape of `get_waterfall_symbols`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct WaterfallSymbols {
    pub symbols: Vec<Symbol>,
    pub imports: Vec<ImportEntry>,
    /// Files visited beyond the requesting one.
    pub transitive: Vec<PathBuf>,
    /// File to shortest visit depth.
    pub provenance: BTreeMap<String, i32>,
}

impl<R: Runtime> Analyzer<R> {
    /// Resolves one directive to a filesystem path. Results are cached in
    /// the import store, keyed by `(kind, target, origin)` and validated
    /// against the resolved file's mtime.
    pub fn resolve_import(
        &mut self,
        kind: ImportKind,
        target: &str,
        current_file: Option<&Path>,
    ) -> Resolution {
        let key = import_cache_key(kind, target, current_file);
        if let Some(cached_path) = self.bank.peek_import_path(&key) {
            let current_mtime = utils::mtime_secs(&cached_path).ok();
            if let Some(hit) = self.bank.get_import(&mut self.clock, &key, current_mtime) {
                return hit;
            }
        }

        let resolution = match kind {
            ImportKind::Include => self.resolve_include(target, current_file),
            ImportKind::Import => self.resolve_import_directive(target),
            ImportKind::Inherit => self.resolve_inherit(target, current_file),
            ImportKind::Require => self.resolve_require(target, current_file),
        }
        .with_kind(kind);

        if resolution.exists {
            self.bank.put_import(&mut self.clock, key, resolution.clone());
        }
        resolution
    }

    /// `#include "x"` searches relative to the including file, `#include
    /// <x>` the configured system include roots.
    fn resolve_include(&self, target: &str, current_file: Option<&Path>) -> Resolution {
        if let Some(bare) = strip_delimiters(target, '"', '"') {
            return match current_file.and_then(Path::parent) {
                Some(dir) => file_resolution(dir.join(bare)),
                None => Resolution::not_found(format!(
                    "cannot resolve \"{bare}\" without a current file"
                )),
            };
        }
        if let Some(bare) = strip_delimiters(target, '<', '>') {
            for root in &self.config.include_dirs {
                let candidate = root.join(bare);
                if candidate.is_file() {
                    return file_resolution(candidate);
                }
            }
            return Resolution::not_found(format!("<{bare}> not found in any include root"));
        }
        // no delimiters: try relative first, then the include roots
        if let Some(dir) = current_file.and_then(Path::parent) {
            let candidate = dir.join(target);
            if candidate.is_file() {
                return file_resolution(candidate);
            }
        }
        for root in &self.config.include_dirs {
            let candidate = root.join(target);
            if candidate.is_file() {
                return file_resolution(candidate);
            }
        }
        Resolution::not_found(format!("include target {target} not found"))
    }

    /// `import X.Y` goes through the host module system.
    fn resolve_import_directive(&mut self, target: &str) -> Resolution {
        match self.resolve_module_path(target) {
            Some((path, _)) => {
                let mtime = utils::mtime_secs(&path).ok();
                Resolution::found(path, mtime)
            }
            None => Resolution::not_found(format!("module {target} not found")),
        }
    }

    /// Resolves a dotted module name to a path, unwrapping the module-system
    /// node kinds: joinnodes are searched constituent by constituent,
    /// dirnodes prefer their `module.pmod`, plain programs report their
    /// source path (minus a `:<line>` suffix).
    pub(crate) fn resolve_module_path(
        &mut self,
        dotted: &str,
    ) -> Option<(PathBuf, Option<ProgramId>)> {
        let node = self.runtime.resolve_module(dotted)?;
        resolve_node(&node)
    }

    /// `inherit X` tries, in order: classes the analyzer has already seen,
    /// the qualification sweep over common module prefixes, a workspace walk
    /// for a textual `class X` declaration, and finally the module system.
    fn resolve_inherit(&mut self, target: &str, current_file: Option<&Path>) -> Resolution {
        // 1. introspection cache
        if let Some(path) = self.class_index.get(target) {
            let path = path.clone();
            trace!(target, path = %path.display(), "inherit resolved from class index");
            let mtime = utils::mtime_secs(&path).ok();
            return Resolution::found(path, mtime);
        }

        // 2. qualification sweep
        let prefixes = self.config.qualification_prefixes.clone();
        for prefix in &prefixes {
            let qualified = format!("{prefix}.{target}");
            if let Some((path, _)) = self.resolve_module_path(&qualified) {
                trace!(target, qualified = %qualified, "inherit resolved via qualification sweep");
                let mtime = utils::mtime_secs(&path).ok();
                return Resolution::found(path, mtime);
            }
        }

        // 3. workspace walk for a textual class declaration
        if let Some(found) = self.workspace_class_scan(target, current_file) {
            return found;
        }

        // 4. module system on the bare name
        if let Some((path, _)) = self.resolve_module_path(target) {
            let mtime = utils::mtime_secs(&path).ok();
            return Resolution::found(path, mtime);
        }
        Resolution::not_found(format!("unable to resolve inherit {target}"))
    }

    /// Scans the current file's directory and up to `inherit_walk_depth`
    /// parents for a source file declaring `class <target>`.
    fn workspace_class_scan(
        &mut self,
        target: &str,
        current_file: Option<&Path>,
    ) -> Option<Resolution> {
        let mut dir = current_file?.parent()?;
        for _ in 0..=self.config.inherit_walk_depth {
            let mut candidates: Vec<PathBuf> = WalkDir::new(dir)
                .max_depth(1)
                .follow_links(true)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.path()
                        .extension()
                        .map(|ext| utils::PIKE_EXTENSIONS.iter().any(|x| ext == *x))
                        .unwrap_or_default()
                })
                .map(|e| e.path().to_path_buf())
                .collect();
            candidates.sort();
            for candidate in candidates {
                let Ok(content) = utils::read_source(&candidate) else { continue };
                let declares = utils::RE_CLASS_DECL
                    .captures_iter(&content)
                    .any(|cap| &cap["name"] == target);
                if declares {
                    trace!(target, path = %candidate.display(), "inherit resolved via workspace walk");
                    self.class_index.insert(target.to_string(), candidate.clone());
                    let mtime = utils::mtime_secs(&candidate).ok();
                    return Some(Resolution::found(candidate, mtime));
                }
            }
            dir = dir.parent()?;
        }
        None
    }

    /// `#require target` first tries module resolution, then a join relative
    /// to the current file.
    fn resolve_require(&mut self, target: &str, current_file: Option<&Path>) -> Resolution {
        if let Some((path, _)) = self.resolve_module_path(target) {
            let mtime = utils::mtime_secs(&path).ok();
            return Resolution::found(path, mtime);
        }
        if let Some(dir) = current_file.and_then(Path::parent) {
            let candidate = dir.join(target);
            if candidate.exists() {
                return file_resolution(candidate);
            }
        }
        Resolution::not_found(format!("unable to resolve requirement {target}"))
    }

    /// Extracts directive entries from source and resolves each to a path,
    /// best effort.
    pub fn extract_imports_resolved(
        &mut self,
        code: &str,
        current_file: Option<&Path>,
    ) -> (Vec<ImportEntry>, Vec<PathBuf>) {
        let entries = parse::extract_imports(code);
        let mut dependencies = Vec::new();
        for entry in &entries {
            if entry.skip {
                continue;
            }
            let resolved = self.resolve_import(entry.kind, &entry.target_text, current_file);
            if resolved.exists {
                dependencies.push(resolved.path);
            }
        }
        (entries, dependencies)
    }

    /// Resolves a stdlib module by dotted name, introspects it, and caches
    /// the outcome. Re-entering for a module that is already being resolved
    /// reports a cycle instead of recursing.
    pub fn resolve_stdlib(&mut self, module: &str) -> StdlibResolution {
        if self.currently_resolving.contains(module) {
            debug!(module, "circular stdlib resolution broken");
            return StdlibResolution {
                found: true,
                circular: true,
                module: Some(module.to_string()),
                message: Some(format!("circular resolution of {module} broken")),
                ..Default::default()
            };
        }
        self.currently_resolving.insert(module.to_string());
        let result = self.resolve_stdlib_inner(module);
        // the guard must go away on every exit path, including errors
        self.currently_resolving.remove(module);
        match result {
            Ok(resolution) => resolution,
            Err(err) => StdlibResolution {
                found: false,
                module: Some(module.to_string()),
                error: Some(err.to_string()),
                ..Default::default()
            },
        }
    }

    fn resolve_stdlib_inner(&mut self, module: &str) -> crate::Result<StdlibResolution> {
        if let Some(cached) = self.bank.get_stdlib(&mut self.clock, module) {
            return Ok(stdlib_hit(&cached));
        }

        // bootstrap singletons must not be re-instantiated; walk the live
        // object instead
        if self.config.is_bootstrap_module(module) {
            if let Some(outcome) = self.introspect_object(module) {
                let entry =
                    StdlibModule { module: module.to_string(), path: None, symbols: outcome.symbols };
                let entry = std::sync::Arc::new(entry);
                self.bank.put_stdlib(&mut self.clock, module, entry.clone());
                self.class_index_record(&entry);
                return Ok(stdlib_hit(&entry));
            }
        }

        let Some((path, program)) = self.resolve_module_path(module) else {
            return Ok(StdlibResolution {
                found: false,
                module: Some(module.to_string()),
                error: Some(format!("module {module} not found")),
                ..Default::default()
            });
        };

        let mut symbols = match program {
            Some(program) => self.introspect_program(program).symbols,
            None => Vec::new(),
        };
        // fall back to (or enrich with) a source-level parse so hover docs
        // survive even when the runtime has no program for the module
        self.merge_source_docs(&mut symbols, &path);

        let entry = StdlibModule {
            module: module.to_string(),
            path: Some(path),
            symbols,
        };
        let entry = std::sync::Arc::new(entry);
        self.bank.put_stdlib(&mut self.clock, module, entry.clone());
        self.class_index_record(&entry);
        Ok(stdlib_hit(&entry))
    }

    fn class_index_record(&mut self, module: &StdlibModule) {
        let Some(path) = &module.path else { return };
        for symbol in &module.symbols {
            if symbol.kind == crate::symbols::SymbolKind::Class {
                self.class_index.insert(symbol.name.clone(), path.clone());
            }
        }
    }

    /// Checks an explicit dependency graph for cycles.
    pub fn check_circular_graph(graph: &BTreeMap<String, Vec<String>>) -> CircularReport {
        let cycle = find_cycle(graph);
        CircularReport {
            has_circular: cycle.is_some(),
            cycle: cycle.unwrap_or_default(),
            dependencies: graph.keys().cloned().collect(),
        }
    }

    /// Builds the dependency graph reachable from `code` and checks it for
    /// cycles.
    pub fn check_circular_code(&mut self, code: &str, filename: &Path) -> CircularReport {
        let mut graph: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut pending = vec![(filename.to_path_buf(), code.to_string())];
        let mut seen = HashSet::new();
        seen.insert(filename.to_path_buf());
        while let Some((file, content)) = pending.pop() {
            let (_, deps) = self.extract_imports_resolved(&content, Some(&file));
            let names: Vec<String> =
                deps.iter().map(|d| d.to_string_lossy().into_owned()).collect();
            graph.insert(file.to_string_lossy().into_owned(), names);
            for dep in deps {
                if seen.insert(dep.clone()) {
                    if let Ok(content) = utils::read_source(&dep) {
                        pending.push((dep, content));
                    }
                }
            }
        }
        let cycle = find_cycle(&graph);
        let dependencies =
            graph.get(&filename.to_string_lossy().into_owned()).cloned().unwrap_or_default();
        CircularReport {
            has_circular: cycle.is_some(),
            cycle: cycle.unwrap_or_default(),
            dependencies,
        }
    }

    /// Depth-limited recursive symbol aggregation across the import graph.
    ///
    /// Each symbol is annotated with the depth and file it came from; when
    /// the same name shows up at several depths the shallower one wins, and
    /// a depth of -1 (the requesting file itself, injected by the caller)
    /// always wins. Revisiting a file through a cycle flags the symbols
    /// already attributed to it as circular.
    pub fn waterfall_symbols(
        &mut self,
        code: &str,
        filename: &Path,
        max_depth: u32,
    ) -> WaterfallSymbols {
        let mut result = WaterfallSymbols::default();
        let mut merged: HashMap<String, Symbol> = HashMap::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut queue = vec![(filename.to_path_buf(), code.to_string(), 0i32)];

        while let Some((file, content, depth)) = queue.pop() {
            if !visited.insert(file.clone()) {
                // revisit through a cycle: flag everything attributed to it
                let name = file.to_string_lossy();
                for symbol in merged.values_mut() {
                    if symbol.provenance_file.as_deref() == Some(name.as_ref()) {
                        symbol.is_circular = true;
                    }
                }
                continue;
            }
            let file_name = file.to_string_lossy().into_owned();
            result
                .provenance
                .entry(file_name.clone())
                .and_modify(|d| *d = (*d).min(depth))
                .or_insert(depth);
            if depth > 0 {
                result.transitive.push(file.clone());
            }

            let parsed = crate::parse::parse_source(&content, &file_name);
            for mut symbol in parsed.symbols {
                symbol.provenance_depth = Some(depth);
                symbol.provenance_file = Some(file_name.clone());
                match merged.get(&symbol.name) {
                    Some(existing)
                        if existing.provenance_depth.unwrap_or(i32::MAX) <= depth => {}
                    _ => {
                        merged.insert(symbol.name.clone(), symbol);
                    }
                }
            }

            let (entries, deps) = self.extract_imports_resolved(&content, Some(&file));
            if depth == 0 {
                result.imports = entries;
            }
            if depth + 1 > max_depth as i32 {
                continue;
            }
            for dep in deps {
                if let Ok(content) = utils::read_source(&dep) {
                    queue.push((dep, content, depth + 1));
                } else if visited.contains(&dep) {
                    queue.push((dep, String::new(), depth + 1));
                }
            }
        }

        let mut symbols: Vec<Symbol> = merged.into_values().collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));
        result.transitive.sort();
        result.symbols = symbols;
        result
    }
}

fn stdlib_hit(module: &StdlibModule) -> StdlibResolution {
    StdlibResolution {
        found: true,
        module: Some(module.module.clone()),
        path: module.path.clone(),
        symbols: module.symbols.clone(),
        ..Default::default()
    }
}

fn import_cache_key(kind: ImportKind, target: &str, current_file: Option<&Path>) -> String {
    let origin = current_file.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
    format!("{kind}\u{1f}{target}\u{1f}{origin}")
}

fn strip_delimiters(target: &str, open: char, close: char) -> Option<&str> {
    target.strip_prefix(open)?.strip_suffix(close)
}

fn file_resolution(path: PathBuf) -> Resolution {
    if path.is_file() {
        let mtime = utils::mtime_secs(&path).ok();
        Resolution::found(path, mtime)
    } else {
        Resolution::not_found(format!("{} does not exist", path.display()))
    }
}

/// Unwraps a module-system node to a path.
fn resolve_node(node: &ModuleNode) -> Option<(PathBuf, Option<ProgramId>)> {
    match node {
        ModuleNode::Join(parts) => parts.iter().find_map(resolve_node),
        ModuleNode::Dir(dir) => {
            let module_file = dir.join(utils::PMOD_DIR_MODULE_FILE);
            if module_file.is_file() {
                Some((module_file, None))
            } else {
                Some((dir.clone(), None))
            }
        }
        ModuleNode::Leaf { program, path } => {
            Some((PathBuf::from(utils::strip_line_suffix(path)), *program))
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Classic three-colour DFS cycle detection. Returns the first cycle found,
/// as the path from the gray node back to itself.
pub(crate) fn find_cycle(graph: &BTreeMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut colors: HashMap<&str, Color> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();
    for root in graph.keys() {
        if colors.get(root.as_str()).copied().unwrap_or(Color::White) == Color::White {
            if let Some(cycle) = visit(root, graph, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    graph: &'a BTreeMap<String, Vec<String>>,
    colors: &mut HashMap<&'a str, Color>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    colors.insert(node, Color::Gray);
    path.push(node);
    if let Some(neighbours) = graph.get(node) {
        for next in neighbours {
            match colors.get(next.as_str()).copied().unwrap_or(Color::White) {
                Color::White => {
                    if let Some(cycle) = visit(next, graph, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Gray => {
                    // cycle: slice of the path from `next` onward, plus
                    // `next` to close it
                    let start = path.iter().position(|n| *n == next.as_str()).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(next.clone());
                    return Some(cycle);
                }
                Color::Black => {}
            }
        }
    }
    path.pop();
    colors.insert(node, Color::Black);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(n, deps)| (n.to_string(), deps.iter().map(ToString::to_string).collect()))
            .collect()
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let g = graph(&[("a", &["b", "c"]), ("b", &["c"]), ("c", &[])]);
        assert_eq!(find_cycle(&g), None);
    }

    #[test]
    fn simple_cycle_is_reported_in_full() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let cycle = find_cycle(&g).unwrap();
        for node in ["a", "b", "c"] {
            assert!(cycle.contains(&node.to_string()), "{node} missing from {cycle:?}");
        }
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        let cycle = find_cycle(&g).unwrap();
        assert_eq!(cycle, vec!["a", "a"]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let g = graph(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])]);
        assert_eq!(find_cycle(&g), None);
    }

    #[test]
    fn reentrant_stdlib_resolution_reports_a_cycle() {
        let mut analyzer = crate::Analyzer::new(crate::AnalyzerConfig::new("/proj"));
        // simulate the outer resolve frame that re-entered us
        analyzer.currently_resolving.insert("Crypto.PGP".to_string());
        let resolution = analyzer.resolve_stdlib("Crypto.PGP");
        assert!(resolution.found);
        assert!(resolution.circular);
        assert_eq!(resolution.module.as_deref(), Some("Crypto.PGP"));
        // the simulated outer frame still owns its guard entry
        assert!(analyzer.currently_resolving.contains("Crypto.PGP"));
    }

    #[test]
    fn guard_is_released_on_every_exit_path() {
        let mut analyzer = crate::Analyzer::new(crate::AnalyzerConfig::new("/proj"));
        // not-found path
        let missing = analyzer.resolve_stdlib("Missing.Module");
        assert!(!missing.found);
        assert!(analyzer.currently_resolving.is_empty());
        // success path via a bootstrap singleton
        analyzer
            .runtime_mut()
            .register_singleton("Stdio", crate::runtime::Instance::default());
        let found = analyzer.resolve_stdlib("Stdio");
        assert!(found.found);
        assert!(analyzer.currently_resolving.is_empty());
        // cache-hit path
        let hit = analyzer.resolve_stdlib("Stdio");
        assert!(hit.found);
        assert!(analyzer.currently_resolving.is_empty());
    }

    #[test]
    fn import_cache_keys_distinguish_kind_and_origin() {
        let a = import_cache_key(ImportKind::Import, "X", Some(Path::new("/proj/a.pike")));
        let b = import_cache_key(ImportKind::Inherit, "X", Some(Path::new("/proj/a.pike")));
        let c = import_cache_key(ImportKind::Import, "X", Some(Path::new("/proj/b.pike")));
        let d = import_cache_key(ImportKind::Import, "X", None);
        assert!(a != b && a != c && a != d && b != c);
    }
}
