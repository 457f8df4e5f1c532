//! Caching of compilation results and the dependency graph driving
//! invalidation.
//!
//! The compilation cache is a nested `path -> version key -> result` map.
//! Nesting keeps invalidation by path O(1) no matter how many versions of an
//! open document have been observed; a flat `(path, version)` key space could
//! not purge those cheaply. Alongside the nested map lives a bidirectional
//! dependency graph over interned paths, which makes "this file changed,
//! which results are now stale" a single reverse-edge walk.

use crate::{
    diagnostics::Diagnostic,
    resolver::{Resolution, StdlibModule},
    runtime::ProgramId,
    utils,
};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

mod lru;
pub use lru::{AccessClock, LruStore, Store, StoreStats};

/// Fraction of the compilation cache evicted in one batch when full, as a
/// divisor: capacity / 10, floored, at least one entry.
const BATCH_EVICTION_DIVISOR: usize = 10;

/// Discriminates two contents of the same path.
///
/// Open documents use the editor-assigned monotonic version (`LSP:<n>`),
/// everything else a filesystem stat signature (`FS:<mtime>\0<size>`). The
/// NUL separator keeps drive-letter paths with colons unambiguous on
/// Windows. The empty key is the "missing file" sentinel and never matches a
/// stored entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VersionKey(String);

impl VersionKey {
    /// Key for an open document with an editor-assigned version.
    pub fn lsp(version: i64) -> Self {
        Self(format!("LSP:{version}"))
    }

    /// Key derived from a filesystem stat signature.
    pub fn fs(mtime: u64, size: u64) -> Self {
        Self(format!("FS:{mtime}\0{size}"))
    }

    /// The sentinel for a file that does not exist; treated as an immediate
    /// miss everywhere.
    pub fn missing() -> Self {
        Self(String::new())
    }

    pub fn is_missing(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the version key for `path`.
///
/// An editor-supplied version wins; otherwise the file is stat'ed. A file
/// that cannot be stat'ed yields the missing sentinel.
pub fn make_cache_key(path: &Path, lsp_version: Option<i64>) -> VersionKey {
    if let Some(version) = lsp_version {
        return VersionKey::lsp(version);
    }
    match utils::stat_signature(path) {
        Ok((mtime, size)) => VersionKey::fs(mtime, size),
        Err(_) => VersionKey::missing(),
    }
}

/// The outcome of compiling one source file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompilationResult {
    /// Handle to the compiled program inside the host runtime. `None` when
    /// compilation failed or was skipped.
    pub program: Option<ProgramId>,
    pub diagnostics: Vec<Diagnostic>,
    /// Absolute paths discovered during compilation. Only those within the
    /// project root end up as graph edges.
    pub dependencies: Vec<PathBuf>,
}

impl CompilationResult {
    pub fn succeeded(&self) -> bool {
        self.program.is_some()
    }
}

/// Interned path id. All graph edges are by id; no path is stored twice.
pub type PathId = usize;

/// Bidirectional dependency graph over interned paths.
///
/// `forward[p]` holds what `p` imports/inherits/includes, `reverse[d]` holds
/// who depends on `d`. The two sides are kept mutually inverse by
/// construction: every mutation updates both within the same call.
#[derive(Debug, Default)]
pub struct DepGraph {
    indices: HashMap<PathBuf, PathId>,
    paths: Vec<PathBuf>,
    forward: Vec<HashSet<PathId>>,
    reverse: Vec<HashSet<PathId>>,
}

impl DepGraph {
    fn intern(&mut self, path: &Path) -> PathId {
        if let Some(&id) = self.indices.get(path) {
            return id;
        }
        let id = self.paths.len();
        self.indices.insert(path.to_path_buf(), id);
        self.paths.push(path.to_path_buf());
        self.forward.push(HashSet::new());
        self.reverse.push(HashSet::new());
        id
    }

    fn lookup(&self, path: &Path) -> Option<PathId> {
        self.indices.get(path).copied()
    }

    /// Replaces the forward edges of `path`. Old edges are removed first so
    /// re-puts with different dependencies never accumulate stale reverse
    /// bits.
    pub fn set_edges(&mut self, path: &Path, deps: impl IntoIterator<Item = PathBuf>) {
        let id = self.intern(path);
        self.clear_forward(id);
        let dep_ids: HashSet<PathId> =
            deps.into_iter().filter(|d| d != path).map(|d| self.intern(&d)).collect();
        for &dep in &dep_ids {
            self.reverse[dep].insert(id);
        }
        self.forward[id] = dep_ids;
    }

    /// Drops all forward edges of `path` together with their reverse bits.
    pub fn remove_edges(&mut self, path: &Path) {
        if let Some(id) = self.lookup(path) {
            self.clear_forward(id);
        }
    }

    fn clear_forward(&mut self, id: PathId) {
        let old = std::mem::take(&mut self.forward[id]);
        for dep in old {
            self.reverse[dep].remove(&id);
        }
    }

    /// What `path` imports.
    pub fn imports(&self, path: &Path) -> Vec<&Path> {
        self.lookup(path)
            .map(|id| self.forward[id].iter().map(|&d| self.paths[d].as_path()).collect())
            .unwrap_or_default()
    }

    /// Who depends on `path`.
    pub fn importers(&self, path: &Path) -> Vec<&Path> {
        self.lookup(path)
            .map(|id| self.reverse[id].iter().map(|&d| self.paths[d].as_path()).collect())
            .unwrap_or_default()
    }

    /// Number of interned paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Checks the mutual-inverse invariant between the two edge maps.
    pub fn is_consistent(&self) -> bool {
        self.forward.iter().enumerate().all(|(p, deps)| {
            deps.iter().all(|&d| self.reverse[d].contains(&p))
        }) && self
            .reverse
            .iter()
            .enumerate()
            .all(|(d, users)| users.iter().all(|&p| self.forward[p].contains(&d)))
    }
}

#[derive(Debug)]
struct PathEntry {
    versions: BTreeMap<VersionKey, Arc<CompilationResult>>,
    last_access: u64,
}

/// Path+version keyed cache of compilation results with transitive
/// invalidation.
#[derive(Debug)]
pub struct CompilationCache {
    capacity: usize,
    project_root: PathBuf,
    entries: HashMap<PathBuf, PathEntry>,
    graph: DepGraph,
}

impl CompilationCache {
    pub fn new(project_root: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            capacity,
            project_root: project_root.into(),
            entries: HashMap::new(),
            graph: DepGraph::default(),
        }
    }

    /// Number of distinct paths currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    /// Looks up the result for `(path, key)`. Touching a cached path
    /// refreshes its access stamp whether or not the exact version is
    /// present; reads and writes share one recency discipline.
    pub fn get(
        &mut self,
        clock: &mut AccessClock,
        path: &Path,
        key: &VersionKey,
    ) -> Option<Arc<CompilationResult>> {
        if key.is_missing() {
            return None;
        }
        let entry = self.entries.get_mut(path)?;
        entry.last_access = clock.tick();
        let hit = entry.versions.get(key).cloned();
        trace!(
            path = %path.display(),
            key = %key,
            hit = hit.is_some(),
            "compilation cache lookup"
        );
        hit
    }

    /// Caches `result` under `(path, key)` and updates the dependency graph
    /// from `result.dependencies`.
    ///
    /// If the cache is full and `path` is new, the ten percent of paths with
    /// the smallest access stamps (floored, at least one) are evicted first
    /// and their dependency edges released.
    pub fn put(
        &mut self,
        clock: &mut AccessClock,
        path: &Path,
        key: VersionKey,
        result: CompilationResult,
    ) -> Arc<CompilationResult> {
        let result = Arc::new(result);
        if key.is_missing() {
            // a missing-file sentinel never matches a get; don't waste a slot
            return result;
        }
        if self.capacity > 0 && self.entries.len() >= self.capacity && !self.entries.contains_key(path)
        {
            self.evict_batch();
        }
        self.update_edges(path, &result.dependencies);
        let entry = self.entries.entry(path.to_path_buf()).or_insert_with(|| PathEntry {
            versions: BTreeMap::new(),
            last_access: 0,
        });
        entry.last_access = clock.tick();
        entry.versions.insert(key, result.clone());
        result
    }

    /// Rewrites the forward edges of `path`, keeping only dependencies below
    /// the project root: external and stdlib files never change during a
    /// session, so edges for them are pure overhead.
    fn update_edges(&mut self, path: &Path, deps: &[PathBuf]) {
        let filtered =
            deps.iter().filter(|d| utils::is_within(&self.project_root, d)).cloned().collect::<Vec<_>>();
        self.graph.set_edges(path, filtered);
    }

    fn evict_batch(&mut self) {
        let count = (self.capacity / BATCH_EVICTION_DIVISOR).max(1);
        let mut by_age: Vec<(u64, PathBuf)> =
            self.entries.iter().map(|(p, e)| (e.last_access, p.clone())).collect();
        by_age.sort();
        for (_, path) in by_age.into_iter().take(count) {
            debug!(path = %path.display(), "batch-evicting compilation cache entry");
            self.entries.remove(&path);
            self.graph.remove_edges(&path);
        }
    }

    /// Invalidates `path`.
    ///
    /// Non-transitive: drops every version entry for the path, leaving the
    /// dependency graph alone. Transitive: walks the reverse edges
    /// breadth-first, dropping each visited node's cache entry and forward
    /// edges, and returns every visited path so the outer layer can re-run
    /// diagnostics.
    pub fn invalidate(&mut self, path: &Path, transitive: bool) -> Vec<PathBuf> {
        if !transitive {
            return match self.entries.remove(path) {
                Some(_) => vec![path.to_path_buf()],
                None => Vec::new(),
            };
        }

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(path.to_path_buf());
        visited.insert(path.to_path_buf());
        while let Some(current) = queue.pop_front() {
            self.entries.remove(&current);
            let dependents: Vec<PathBuf> =
                self.graph.importers(&current).into_iter().map(Path::to_path_buf).collect();
            self.graph.remove_edges(&current);
            for dependent in dependents {
                if visited.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
            order.push(current);
        }
        debug!(start = %path.display(), count = order.len(), "transitive invalidation");
        order
    }

    /// Wipes all cached results. The dependency graph is preserved to avoid
    /// the re-discovery cost on the next compile round.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }
}

/// The three LRU stores of the analyzer plus the import-mtime sidecar.
#[derive(Debug)]
pub struct CacheBank {
    programs: LruStore<Arc<CompilationResult>>,
    stdlib: LruStore<Arc<StdlibModule>>,
    imports: LruStore<Resolution>,
    import_mtimes: HashMap<String, u64>,
}

/// Snapshot of all per-store statistics.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct CacheBankStats {
    pub programs: StoreStats,
    pub stdlib: StoreStats,
    pub imports: StoreStats,
}

impl CacheBank {
    pub fn new(program_capacity: usize, stdlib_capacity: usize, import_capacity: usize) -> Self {
        Self {
            programs: LruStore::new(Store::Programs, program_capacity),
            stdlib: LruStore::new(Store::Stdlib, stdlib_capacity),
            imports: LruStore::new(Store::Imports, import_capacity),
            import_mtimes: HashMap::new(),
        }
    }

    pub fn get_program(
        &mut self,
        clock: &mut AccessClock,
        key: &str,
    ) -> Option<Arc<CompilationResult>> {
        self.programs.get(clock, key).cloned()
    }

    pub fn put_program(
        &mut self,
        clock: &mut AccessClock,
        key: impl Into<String>,
        value: Arc<CompilationResult>,
    ) {
        self.programs.put(clock, key, value);
    }

    pub fn get_stdlib(&mut self, clock: &mut AccessClock, key: &str) -> Option<Arc<StdlibModule>> {
        self.stdlib.get(clock, key).cloned()
    }

    pub fn put_stdlib(
        &mut self,
        clock: &mut AccessClock,
        key: impl Into<String>,
        value: Arc<StdlibModule>,
    ) {
        self.stdlib.put(clock, key, value);
    }

    /// The stored path for an import key, without touching statistics or
    /// recency. Lets the caller stat the right file before the validated
    /// lookup.
    pub fn peek_import_path(&self, key: &str) -> Option<std::path::PathBuf> {
        self.imports.peek(key).map(|r| r.path.clone())
    }

    /// Looks up a cached import resolution.
    ///
    /// When the caller knows the target's current mtime, a stored entry with
    /// an older sidecar mtime is stale: it is invalidated as a side effect
    /// and the lookup misses.
    pub fn get_import(
        &mut self,
        clock: &mut AccessClock,
        key: &str,
        current_mtime: Option<u64>,
    ) -> Option<Resolution> {
        if let (Some(current), Some(&stored)) = (current_mtime, self.import_mtimes.get(key)) {
            if current > stored {
                trace!(key, current, stored, "import cache entry stale, invalidating");
                self.imports.invalidate(key);
                self.import_mtimes.remove(key);
            }
        }
        self.imports.get(clock, key).cloned()
    }

    /// Caches an import resolution, remembering the target's mtime for
    /// staleness checks.
    pub fn put_import(&mut self, clock: &mut AccessClock, key: impl Into<String>, value: Resolution) {
        let key = key.into();
        match value.mtime {
            Some(mtime) => {
                self.import_mtimes.insert(key.clone(), mtime);
            }
            None => {
                self.import_mtimes.remove(&key);
            }
        }
        self.imports.put(clock, key, value);
    }

    /// Removes an entry from the given store. For the import store the
    /// sidecar mtime is dropped as well.
    pub fn invalidate(&mut self, store: Store, key: &str) {
        match store {
            Store::Programs => {
                self.programs.invalidate(key);
            }
            Store::Stdlib => {
                self.stdlib.invalidate(key);
            }
            Store::Imports => {
                self.imports.invalidate(key);
                self.import_mtimes.remove(key);
            }
        }
    }

    /// Wipes one store, or all of them. Statistics are preserved.
    pub fn clear(&mut self, store: Option<Store>) {
        match store {
            Some(Store::Programs) => self.programs.clear(),
            Some(Store::Stdlib) => self.stdlib.clear(),
            Some(Store::Imports) => {
                self.imports.clear();
                self.import_mtimes.clear();
            }
            None => {
                self.programs.clear();
                self.stdlib.clear();
                self.imports.clear();
                self.import_mtimes.clear();
            }
        }
    }

    pub fn stats(&self) -> CacheBankStats {
        CacheBankStats {
            programs: self.programs.stats(),
            stdlib: self.stdlib.stats(),
            imports: self.imports.stats(),
        }
    }

    pub fn clear_stats(&mut self) {
        self.programs.clear_stats();
        self.stdlib.clear_stats();
        self.imports.clear_stats();
    }
}
