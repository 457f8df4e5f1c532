//! Analyzer configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default capacity of the compiled-program LRU store.
pub const DEFAULT_PROGRAM_CAPACITY: usize = 30;
/// Default capacity of the stdlib-module LRU store.
pub const DEFAULT_STDLIB_CAPACITY: usize = 50;
/// Default capacity of the import-resolution LRU store.
pub const DEFAULT_IMPORT_CAPACITY: usize = 100;
/// Default capacity (distinct paths) of the compilation cache.
pub const DEFAULT_COMPILATION_CAPACITY: usize = 100;

/// How many parent directories the inherit workspace sweep ascends.
pub const DEFAULT_INHERIT_WALK_DEPTH: usize = 5;

/// Module prefixes tried when resolving a bare `inherit` name against the
/// module system.
pub const DEFAULT_QUALIFICATION_PREFIXES: &[&str] =
    &["Protocols", "Tools", "Stdio", "Parser", "Sql", "Web", "Thread", "Gz", "Crypto"];

/// Host-runtime modules that exist as singletons before the analyzer starts.
/// Their programs must never be re-instantiated.
pub const DEFAULT_BOOTSTRAP_MODULES: &[&str] = &["Stdio", "String", "Array", "Mapping"];

/// Capacities, search paths and policy knobs for one [`crate::Analyzer`].
///
/// All state the analyzer holds is in memory; this is the entire persistent
/// configuration surface, supplied once at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// The workspace root. Dependency edges are only tracked for files below
    /// this directory.
    pub project_root: PathBuf,
    /// Roots searched for `#include <...>` targets.
    pub include_dirs: Vec<PathBuf>,
    pub program_capacity: usize,
    pub stdlib_capacity: usize,
    pub import_capacity: usize,
    pub compilation_capacity: usize,
    /// How many parents the inherit workspace sweep may ascend.
    pub inherit_walk_depth: usize,
    pub qualification_prefixes: Vec<String>,
    pub bootstrap_modules: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            include_dirs: Vec::new(),
            program_capacity: DEFAULT_PROGRAM_CAPACITY,
            stdlib_capacity: DEFAULT_STDLIB_CAPACITY,
            import_capacity: DEFAULT_IMPORT_CAPACITY,
            compilation_capacity: DEFAULT_COMPILATION_CAPACITY,
            inherit_walk_depth: DEFAULT_INHERIT_WALK_DEPTH,
            qualification_prefixes: DEFAULT_QUALIFICATION_PREFIXES
                .iter()
                .map(ToString::to_string)
                .collect(),
            bootstrap_modules: DEFAULT_BOOTSTRAP_MODULES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl AnalyzerConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self { project_root: project_root.into(), ..Default::default() }
    }

    pub fn with_include_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.include_dirs = dirs.into_iter().collect();
        self
    }

    pub fn with_program_capacity(mut self, capacity: usize) -> Self {
        self.program_capacity = capacity;
        self
    }

    pub fn with_stdlib_capacity(mut self, capacity: usize) -> Self {
        self.stdlib_capacity = capacity;
        self
    }

    pub fn with_import_capacity(mut self, capacity: usize) -> Self {
        self.import_capacity = capacity;
        self
    }

    pub fn with_compilation_capacity(mut self, capacity: usize) -> Self {
        self.compilation_capacity = capacity;
        self
    }

    pub fn with_bootstrap_modules(
        mut self,
        modules: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.bootstrap_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if `path` is inside the configured project root.
    pub fn is_project_path(&self, path: &Path) -> bool {
        path.starts_with(&self.project_root)
    }

    /// Returns true if the module is a bootstrap singleton whose program must
    /// not be re-instantiated.
    pub fn is_bootstrap_module(&self, name: &str) -> bool {
        self.bootstrap_modules.iter().any(|m| m == name)
    }
}
