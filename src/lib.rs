#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;
pub use error::{AnalyzerError, Result};

pub mod cache;
pub use cache::{make_cache_key, CompilationCache, CompilationResult, VersionKey};

pub mod config;
pub use config::AnalyzerConfig;

pub mod diagnostics;
pub use diagnostics::{Diagnostic, Position, Severity};

pub mod doc;
pub use doc::{parse_autodoc, DocBlock};

pub mod lexer;

pub mod parse;
pub use parse::ParsedFile;

pub mod introspect;
pub use introspect::IntrospectOutcome;

pub mod resolver;
pub use resolver::{Resolution, StdlibResolution};

pub mod runtime;
pub use runtime::{EmbeddedRuntime, Runtime};

pub mod sources;
pub use sources::{DocumentStore, Source, Sources};

pub mod symbols;
pub use symbols::{ImportEntry, ImportKind, Symbol, SymbolKind};

pub mod api;

pub mod utils;

use cache::{AccessClock, CacheBank, Store};
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

/// The analyzer core: one value owning every cache, counter and graph.
///
/// All state lives in memory and is serviced synchronously, one request at a
/// time, by the outer dispatch layer. The host runtime is a type parameter so
/// deployments can bridge to a live interpreter while the test suite and
/// preloading hosts use [`EmbeddedRuntime`].
#[derive(Debug)]
pub struct Analyzer<R: Runtime = EmbeddedRuntime> {
    pub config: AnalyzerConfig,
    pub(crate) runtime: R,
    /// The process-wide access counter every cache stamps from.
    pub(crate) clock: AccessClock,
    pub(crate) bank: CacheBank,
    pub(crate) compilations: CompilationCache,
    pub(crate) documents: DocumentStore,
    /// Classes the analyzer has seen, by name; consulted when resolving
    /// `inherit` targets.
    pub(crate) class_index: HashMap<String, PathBuf>,
    /// Reentrancy guard for stdlib resolution.
    pub(crate) currently_resolving: HashSet<String>,
}

impl Analyzer<EmbeddedRuntime> {
    /// Creates an analyzer backed by the in-memory runtime.
    pub fn new(config: AnalyzerConfig) -> Self {
        Self::with_runtime(config, EmbeddedRuntime::new())
    }
}

impl<R: Runtime> Analyzer<R> {
    pub fn with_runtime(config: AnalyzerConfig, runtime: R) -> Self {
        let bank =
            CacheBank::new(config.program_capacity, config.stdlib_capacity, config.import_capacity);
        let compilations =
            CompilationCache::new(config.project_root.clone(), config.compilation_capacity);
        Self {
            config,
            runtime,
            clock: AccessClock::new(),
            bank,
            compilations,
            documents: DocumentStore::new(),
            class_index: HashMap::new(),
            currently_resolving: HashSet::new(),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    /// The outer layer opened (or re-synced) an editor document.
    pub fn open_document(
        &mut self,
        path: impl Into<PathBuf>,
        content: impl Into<String>,
        version: i64,
    ) {
        self.documents.open(path, content, version);
    }

    pub fn close_document(&mut self, path: &Path) {
        self.documents.close(path);
    }

    /// A file changed on disk: drops every cached result that transitively
    /// depends on it and returns the affected paths so the outer layer can
    /// re-run diagnostics.
    pub fn file_changed(&mut self, path: &Path) -> Vec<PathBuf> {
        self.bank.invalidate(Store::Programs, &path.to_string_lossy());
        self.compilations.invalidate(path, true)
    }

    /// Wipes the compilation cache, keeping the dependency graph.
    pub fn invalidate_all(&mut self) {
        self.compilations.invalidate_all();
    }

    /// Wipes one LRU store, or all of them.
    pub fn clear_caches(&mut self, store: Option<Store>) {
        self.bank.clear(store);
    }

    pub fn cache_stats(&self) -> cache::CacheBankStats {
        self.bank.stats()
    }

    pub fn compilation_cache(&self) -> &CompilationCache {
        &self.compilations
    }

    /// Parses one source file, recording its classes for later `inherit`
    /// resolution.
    pub fn parse_file(&mut self, code: &str, filename: &Path) -> ParsedFile {
        let parsed = parse::parse_source(code, &filename.to_string_lossy());
        for symbol in &parsed.symbols {
            if symbol.kind == SymbolKind::Class {
                self.class_index.insert(symbol.name.clone(), filename.to_path_buf());
            }
        }
        parsed
    }
}
