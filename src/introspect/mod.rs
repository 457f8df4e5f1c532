//! Symbol introspection of compiled programs and runtime singletons.
//!
//! Two entry points share one private walker: [`Analyzer::handle_introspect`]
//! compiles source and walks the resulting program, while
//! [`Analyzer::introspect_object`] walks a bootstrap singleton that must not
//! be re-instantiated. Instantiation failure is an expected outcome for any
//! program with side effects in its constructor; it degrades to
//! inheritance-only output and never propagates.

mod signature;
pub use signature::{parse_function_type, FunctionSignature};

use crate::{
    cache,
    diagnostics::{Diagnostic, Position},
    resolver::{self, rewrite_relative_references},
    runtime::{ProgramId, Runtime, Value},
    symbols::{ImportKind, Symbol, SymbolKind},
    utils, Analyzer,
};
use serde::Serialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// One entry of a program's inherit chain, as reported to the editor layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InheritInfo {
    pub name: String,
    pub path: PathBuf,
}

/// The introspector's result for one source file or program.
#[derive(Clone, Debug, Default)]
pub struct IntrospectOutcome {
    pub success: bool,
    /// Set when compilation was skipped and only parser-level data is
    /// available.
    pub parser_only: bool,
    pub require_directive_skipped: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub symbols: Vec<Symbol>,
    pub inherits: Vec<InheritInfo>,
}

/// Result shape of `get_inherited`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct InheritedMembers {
    pub found: bool,
    pub members: Vec<Symbol>,
    pub inherit_count: usize,
}

impl<R: Runtime> Analyzer<R> {
    /// Compiles `code` and introspects the resulting program.
    ///
    /// Compilation is skipped entirely for sources carrying a `#require`
    /// directive outside a `.pmod` directory: resolving the requirement
    /// would pull expensive host-side module loading into the request and
    /// can deadlock against the analyzer's own resolution.
    pub fn handle_introspect(&mut self, code: &str, filename: &Path) -> IntrospectOutcome {
        let entries = resolver::parse::extract_imports(code);
        let in_pmod = utils::in_pmod_dir(filename);
        if !in_pmod && entries.iter().any(|e| e.kind == ImportKind::Require) {
            debug!(file = %filename.display(), "skipping compilation of #require source");
            return IntrospectOutcome {
                success: true,
                parser_only: true,
                require_directive_skipped: true,
                ..Default::default()
            };
        }

        // inside a .pmod directory relative references must be qualified
        // before the host compiler sees them
        let compiled_code = match utils::pmod_parent_module(filename) {
            Some(parent) => rewrite_relative_references(code, &parent),
            None => code.to_string(),
        };
        let compiler_path = PathBuf::from(utils::normalize_compiler_path(filename));

        let key = cache::make_cache_key(filename, self.documents.version(filename));
        let result = match self.compilations.get(&mut self.clock, filename, &key) {
            Some(hit) => hit,
            None => {
                let compiled = self.runtime.compile(&compiled_code, &compiler_path);
                self.compilations.put(&mut self.clock, filename, key, compiled)
            }
        };
        self.bank.put_program(&mut self.clock, filename.to_string_lossy(), result.clone());

        let mut outcome = match result.program {
            Some(program) => self.introspect_program(program),
            None => IntrospectOutcome::default(),
        };
        outcome.success = result.program.is_some();
        outcome.diagnostics = result.diagnostics.clone();
        // source-level parse supplies what runtime introspection cannot:
        // positions, modifiers and doc comments
        self.merge_parsed_source(&mut outcome.symbols, code, &filename.to_string_lossy());
        outcome
    }

    /// Walks a compiled program: safe instantiation, member classification,
    /// inheritance marking.
    pub fn introspect_program(&mut self, program: ProgramId) -> IntrospectOutcome {
        let own_path = self.runtime.program_path(program);
        let parents = self.runtime.inherits(program);
        let inherits: Vec<InheritInfo> = parents
            .iter()
            .map(|p| InheritInfo { name: module_name_of(&p.path), path: p.path.clone() })
            .collect();

        let instance = match self.runtime.instantiate(program) {
            Ok(instance) => instance,
            Err(err) => {
                // expected for constructors with side effects; degrade to
                // inheritance-only output
                debug!(%program, error = %err, "instantiation failed");
                let symbols = inherits
                    .iter()
                    .map(|info| {
                        Symbol::new(
                            info.name.clone(),
                            SymbolKind::Inherit,
                            Position::new(info.path.to_string_lossy(), 0),
                        )
                    })
                    .collect();
                return IntrospectOutcome {
                    success: true,
                    symbols,
                    inherits,
                    ..Default::default()
                };
            }
        };

        let mut symbols = self.classify_instance(&instance, own_path.as_deref());

        // symbol -> defining parent, found by safely instantiating each
        // parent and reading its indices
        let mut defined_by: HashMap<String, PathBuf> = HashMap::new();
        for parent in &parents {
            let Some(parent_program) = parent.program else { continue };
            let Ok(parent_instance) = self.runtime.instantiate(parent_program) else { continue };
            for name in parent_instance.indices() {
                defined_by.entry(name.to_string()).or_insert_with(|| parent.path.clone());
            }
        }
        for symbol in &mut symbols {
            if let Some(parent_path) = defined_by.get(&symbol.name) {
                if own_path.as_deref() != Some(parent_path.as_path()) {
                    symbol.inherited = true;
                    symbol.inherited_from =
                        parent_path.file_name().map(|n| n.to_string_lossy().into_owned());
                }
            }
        }

        if let Some(path) = &own_path {
            for symbol in &symbols {
                if symbol.kind == SymbolKind::Class {
                    self.class_index.insert(symbol.name.clone(), path.clone());
                }
            }
        }

        IntrospectOutcome { success: true, symbols, inherits, ..Default::default() }
    }

    /// Walks an already-instantiated bootstrap singleton. Identical to
    /// [`Self::introspect_program`] minus the instantiation step.
    pub fn introspect_object(&mut self, module: &str) -> Option<IntrospectOutcome> {
        let instance = self.runtime.singleton(module)?;
        let symbols = self.classify_instance(&instance, None);
        Some(IntrospectOutcome { success: true, symbols, ..Default::default() })
    }

    /// Classifies an instance's members into symbols. Functions get their
    /// canonical type string parsed into argument and return types with
    /// synthetic `argN` names.
    pub(crate) fn classify_instance(
        &self,
        instance: &crate::runtime::Instance,
        file: Option<&Path>,
    ) -> Vec<Symbol> {
        let file_name = file.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        instance
            .members
            .iter()
            .map(|(name, value)| {
                let position = Position::new(file_name.clone(), 0);
                match value {
                    Value::Function { type_string } => {
                        let mut symbol = Symbol::new(name, SymbolKind::Function, position);
                        symbol.r#type = Some(type_string.clone());
                        if let Some(sig) = parse_function_type(type_string) {
                            symbol.arg_names = Some(sig.synthetic_names());
                            symbol.arg_types = Some(sig.arg_types);
                            symbol.return_type = Some(sig.return_type);
                        }
                        symbol
                    }
                    Value::Program(_) => Symbol::new(name, SymbolKind::Class, position),
                    other => {
                        let mut symbol = Symbol::new(name, SymbolKind::Variable, position);
                        symbol.r#type = Some(other.type_name().to_string());
                        symbol
                    }
                }
            })
            .collect()
    }

    /// Overlays source-level parse data (positions, modifiers, docs) onto
    /// runtime-introspected symbols; with no runtime symbols at all, the
    /// parsed symbols stand alone.
    pub(crate) fn merge_parsed_source(
        &self,
        symbols: &mut Vec<Symbol>,
        code: &str,
        filename: &str,
    ) {
        let parsed = crate::parse::parse_source(code, filename);
        if symbols.is_empty() {
            *symbols = parsed.symbols;
            return;
        }
        let by_name: HashMap<&str, &Symbol> =
            parsed.symbols.iter().map(|s| (s.name.as_str(), s)).collect();
        for symbol in symbols.iter_mut() {
            if let Some(source) = by_name.get(symbol.name.as_str()) {
                symbol.position = source.position.clone();
                if symbol.documentation.is_none() {
                    symbol.documentation = source.documentation.clone();
                }
                if symbol.modifiers.is_empty() {
                    symbol.modifiers = source.modifiers.clone();
                }
            }
        }
    }

    /// Reads the module source behind `path` and overlays its parse onto
    /// `symbols`, so hover documentation survives introspection.
    pub(crate) fn merge_source_docs(&self, symbols: &mut Vec<Symbol>, path: &Path) {
        let Ok(content) = utils::read_source(path) else { return };
        self.merge_parsed_source(symbols, &content, &path.to_string_lossy());
    }

    /// Members a class pulls in through its inherit chain.
    pub fn get_inherited(&mut self, class: &str) -> InheritedMembers {
        let program = self.find_class_program(class);
        let Some(program) = program else {
            return InheritedMembers::default();
        };
        let outcome = self.introspect_program(program);
        InheritedMembers {
            found: true,
            inherit_count: outcome.inherits.len(),
            members: outcome.symbols.into_iter().filter(|s| s.inherited).collect(),
        }
    }

    /// Locates the program for a class name: module system first, then the
    /// class index filled by earlier parses and introspections.
    fn find_class_program(&mut self, class: &str) -> Option<ProgramId> {
        if let Some((path, program)) = self.resolve_module_path(class) {
            if let Some(program) = program {
                return Some(program);
            }
            return self.compile_path(&path);
        }
        let path = self.class_index.get(class)?.clone();
        self.compile_path(&path)
    }

    /// Compiles the file at `path` from disk, caching the result.
    pub(crate) fn compile_path(&mut self, path: &Path) -> Option<ProgramId> {
        let key = cache::make_cache_key(path, self.documents.version(path));
        if let Some(hit) = self.compilations.get(&mut self.clock, path, &key) {
            return hit.program;
        }
        let source = self.documents.content(path).ok()?;
        let compiled = self.runtime.compile(source.as_str(), path);
        let result = self.compilations.put(&mut self.clock, path, key, compiled);
        result.program
    }
}

/// `Foo` for `/lib/Foo.pike`, `Foo` for `/lib/Foo.pmod/module.pmod`'s parent.
fn module_name_of(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    if stem == "module" {
        if let Some(parent) = utils::pmod_parent_module(path) {
            return parent;
        }
    }
    stem
}
