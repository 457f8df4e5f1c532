//! In-memory [`Runtime`] implementation.
//!
//! Programs are "compiled" through the crate's own declaration parser: the
//! top-level symbols of the source become the instance members the
//! introspector enumerates. Module names, bootstrap singletons and
//! instantiation failures are registered up front, which makes this the
//! reference runtime for the test suite and for hosts that preload their
//! module tree instead of bridging to a live interpreter.

use super::{InheritRef, Instance, InstantiateError, ModuleNode, ProgramId, Runtime, Value};
use crate::{
    cache::CompilationResult,
    parse,
    symbols::{ImportKind, SymbolKind},
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

#[derive(Debug, Default)]
pub struct EmbeddedRuntime {
    programs: Vec<ProgramRecord>,
    by_path: HashMap<PathBuf, ProgramId>,
    modules: HashMap<String, ModuleNode>,
    singletons: HashMap<String, Instance>,
}

#[derive(Debug)]
struct ProgramRecord {
    path: PathBuf,
    members: Vec<(String, Value)>,
    inherits: Vec<InheritRef>,
    instantiation_error: Option<String>,
}

impl EmbeddedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a program with the given members, replacing any previous
    /// program at the same path.
    pub fn register_program(
        &mut self,
        path: impl AsRef<Path>,
        members: Vec<(String, Value)>,
    ) -> ProgramId {
        self.register_program_with_inherits(path, members, Vec::new())
    }

    pub fn register_program_with_inherits(
        &mut self,
        path: impl AsRef<Path>,
        members: Vec<(String, Value)>,
        inherits: Vec<InheritRef>,
    ) -> ProgramId {
        let path = path.as_ref().to_path_buf();
        let record =
            ProgramRecord { path: path.clone(), members, inherits, instantiation_error: None };
        match self.by_path.get(&path) {
            Some(&id) => {
                self.programs[id.0 as usize] = record;
                id
            }
            None => {
                let id = ProgramId(self.programs.len() as u64);
                self.programs.push(record);
                self.by_path.insert(path, id);
                id
            }
        }
    }

    /// Makes instantiating the program at `path` fail, the way programs with
    /// constructor side effects do in a live runtime.
    pub fn fail_instantiation(&mut self, path: impl AsRef<Path>, message: impl Into<String>) {
        let path = path.as_ref();
        let id = match self.by_path.get(path) {
            Some(&id) => id,
            None => self.register_program(path, Vec::new()),
        };
        self.programs[id.0 as usize].instantiation_error = Some(message.into());
    }

    /// Registers a module under its dotted name.
    pub fn register_module(&mut self, name: impl Into<String>, node: ModuleNode) {
        self.modules.insert(name.into(), node);
    }

    /// Compiles `source` and registers it as the module `name` in one step.
    pub fn register_source_module(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        source: &str,
    ) -> Option<ProgramId> {
        let path = path.as_ref().to_path_buf();
        let result = self.compile(source, &path);
        let program = result.program?;
        self.modules.insert(
            name.into(),
            ModuleNode::Leaf { program: Some(program), path: path.to_string_lossy().into_owned() },
        );
        Some(program)
    }

    /// Registers an already-instantiated bootstrap singleton.
    pub fn register_singleton(&mut self, name: impl Into<String>, instance: Instance) {
        self.singletons.insert(name.into(), instance);
    }

    fn record(&self, program: ProgramId) -> Option<&ProgramRecord> {
        self.programs.get(program.0 as usize)
    }

    fn program_at(&self, path: &Path) -> Option<ProgramId> {
        self.by_path.get(path).copied()
    }

    /// Resolves the target of one directive to a filesystem path, best
    /// effort. Used to report compilation dependencies.
    fn dependency_path(&mut self, kind: ImportKind, target: &str, origin: &Path) -> Option<PathBuf> {
        match kind {
            ImportKind::Include => {
                let bare = target.trim_matches(|c| matches!(c, '"' | '<' | '>'));
                origin.parent().map(|dir| dir.join(bare))
            }
            ImportKind::Import | ImportKind::Inherit | ImportKind::Require => {
                let node = self.resolve_module(target)?;
                node_path(&node)
            }
        }
    }
}

fn node_path(node: &ModuleNode) -> Option<PathBuf> {
    match node {
        ModuleNode::Join(parts) => parts.iter().find_map(node_path),
        ModuleNode::Dir(path) => Some(path.clone()),
        ModuleNode::Leaf { path, .. } => Some(PathBuf::from(crate::utils::strip_line_suffix(path))),
    }
}

/// Builds the canonical type string the host's type-of operator would print
/// for a function with the given signature.
fn function_type_string(arg_types: &[String], return_type: &str) -> String {
    format!("function({} : {})", arg_types.join(", "), return_type)
}

/// Maps a declared Pike type to the shallow runtime classification.
fn value_from_type(ty: &str) -> Value {
    let base = ty.split(['(', '|', '.']).next().unwrap_or(ty);
    match base {
        "int" => Value::Int,
        "float" => Value::Float,
        "string" => Value::String,
        "array" => Value::Array,
        "mapping" => Value::Mapping,
        "multiset" => Value::Multiset,
        "function" => Value::Function { type_string: ty.to_string() },
        _ => Value::Object,
    }
}

impl Runtime for EmbeddedRuntime {
    fn compile(&mut self, source: &str, filename: &Path) -> CompilationResult {
        let parsed = parse::parse_source(source, &filename.to_string_lossy());
        if !parsed.is_clean() {
            debug!(file = %filename.display(), "compilation failed");
            return CompilationResult {
                program: None,
                diagnostics: parsed.diagnostics,
                dependencies: Vec::new(),
            };
        }

        let mut dependencies = Vec::new();
        let mut inherits = Vec::new();
        for entry in &parsed.imports {
            if entry.skip {
                continue;
            }
            if let Some(dep) = self.dependency_path(entry.kind, &entry.target_text, filename) {
                if entry.kind == ImportKind::Inherit {
                    inherits.push(InheritRef { program: self.program_at(&dep), path: dep.clone() });
                }
                dependencies.push(dep);
            }
        }

        let mut members = Vec::new();
        for symbol in &parsed.symbols {
            let value = match symbol.kind {
                SymbolKind::Function => {
                    let args = symbol.arg_types.clone().unwrap_or_default();
                    let ret = symbol.return_type.as_deref().unwrap_or("mixed");
                    Value::Function { type_string: function_type_string(&args, ret) }
                }
                SymbolKind::Class => {
                    // nested programs share the file of their parent
                    let nested = PathBuf::from(format!(
                        "{}#{}",
                        filename.display(),
                        symbol.name
                    ));
                    Value::Program(self.register_program(nested, Vec::new()))
                }
                SymbolKind::Variable => {
                    value_from_type(symbol.r#type.as_deref().unwrap_or("mixed"))
                }
                SymbolKind::Constant | SymbolKind::EnumConstant => {
                    value_from_type(symbol.r#type.as_deref().unwrap_or("int"))
                }
                _ => continue,
            };
            members.push((symbol.name.clone(), value));
        }

        // inherited members become visible on the child instance
        let mut inherited_members = Vec::new();
        for parent in &inherits {
            if let Some(program) = parent.program {
                if let Some(record) = self.record(program) {
                    for (name, value) in &record.members {
                        if members.iter().all(|(n, _)| n != name) {
                            inherited_members.push((name.clone(), value.clone()));
                        }
                    }
                }
            }
        }
        members.extend(inherited_members);

        let program =
            self.register_program_with_inherits(filename, members, inherits);
        CompilationResult {
            program: Some(program),
            diagnostics: parsed.diagnostics,
            dependencies,
        }
    }

    fn resolve_module(&mut self, dotted: &str) -> Option<ModuleNode> {
        if let Some(node) = self.modules.get(dotted) {
            return Some(node.clone());
        }
        // descend into a registered directory module for dotted sub-names
        let (parent, leaf) = dotted.rsplit_once('.')?;
        let parent_node = self.resolve_module(parent)?;
        let dir = match parent_node {
            ModuleNode::Dir(dir) => dir,
            _ => return None,
        };
        let as_file = dir.join(format!("{leaf}.pike"));
        if as_file.is_file() {
            return Some(ModuleNode::Leaf {
                program: self.program_at(&as_file),
                path: as_file.to_string_lossy().into_owned(),
            });
        }
        let as_pmod = dir.join(format!("{leaf}.pmod"));
        if as_pmod.is_dir() {
            return Some(ModuleNode::Dir(as_pmod));
        }
        if as_pmod.is_file() {
            return Some(ModuleNode::Leaf {
                program: self.program_at(&as_pmod),
                path: as_pmod.to_string_lossy().into_owned(),
            });
        }
        None
    }

    fn instantiate(&self, program: ProgramId) -> Result<Instance, InstantiateError> {
        let record = self
            .record(program)
            .ok_or_else(|| InstantiateError(format!("unknown {program}")))?;
        match &record.instantiation_error {
            Some(message) => Err(InstantiateError(message.clone())),
            None => Ok(Instance::new(record.members.clone())),
        }
    }

    fn program_path(&self, program: ProgramId) -> Option<PathBuf> {
        self.record(program).map(|r| r.path.clone())
    }

    fn inherits(&self, program: ProgramId) -> Vec<InheritRef> {
        self.record(program).map(|r| r.inherits.clone()).unwrap_or_default()
    }

    fn singleton(&self, module: &str) -> Option<Instance> {
        self.singletons.get(module).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_exposes_declarations_as_members() {
        let mut rt = EmbeddedRuntime::new();
        let result = rt.compile(
            "int counter;\nstring greet(string who) { return who; }\nclass Helper {}\n",
            Path::new("/proj/a.pike"),
        );
        let program = result.program.unwrap();
        let instance = rt.instantiate(program).unwrap();
        let names: Vec<_> = instance.indices().collect();
        assert_eq!(names, ["counter", "greet", "Helper"]);
        let greet = &instance.members[1].1;
        assert_eq!(
            greet,
            &Value::Function { type_string: "function(string : string)".into() }
        );
        assert!(matches!(instance.members[2].1, Value::Program(_)));
    }

    #[test]
    fn compile_failure_reports_diagnostics() {
        let mut rt = EmbeddedRuntime::new();
        let result = rt.compile("void broken() {\n", Path::new("/proj/bad.pike"));
        assert!(result.program.is_none());
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn inherited_members_appear_on_child() {
        let mut rt = EmbeddedRuntime::new();
        rt.register_source_module(
            "Base",
            "/lib/Base.pike",
            "int base_field;\nvoid base_fn() {}\n",
        );
        let result =
            rt.compile("inherit Base;\nint own_field;\n", Path::new("/proj/child.pike"));
        let program = result.program.unwrap();
        let instance = rt.instantiate(program).unwrap();
        let names: Vec<_> = instance.indices().collect();
        assert!(names.contains(&"own_field"));
        assert!(names.contains(&"base_field"));
        assert!(names.contains(&"base_fn"));
        let inherits = rt.inherits(program);
        assert_eq!(inherits.len(), 1);
        assert_eq!(inherits[0].path, Path::new("/lib/Base.pike"));
    }

    #[test]
    fn instantiation_failure_is_scripted() {
        let mut rt = EmbeddedRuntime::new();
        let id = rt.register_program("/proj/sideeffect.pike", vec![("x".into(), Value::Int)]);
        rt.fail_instantiation("/proj/sideeffect.pike", "create() wrote to disk");
        let err = rt.instantiate(id).unwrap_err();
        assert!(err.to_string().contains("create() wrote to disk"));
    }

    #[test]
    fn singletons_are_preregistered() {
        let mut rt = EmbeddedRuntime::new();
        rt.register_singleton(
            "Stdio",
            Instance::new(vec![(
                "stdout".into(),
                Value::Object,
            )]),
        );
        assert!(rt.singleton("Stdio").is_some());
        assert!(rt.singleton("Nope").is_none());
    }

    #[test]
    fn dependencies_point_at_resolved_paths() {
        let mut rt = EmbeddedRuntime::new();
        rt.register_source_module("Base", "/proj/lib/Base.pike", "int b;\n");
        let result = rt.compile(
            "inherit Base;\n#include \"defs.h\"\n",
            Path::new("/proj/src/main.pike"),
        );
        assert!(result.dependencies.contains(&PathBuf::from("/proj/lib/Base.pike")));
        assert!(result.dependencies.contains(&PathBuf::from("/proj/src/defs.h")));
    }
}
