//! The seam to the host Pike runtime.
//!
//! The analyzer never talks to a live interpreter directly; everything it
//! needs from one - compiling source, resolving dotted module names,
//! instantiating programs and enumerating their members - goes through the
//! [`Runtime`] trait. [`EmbeddedRuntime`] is the in-memory implementation
//! backed by the crate's own source parser, used by the test suite and by
//! hosts that preload their module tree.

use crate::cache::CompilationResult;
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
};

mod embedded;
pub use embedded::EmbeddedRuntime;

/// Opaque handle to a program held by the host runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProgramId(pub u64);

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program#{}", self.0)
    }
}

/// Shallow classification of a runtime value, as deep as symbol extraction
/// needs to see.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int,
    Float,
    String,
    Array,
    Mapping,
    Multiset,
    Object,
    /// A callable together with the canonical type string the host's
    /// type-of operator yields, e.g. `function(int, string : void)`.
    Function { type_string: String },
    /// A nested program (class).
    Program(ProgramId),
}

impl Value {
    /// The Pike type name used for `variable` symbols.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Array => "array",
            Self::Mapping => "mapping",
            Self::Multiset => "multiset",
            Self::Object => "object",
            Self::Function { .. } => "function",
            Self::Program(_) => "program",
        }
    }
}

/// A live object's top-level names and values, enumerated in parallel.
#[derive(Clone, Debug, Default)]
pub struct Instance {
    pub members: Vec<(String, Value)>,
}

impl Instance {
    pub fn new(members: Vec<(String, Value)>) -> Self {
        Self { members }
    }

    /// The member names, the way the host's `indices()` reports them.
    pub fn indices(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(name, _)| name.as_str())
    }
}

/// One entry of a program's inherit list.
#[derive(Clone, Debug)]
pub struct InheritRef {
    pub program: Option<ProgramId>,
    /// Source path of the parent program.
    pub path: PathBuf,
}

/// What the host module system hands back for a dotted module name.
#[derive(Clone, Debug)]
pub enum ModuleNode {
    /// Modules merged from multiple source locations; constituents are
    /// searched in order until one yields a path.
    Join(Vec<ModuleNode>),
    /// A directory-backed module (`Foo.pmod/`).
    Dir(PathBuf),
    /// A plain object or program. The path is reported the way the host
    /// prints it and may carry a trailing `:<line>` suffix.
    Leaf { program: Option<ProgramId>, path: String },
}

impl ModuleNode {
    pub fn leaf(path: impl Into<String>) -> Self {
        Self::Leaf { program: None, path: path.into() }
    }
}

/// Error raised by [`Runtime::instantiate`]. Expected for any program with
/// side effects in its constructor or unresolved late binding; callers must
/// treat it as "no symbols available", never propagate it.
#[derive(Clone, Debug, thiserror::Error)]
#[error("instantiation failed: {0}")]
pub struct InstantiateError(pub String);

/// Operations the analyzer core consumes from the host runtime.
pub trait Runtime {
    /// Compiles `source` under the given filename. Compilation failure is a
    /// normal outcome: the result carries diagnostics and no program handle.
    fn compile(&mut self, source: &str, filename: &Path) -> CompilationResult;

    /// Resolves a dotted module name through the host module system.
    fn resolve_module(&mut self, dotted: &str) -> Option<ModuleNode>;

    /// Instantiates a compiled program so its members can be enumerated.
    fn instantiate(&self, program: ProgramId) -> Result<Instance, InstantiateError>;

    /// The source path the program was compiled from, if known.
    fn program_path(&self, program: ProgramId) -> Option<PathBuf>;

    /// The program's inherit list.
    fn inherits(&self, program: ProgramId) -> Vec<InheritRef>;

    /// Looks up an already-instantiated bootstrap singleton.
    fn singleton(&self, module: &str) -> Option<Instance>;
}
