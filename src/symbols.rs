//! Symbol and import-entry shapes shared by the parser, the introspector and
//! the request surface.

use crate::{diagnostics::Position, doc::DocBlock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    Constant,
    Typedef,
    Enum,
    EnumConstant,
    Inherit,
    Import,
    Include,
    Require,
    Module,
    Namespace,
}

impl SymbolKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Function => "function",
            Self::Class => "class",
            Self::Constant => "constant",
            Self::Typedef => "typedef",
            Self::Enum => "enum",
            Self::EnumConstant => "enum_constant",
            Self::Inherit => "inherit",
            Self::Import => "import",
            Self::Include => "include",
            Self::Require => "require",
            Self::Module => "module",
            Self::Namespace => "namespace",
        }
    }
}

/// A single named entity extracted from a source file or a compiled program.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub modifiers: BTreeSet<String>,
    pub position: Position,
    /// The value type for variables and constants.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inherited: bool,
    /// Basename of the file the inherited symbol was defined in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<DocBlock>,
    /// Shortest edge distance from the requesting file during waterfall
    /// loading; -1 is the requesting file itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_depth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance_file: Option<String>,
    /// Set when the defining file was revisited through an import cycle.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_circular: bool,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind, position: Position) -> Self {
        Self {
            name: name.into(),
            kind,
            modifiers: BTreeSet::new(),
            position,
            r#type: None,
            return_type: None,
            arg_names: None,
            arg_types: None,
            inherited: false,
            inherited_from: None,
            documentation: None,
            provenance_depth: None,
            provenance_file: None,
            is_circular: false,
        }
    }

    pub fn with_type(mut self, ty: impl Into<String>) -> Self {
        self.r#type = Some(ty.into());
        self
    }
}

/// The four directive kinds the resolver understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    Include,
    Import,
    Inherit,
    Require,
}

impl ImportKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Import => "import",
            Self::Inherit => "inherit",
            Self::Require => "require",
        }
    }
}

impl std::fmt::Display for ImportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a `#require` target should be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    /// `#require "path"` - the literal is a path.
    StringLiteral,
    /// `#require constant(Name)` - the identifier is a module name.
    ConstantIdentifier,
}

/// A directive occurrence extracted from source text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub kind: ImportKind,
    /// The target exactly as written, quotes and angle brackets included for
    /// `#include` so the resolver can pick the search strategy.
    pub target_text: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_type: Option<ResolutionType>,
    /// Set for `#require` forms the resolver does not attempt to resolve.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
    /// Local alias of an `inherit X : alias;` statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ImportEntry {
    pub fn new(kind: ImportKind, target_text: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            target_text: target_text.into(),
            line,
            resolution_type: None,
            skip: false,
            alias: None,
        }
    }
}
