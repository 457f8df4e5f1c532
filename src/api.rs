//! The request surface consumed by the outer JSON-RPC layer.
//!
//! Every operation takes a mapping of named arguments and returns either
//! `{"result": ...}` or `{"error": {"code": -32000, "message": ...}}`. Not
//! finding something, failing to compile and breaking a resolution cycle are
//! all structured *results*; the error envelope is reserved for faults the
//! caller cannot act on.

use crate::{
    diagnostics::Diagnostic,
    error::{AnalyzerError, Result},
    lexer::{self, TokenKind},
    parse,
    runtime::Runtime,
    symbols::{ImportEntry, ImportKind, Symbol, SymbolKind},
    Analyzer,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{collections::BTreeMap, path::PathBuf};

/// JSON-RPC error code for unforeseen faults.
pub const INTERNAL_ERROR_CODE: i64 = -32000;

/// Default recursion limit for waterfall symbol loading.
const DEFAULT_WATERFALL_DEPTH: u32 = 3;

#[derive(Debug, Deserialize)]
struct IntrospectParams {
    code: String,
    filename: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ResolveParams {
    module: String,
    #[serde(default, rename = "currentFile")]
    current_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ResolveStdlibParams {
    module: String,
}

#[derive(Debug, Deserialize)]
struct GetInheritedParams {
    class: String,
}

#[derive(Debug, Deserialize)]
struct ExtractImportsParams {
    code: String,
    #[serde(default)]
    current_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ResolveImportParams {
    import_type: ImportKind,
    target: String,
    #[serde(default)]
    current_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct CheckCircularParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    graph: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    filename: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct WaterfallParams {
    code: String,
    filename: PathBuf,
    #[serde(default)]
    max_depth: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ParseParams {
    code: String,
    filename: PathBuf,
    #[serde(default)]
    #[allow(dead_code)]
    line: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TokenizeParams {
    code: String,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchFile {
    code: String,
    filename: String,
}

#[derive(Debug, Deserialize)]
struct BatchParseParams {
    files: Vec<BatchFile>,
}

#[derive(Debug, Serialize)]
struct IntrospectResult {
    success: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    parser_only: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    require_directive_skipped: bool,
    diagnostics: Vec<Diagnostic>,
    symbols: Vec<Symbol>,
    functions: Vec<Symbol>,
    variables: Vec<Symbol>,
    classes: Vec<Symbol>,
    inherits: Vec<crate::introspect::InheritInfo>,
}

#[derive(Debug, Serialize)]
struct ExtractImportsResult {
    imports: Vec<ImportEntry>,
    dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ParseResult {
    symbols: Vec<Symbol>,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
struct TokenizeToken {
    text: String,
    line: u32,
    character: u32,
    file: String,
}

#[derive(Debug, Serialize)]
struct BatchParseEntry {
    filename: String,
    symbols: Vec<Symbol>,
    diagnostics: Vec<Diagnostic>,
}

impl<R: Runtime> Analyzer<R> {
    /// Handles one request, wrapping the outcome in the result/error
    /// envelope the JSON-RPC layer expects.
    pub fn handle_request(&mut self, method: &str, params: Value) -> Value {
        match self.dispatch(method, params) {
            Ok(result) => json!({ "result": result }),
            Err(err) => {
                warn!(method, error = %err, "request failed");
                json!({ "error": { "code": INTERNAL_ERROR_CODE, "message": err.to_string() } })
            }
        }
    }

    fn dispatch(&mut self, method: &str, params: Value) -> Result<Value> {
        trace!(method, "dispatching request");
        match method {
            "introspect" => {
                let p: IntrospectParams = parse_params(method, params)?;
                let outcome = self.handle_introspect(&p.code, &p.filename);
                let filter = |kind: SymbolKind| -> Vec<Symbol> {
                    outcome.symbols.iter().filter(|s| s.kind == kind).cloned().collect()
                };
                let result = IntrospectResult {
                    success: outcome.success,
                    parser_only: outcome.parser_only,
                    require_directive_skipped: outcome.require_directive_skipped,
                    functions: filter(SymbolKind::Function),
                    variables: filter(SymbolKind::Variable),
                    classes: filter(SymbolKind::Class),
                    diagnostics: outcome.diagnostics,
                    inherits: outcome.inherits,
                    symbols: outcome.symbols,
                };
                Ok(serde_json::to_value(result)?)
            }
            "resolve" => {
                let p: ResolveParams = parse_params(method, params)?;
                let resolution =
                    self.resolve_import(ImportKind::Import, &p.module, p.current_file.as_deref());
                Ok(json!({ "path": resolution.path, "exists": resolution.exists }))
            }
            "resolve_stdlib" => {
                let p: ResolveStdlibParams = parse_params(method, params)?;
                Ok(serde_json::to_value(self.resolve_stdlib(&p.module))?)
            }
            "get_inherited" => {
                let p: GetInheritedParams = parse_params(method, params)?;
                Ok(serde_json::to_value(self.get_inherited(&p.class))?)
            }
            "extract_imports" => {
                let p: ExtractImportsParams = parse_params(method, params)?;
                let (imports, dependencies) =
                    self.extract_imports_resolved(&p.code, p.current_file.as_deref());
                let result = ExtractImportsResult {
                    imports,
                    dependencies: dependencies
                        .into_iter()
                        .map(|p| p.to_string_lossy().into_owned())
                        .collect(),
                };
                Ok(serde_json::to_value(result)?)
            }
            "resolve_import" => {
                let p: ResolveImportParams = parse_params(method, params)?;
                let resolution =
                    self.resolve_import(p.import_type, &p.target, p.current_file.as_deref());
                Ok(serde_json::to_value(resolution)?)
            }
            "check_circular" => {
                let p: CheckCircularParams = parse_params(method, params)?;
                let report = if let Some(graph) = &p.graph {
                    Self::check_circular_graph(graph)
                } else if let (Some(code), Some(filename)) = (&p.code, &p.filename) {
                    self.check_circular_code(code, filename)
                } else {
                    return Err(AnalyzerError::msg(
                        "check_circular requires either a graph or code and filename",
                    ));
                };
                Ok(serde_json::to_value(report)?)
            }
            "get_waterfall_symbols" => {
                let p: WaterfallParams = parse_params(method, params)?;
                let depth = p.max_depth.unwrap_or(DEFAULT_WATERFALL_DEPTH);
                Ok(serde_json::to_value(self.waterfall_symbols(&p.code, &p.filename, depth))?)
            }
            "parse" => {
                let p: ParseParams = parse_params(method, params)?;
                let parsed = self.parse_file(&p.code, &p.filename);
                let result =
                    ParseResult { symbols: parsed.symbols, diagnostics: parsed.diagnostics };
                Ok(serde_json::to_value(result)?)
            }
            "tokenize" => {
                let p: TokenizeParams = parse_params(method, params)?;
                let file = p.filename.unwrap_or_default();
                let tokens: Vec<TokenizeToken> = lexer::tokenize(&p.code)
                    .into_iter()
                    .filter(|t| t.kind != TokenKind::Whitespace)
                    .map(|t| TokenizeToken {
                        text: t.text,
                        line: t.line,
                        character: t.character,
                        file: file.clone(),
                    })
                    .collect();
                Ok(json!({ "tokens": tokens }))
            }
            "batch_parse" => {
                let p: BatchParseParams = parse_params(method, params)?;
                let results: Vec<BatchParseEntry> = p
                    .files
                    .par_iter()
                    .map(|file| {
                        let parsed = parse::parse_source(&file.code, &file.filename);
                        BatchParseEntry {
                            filename: file.filename.clone(),
                            symbols: parsed.symbols,
                            diagnostics: parsed.diagnostics,
                        }
                    })
                    .collect();
                // class registration stays on the calling thread
                for (file, entry) in p.files.iter().zip(&results) {
                    for symbol in &entry.symbols {
                        if symbol.kind == SymbolKind::Class {
                            self.class_index
                                .insert(symbol.name.clone(), PathBuf::from(&file.filename));
                        }
                    }
                }
                let count = results.len();
                Ok(json!({ "results": results, "count": count }))
            }
            _ => Err(AnalyzerError::UnknownMethod(method.to_string())),
        }
    }
}

/// Deserializes the argument mapping of one operation.
fn parse_params<T: serde::de::DeserializeOwned>(method: &str, params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|err| AnalyzerError::invalid_params(method, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnalyzerConfig;

    fn analyzer() -> Analyzer {
        Analyzer::new(AnalyzerConfig::new("/proj"))
    }

    #[test]
    fn unknown_method_is_an_error() {
        let response = analyzer().handle_request("no_such_method", json!({}));
        assert_eq!(response["error"]["code"], json!(INTERNAL_ERROR_CODE));
        assert!(response["error"]["message"].as_str().unwrap().contains("no_such_method"));
    }

    #[test]
    fn invalid_params_are_an_error() {
        let response = analyzer().handle_request("introspect", json!({ "code": 42 }));
        assert_eq!(response["error"]["code"], json!(INTERNAL_ERROR_CODE));
    }

    #[test]
    fn parse_returns_symbols_and_diagnostics() {
        let response = analyzer().handle_request(
            "parse",
            json!({ "code": "int x;\nvoid f() {}\n", "filename": "/proj/a.pike" }),
        );
        let symbols = response["result"]["symbols"].as_array().unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0]["name"], "x");
        assert_eq!(symbols[1]["kind"], "function");
    }

    #[test]
    fn tokenize_reports_positions() {
        let response = analyzer().handle_request(
            "tokenize",
            json!({ "code": "int x;", "filename": "/proj/a.pike" }),
        );
        let tokens = response["result"]["tokens"].as_array().unwrap();
        assert_eq!(tokens[0]["text"], "int");
        assert_eq!(tokens[0]["line"], 1);
        assert_eq!(tokens[1]["character"], 4);
        assert_eq!(tokens[0]["file"], "/proj/a.pike");
    }

    #[test]
    fn batch_parse_counts_results() {
        let response = analyzer().handle_request(
            "batch_parse",
            json!({ "files": [
                { "code": "int a;", "filename": "/proj/a.pike" },
                { "code": "int b;", "filename": "/proj/b.pike" },
            ]}),
        );
        assert_eq!(response["result"]["count"], 2);
        let results = response["result"]["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn check_circular_accepts_explicit_graph() {
        let response = analyzer().handle_request(
            "check_circular",
            json!({ "graph": { "a": ["b"], "b": ["a"] } }),
        );
        assert_eq!(response["result"]["has_circular"], true);
        let cycle = response["result"]["cycle"].as_array().unwrap();
        assert!(cycle.len() >= 3);
    }

    #[test]
    fn introspect_reports_success_and_buckets() {
        let response = analyzer().handle_request(
            "introspect",
            json!({ "code": "int x;\nstring f(int a) { return \"\"; }\n", "filename": "/proj/a.pike" }),
        );
        let result = &response["result"];
        assert_eq!(result["success"], true);
        assert_eq!(result["functions"].as_array().unwrap().len(), 1);
        assert_eq!(result["variables"].as_array().unwrap().len(), 1);
    }
}
