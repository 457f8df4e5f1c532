//! Source-level declaration parser.
//!
//! Extracts the top-level symbols of a Pike file - variables, functions,
//! classes, constants, typedefs, enums - together with their attached `//!`
//! documentation blocks. This is the engine behind the `parse` and
//! `batch_parse` operations and behind [`crate::runtime::EmbeddedRuntime`]'s
//! compile step. It is deliberately tolerant: unparseable stretches are
//! skipped, not fatal.

use crate::{
    diagnostics::{Diagnostic, Position},
    doc::{self, DocBlock},
    lexer::{self, Token, TokenKind, MODIFIER_KEYWORDS, TYPE_KEYWORDS},
    resolver::parse::PikeData,
    symbols::{ImportEntry, ImportKind, Symbol, SymbolKind},
};
use std::collections::BTreeSet;

/// Everything the parser learned about one source file.
#[derive(Clone, Debug, Default)]
pub struct ParsedFile {
    pub symbols: Vec<Symbol>,
    pub imports: Vec<ImportEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedFile {
    /// True when nothing prevents the file from compiling.
    pub fn is_clean(&self) -> bool {
        !self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Parses `code` into symbols, import entries and diagnostics.
pub fn parse_source(code: &str, filename: &str) -> ParsedFile {
    let tokens = lexer::tokenize(code);
    let imports = PikeData::from_tokens(&tokens).imports;
    let mut parser = Parser::new(&tokens, filename);
    parser.run();
    let mut symbols = parser.symbols;
    let mut diagnostics = parser.diagnostics;

    // directives appear in the symbol list too, named by their target
    for entry in &imports {
        symbols.push(directive_symbol(entry, filename));
    }
    symbols.sort_by_key(|s| s.position.line);

    if parser.depth > 0 || parser.unbalanced {
        diagnostics.push(Diagnostic::error(
            "missing '}' at end of input",
            Position::new(filename, parser.last_line),
        ));
    }
    ParsedFile { symbols, imports, diagnostics }
}

fn directive_symbol(entry: &ImportEntry, filename: &str) -> Symbol {
    let kind = match entry.kind {
        ImportKind::Include => SymbolKind::Include,
        ImportKind::Import => SymbolKind::Import,
        ImportKind::Inherit => SymbolKind::Inherit,
        ImportKind::Require => SymbolKind::Require,
    };
    let name = entry
        .target_text
        .trim_matches(|c| matches!(c, '"' | '<' | '>'))
        .to_string();
    Symbol::new(name, kind, Position::new(filename, entry.line))
}

struct Parser<'a> {
    tokens: Vec<&'a Token>,
    pos: usize,
    filename: &'a str,
    depth: u32,
    last_line: u32,
    unbalanced: bool,
    pending_doc: Vec<&'a str>,
    symbols: Vec<Symbol>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], filename: &'a str) -> Self {
        // keep autodoc comments, drop the rest of the trivia
        let tokens = tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment))
            .collect();
        Self {
            tokens,
            pos: 0,
            filename,
            depth: 0,
            last_line: 1,
            unbalanced: false,
            pending_doc: Vec::new(),
            symbols: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn run(&mut self) {
        while let Some(token) = self.peek() {
            self.last_line = token.line;
            match token.kind {
                TokenKind::AutodocComment => {
                    self.pending_doc.push(token.text.as_str());
                    self.pos += 1;
                }
                TokenKind::Preprocessor => {
                    // directive entries are collected separately
                    self.pending_doc.clear();
                    self.pos += 1;
                }
                TokenKind::Operator => {
                    match token.text.as_str() {
                        "{" => self.depth += 1,
                        "}" => {
                            if self.depth == 0 {
                                self.diagnostics.push(Diagnostic::error(
                                    "unmatched '}'",
                                    Position::new(self.filename, token.line),
                                ));
                            } else {
                                self.depth -= 1;
                            }
                        }
                        _ => {}
                    }
                    self.pending_doc.clear();
                    self.pos += 1;
                }
                _ if self.depth == 0 => self.declaration(),
                _ => {
                    self.pos += 1;
                }
            }
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + ahead).copied()
    }

    fn at_text(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.text == text)
    }

    fn take_doc(&mut self) -> Option<DocBlock> {
        if self.pending_doc.is_empty() {
            return None;
        }
        let lines = std::mem::take(&mut self.pending_doc);
        let block = doc::parse_autodoc(&doc::strip_autodoc_lines(lines));
        (!block.is_empty()).then_some(block)
    }

    /// Parses one top-level declaration, emitting any symbols it defines.
    fn declaration(&mut self) {
        let doc = self.take_doc();
        let modifiers = self.take_modifiers();
        let Some(token) = self.peek() else { return };
        let line = token.line;

        match token.text.as_str() {
            // handled by the resolver extraction; skip to `;`
            "import" | "inherit" => {
                self.skip_statement();
            }
            "class" => self.class_decl(doc, modifiers, line),
            "enum" => self.enum_decl(doc, modifiers, line),
            "typedef" => self.typedef_decl(doc, modifiers, line),
            "constant" => self.constant_decl(doc, modifiers, line),
            _ => self.typed_decl(doc, modifiers, line),
        }
    }

    fn take_modifiers(&mut self) -> BTreeSet<String> {
        let mut modifiers = BTreeSet::new();
        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Identifier && MODIFIER_KEYWORDS.contains(&token.text.as_str())
            {
                modifiers.insert(token.text.clone());
                self.pos += 1;
            } else {
                break;
            }
        }
        modifiers
    }

    fn class_decl(&mut self, doc: Option<DocBlock>, modifiers: BTreeSet<String>, line: u32) {
        self.pos += 1; // class
        let Some(name) = self.identifier() else {
            self.skip_statement();
            return;
        };
        let mut symbol = Symbol::new(name, SymbolKind::Class, Position::new(self.filename, line));
        symbol.modifiers = modifiers;
        symbol.documentation = doc;
        self.symbols.push(symbol);
        // optional create-arguments, then the body
        if self.at_text("(") {
            self.skip_balanced("(", ")");
        }
        if self.at_text("{") {
            self.skip_balanced("{", "}");
        } else {
            self.skip_statement();
        }
    }

    fn enum_decl(&mut self, doc: Option<DocBlock>, modifiers: BTreeSet<String>, line: u32) {
        self.pos += 1; // enum
        let name = if self.peek().is_some_and(|t| t.kind == TokenKind::Identifier) {
            self.identifier()
        } else {
            None
        };
        if let Some(name) = &name {
            let mut symbol =
                Symbol::new(name, SymbolKind::Enum, Position::new(self.filename, line));
            symbol.modifiers = modifiers;
            symbol.documentation = doc;
            self.symbols.push(symbol);
        }
        if !self.at_text("{") {
            self.skip_statement();
            return;
        }
        self.pos += 1; // {
        // enumerators: `A`, `B = expr`, separated by commas
        while let Some(token) = self.peek() {
            match token.text.as_str() {
                "}" => {
                    self.pos += 1;
                    break;
                }
                "," => {
                    self.pos += 1;
                }
                _ if token.kind == TokenKind::Identifier => {
                    let line = token.line;
                    let const_name = token.text.clone();
                    self.pos += 1;
                    let mut symbol = Symbol::new(
                        const_name,
                        SymbolKind::EnumConstant,
                        Position::new(self.filename, line),
                    );
                    symbol.r#type = Some("int".into());
                    self.symbols.push(symbol);
                    // skip an optional `= expr` up to `,` or `}`
                    while let Some(t) = self.peek() {
                        if t.text == "," || t.text == "}" {
                            break;
                        }
                        if t.text == "(" || t.text == "{" || t.text == "[" {
                            let close = matching_close(&t.text);
                            self.skip_balanced(&t.text, close);
                        } else {
                            self.pos += 1;
                        }
                    }
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
        // optional trailing `;`
        if self.at_text(";") {
            self.pos += 1;
        }
    }

    fn typedef_decl(&mut self, doc: Option<DocBlock>, modifiers: BTreeSet<String>, line: u32) {
        self.pos += 1; // typedef
        let ty = self.parse_type();
        // the last identifier before `;` names the typedef
        let mut name = None;
        while let Some(token) = self.peek() {
            if token.text == ";" {
                self.pos += 1;
                break;
            }
            if token.kind == TokenKind::Identifier {
                name = Some(token.text.clone());
            }
            self.pos += 1;
        }
        if let Some(name) = name {
            let mut symbol =
                Symbol::new(name, SymbolKind::Typedef, Position::new(self.filename, line));
            symbol.modifiers = modifiers;
            symbol.documentation = doc;
            symbol.r#type = ty;
            self.symbols.push(symbol);
        }
    }

    fn constant_decl(&mut self, doc: Option<DocBlock>, modifiers: BTreeSet<String>, line: u32) {
        self.pos += 1; // constant
        let Some(name) = self.identifier() else {
            self.skip_statement();
            return;
        };
        let mut symbol =
            Symbol::new(name, SymbolKind::Constant, Position::new(self.filename, line));
        symbol.modifiers = modifiers;
        symbol.documentation = doc;
        if self.at_text("=") {
            self.pos += 1;
            symbol.r#type = self.peek().and_then(literal_type);
        }
        self.skip_statement();
        self.symbols.push(symbol);
    }

    /// `<type> name(...)` functions and `<type> name [, name2]` variables.
    fn typed_decl(&mut self, doc: Option<DocBlock>, modifiers: BTreeSet<String>, line: u32) {
        let Some(ty) = self.parse_type() else {
            // not a declaration; resynchronize at the next statement
            self.skip_statement();
            return;
        };
        let Some(name) = self.identifier() else {
            self.skip_statement();
            return;
        };

        if self.at_text("(") {
            let (arg_names, arg_types) = self.parse_parameters();
            let mut symbol =
                Symbol::new(name, SymbolKind::Function, Position::new(self.filename, line));
            symbol.modifiers = modifiers;
            symbol.documentation = doc;
            symbol.return_type = Some(ty);
            symbol.arg_names = Some(arg_names);
            symbol.arg_types = Some(arg_types);
            self.symbols.push(symbol);
            if self.at_text("{") {
                self.skip_balanced("{", "}");
            } else {
                self.skip_statement();
            }
            return;
        }

        // variable declaration, possibly a comma separated list
        let mut names = vec![name];
        loop {
            match self.peek().map(|t| t.text.as_str()) {
                Some(";") => {
                    self.pos += 1;
                    break;
                }
                Some(",") => {
                    self.pos += 1;
                    if let Some(next) = self.identifier() {
                        names.push(next);
                    }
                }
                Some("=") => {
                    // initializer expression, skipped with nesting respected
                    self.pos += 1;
                    self.skip_initializer();
                }
                Some(_) => {
                    self.pos += 1;
                }
                None => break,
            }
        }
        for name in names {
            let mut symbol =
                Symbol::new(name, SymbolKind::Variable, Position::new(self.filename, line));
            symbol.modifiers = modifiers.clone();
            symbol.documentation = doc.clone();
            symbol.r#type = Some(ty.clone());
            self.symbols.push(symbol);
        }
    }

    /// Consumes one type expression, returning its source form.
    ///
    /// Handles parameterized types (`mapping(string:int)`), dotted module
    /// types (`Stdio.File`) and unions (`int|string`).
    fn parse_type(&mut self) -> Option<String> {
        let token = self.peek()?;
        let is_type_start = token.kind == TokenKind::Identifier
            && (TYPE_KEYWORDS.contains(&token.text.as_str()) || !lexer::is_keyword(&token.text));
        if !is_type_start {
            return None;
        }
        let mut ty = token.text.clone();
        self.pos += 1;
        if self.at_text("(") {
            ty.push_str(&self.capture_balanced("(", ")"));
        }
        while self.at_text(".") && self.peek_at(1).is_some_and(|t| t.kind == TokenKind::Identifier)
        {
            self.pos += 1;
            ty.push('.');
            if let Some(part) = self.identifier() {
                ty.push_str(&part);
            }
        }
        while self.at_text("|") {
            self.pos += 1;
            if let Some(rest) = self.parse_type() {
                ty.push('|');
                ty.push_str(&rest);
            } else {
                break;
            }
        }
        Some(ty)
    }

    /// Parses a parenthesized parameter list, starting at `(`.
    fn parse_parameters(&mut self) -> (Vec<String>, Vec<String>) {
        let mut names = Vec::new();
        let mut types = Vec::new();
        self.pos += 1; // (
        let mut current: Vec<&Token> = Vec::new();
        let mut depth = 1u32;
        while let Some(token) = self.peek() {
            match token.text.as_str() {
                "(" | "{" | "[" => {
                    depth += 1;
                    current.push(self.tokens[self.pos]);
                    self.pos += 1;
                }
                ")" | "}" | "]" => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        break;
                    }
                    current.push(self.tokens[self.pos]);
                    self.pos += 1;
                }
                "," if depth == 1 => {
                    push_parameter(&mut names, &mut types, &current);
                    current.clear();
                    self.pos += 1;
                }
                _ => {
                    current.push(self.tokens[self.pos]);
                    self.pos += 1;
                }
            }
        }
        push_parameter(&mut names, &mut types, &current);
        // fill in synthetic names where the declaration had none
        for (index, name) in names.iter_mut().enumerate() {
            if name.is_empty() {
                *name = format!("arg{}", index + 1);
            }
        }
        (names, types)
    }

    fn identifier(&mut self) -> Option<String> {
        let token = self.peek()?;
        if token.kind == TokenKind::Identifier && !lexer::is_keyword(&token.text) {
            let name = token.text.clone();
            self.pos += 1;
            Some(name)
        } else {
            None
        }
    }

    /// Skips to just past the next `;`, balancing any nesting on the way.
    fn skip_statement(&mut self) {
        while let Some(token) = self.peek() {
            match token.text.as_str() {
                ";" => {
                    self.pos += 1;
                    return;
                }
                "(" | "{" | "[" => {
                    let open = token.text.clone();
                    self.skip_balanced(&open, matching_close(&open));
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Skips an initializer expression up to a top-level `,` or `;`.
    fn skip_initializer(&mut self) {
        while let Some(token) = self.peek() {
            match token.text.as_str() {
                ";" | "," => return,
                "(" | "{" | "[" => {
                    let open = token.text.clone();
                    self.skip_balanced(&open, matching_close(&open));
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Consumes a balanced bracket pair, `open` included. Hitting the end of
    /// input inside the pair marks the file unbalanced.
    fn skip_balanced(&mut self, open: &str, close: &str) {
        let mut depth = 0u32;
        while let Some(token) = self.peek() {
            if token.text == open {
                depth += 1;
            } else if token.text == close {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    self.pos += 1;
                    return;
                }
            }
            self.pos += 1;
        }
        self.unbalanced = true;
    }

    /// Like [`Self::skip_balanced`] but returns the consumed source text.
    fn capture_balanced(&mut self, open: &str, close: &str) -> String {
        let mut out = String::new();
        let mut depth = 0u32;
        while let Some(token) = self.peek() {
            out.push_str(&token.text);
            if token.text == open {
                depth += 1;
            } else if token.text == close {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    self.pos += 1;
                    return out;
                }
            }
            self.pos += 1;
        }
        out
    }
}

fn matching_close(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

/// Derives a parameter's `(name, type)` from its tokens.
fn push_parameter(names: &mut Vec<String>, types: &mut Vec<String>, tokens: &[&Token]) {
    let meaningful: Vec<&&Token> = tokens.iter().filter(|t| t.text != "...").collect();
    if meaningful.is_empty() {
        return;
    }
    // a lone `void` parameter list declares no parameters
    if meaningful.len() == 1 && meaningful[0].text == "void" {
        return;
    }
    let last = meaningful[meaningful.len() - 1];
    let named = meaningful.len() > 1
        && last.kind == TokenKind::Identifier
        && !lexer::is_keyword(&last.text)
        && meaningful[meaningful.len() - 2].text != "."
        && meaningful[meaningful.len() - 2].text != "|";
    if named {
        names.push(last.text.clone());
        types.push(join_tokens(&meaningful[..meaningful.len() - 1]));
    } else {
        names.push(String::new());
        types.push(join_tokens(&meaningful));
    }
}

fn join_tokens(tokens: &[&&Token]) -> String {
    tokens.iter().map(|t| t.text.as_str()).collect()
}

fn literal_type(token: &Token) -> Option<String> {
    match token.kind {
        TokenKind::Number => {
            if token.text.contains('.') || token.text.contains('e') || token.text.contains('E') {
                Some("float".into())
            } else {
                Some("int".into())
            }
        }
        TokenKind::String => Some("string".into()),
        TokenKind::Char => Some("int".into()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(code: &str) -> ParsedFile {
        parse_source(code, "/test/file.pike")
    }

    fn find<'a>(parsed: &'a ParsedFile, name: &str) -> &'a Symbol {
        parsed.symbols.iter().find(|s| s.name == name).unwrap_or_else(|| {
            panic!("symbol {name} not found in {:?}", parsed.symbols)
        })
    }

    #[test]
    fn parses_variables_and_functions() {
        let parsed = parse("int counter;\nstring greet(string who, int times) { return who; }\n");
        let counter = find(&parsed, "counter");
        assert_eq!(counter.kind, SymbolKind::Variable);
        assert_eq!(counter.r#type.as_deref(), Some("int"));
        let greet = find(&parsed, "greet");
        assert_eq!(greet.kind, SymbolKind::Function);
        assert_eq!(greet.return_type.as_deref(), Some("string"));
        assert_eq!(greet.arg_names.as_deref(), Some(&["who".to_string(), "times".into()][..]));
        assert_eq!(greet.arg_types.as_deref(), Some(&["string".to_string(), "int".into()][..]));
    }

    #[test]
    fn parses_parameterized_types() {
        let parsed = parse("mapping(string:int) counts = ([]);\narray(string) names;\n");
        assert_eq!(find(&parsed, "counts").r#type.as_deref(), Some("mapping(string:int)"));
        assert_eq!(find(&parsed, "names").r#type.as_deref(), Some("array(string)"));
    }

    #[test]
    fn parses_class_and_skips_body() {
        let parsed = parse(
            "class Connection {\n  int fd;\n  void close() {}\n}\nint after_class;\n",
        );
        assert_eq!(find(&parsed, "Connection").kind, SymbolKind::Class);
        assert_eq!(find(&parsed, "after_class").kind, SymbolKind::Variable);
        // class members are not top-level symbols
        assert!(parsed.symbols.iter().all(|s| s.name != "fd"));
    }

    #[test]
    fn parses_enum_with_constants() {
        let parsed = parse("enum Color {\n  RED,\n  GREEN = 2,\n  BLUE\n};\n");
        assert_eq!(find(&parsed, "Color").kind, SymbolKind::Enum);
        for name in ["RED", "GREEN", "BLUE"] {
            assert_eq!(find(&parsed, name).kind, SymbolKind::EnumConstant);
        }
    }

    #[test]
    fn parses_constants_and_typedefs() {
        let parsed = parse("constant VERSION = \"1.0\";\ntypedef mapping(string:int) CountMap;\n");
        let version = find(&parsed, "VERSION");
        assert_eq!(version.kind, SymbolKind::Constant);
        assert_eq!(version.r#type.as_deref(), Some("string"));
        let typedef = find(&parsed, "CountMap");
        assert_eq!(typedef.kind, SymbolKind::Typedef);
        assert_eq!(typedef.r#type.as_deref(), Some("mapping(string:int)"));
    }

    #[test]
    fn attaches_documentation() {
        let code = "//! Says hello.\n//! @param who Greeting target\nvoid hello(string who) {}\n";
        let parsed = parse(code);
        let hello = find(&parsed, "hello");
        let doc = hello.documentation.as_ref().unwrap();
        assert_eq!(doc.text, "Says hello.");
        assert_eq!(doc.param_order, vec!["who"]);
    }

    #[test]
    fn records_modifiers() {
        let parsed = parse("private static int hidden;\n");
        let hidden = find(&parsed, "hidden");
        assert!(hidden.modifiers.contains("private"));
        assert!(hidden.modifiers.contains("static"));
    }

    #[test]
    fn lone_void_parameter_means_no_args() {
        let parsed = parse("int run(void) { return 1; }\n");
        let run = find(&parsed, "run");
        assert_eq!(run.arg_names.as_deref(), Some(&[][..]));
    }

    #[test]
    fn directives_become_symbols() {
        let parsed = parse("#include \"local.h\"\nimport Crypto.RSA;\ninherit Base;\n");
        assert_eq!(find(&parsed, "local.h").kind, SymbolKind::Include);
        assert_eq!(find(&parsed, "Crypto.RSA").kind, SymbolKind::Import);
        assert_eq!(find(&parsed, "Base").kind, SymbolKind::Inherit);
        assert_eq!(parsed.imports.len(), 3);
    }

    #[test]
    fn unbalanced_braces_produce_diagnostics() {
        let parsed = parse("void broken() {\n  if (1) {\n}\n");
        assert!(!parsed.is_clean());
        assert!(parsed.diagnostics[0].message.contains("missing '}'"));
    }

    #[test]
    fn comma_separated_variables() {
        let parsed = parse("int a, b, c;\n");
        for name in ["a", "b", "c"] {
            assert_eq!(find(&parsed, name).kind, SymbolKind::Variable);
        }
    }

    #[test]
    fn multiline_initializers_do_not_confuse_depth() {
        let code = "mapping defaults = ([\n  \"a\": 1,\n]);\nint after;\n";
        let parsed = parse(code);
        assert!(find(&parsed, "after").kind == SymbolKind::Variable);
        assert!(parsed.is_clean());
    }
}
