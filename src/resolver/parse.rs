//! Extraction of resolver-relevant data from Pike source text.

use crate::{
    lexer::{self, Token, TokenKind},
    symbols::{ImportEntry, ImportKind, ResolutionType},
};

/// Represents various information about a Pike source file the resolver
/// cares about: the directives it contains and the classes it declares.
#[derive(Clone, Debug, Default)]
pub struct PikeData {
    pub imports: Vec<ImportEntry>,
    pub class_names: Vec<String>,
}

impl PikeData {
    /// Extracts the useful data from a Pike source.
    ///
    /// Works off the token stream so directives inside strings and comments
    /// are never picked up.
    pub fn parse(content: &str) -> Self {
        let tokens = lexer::tokenize(content);
        Self::from_tokens(&tokens)
    }

    pub fn from_tokens(tokens: &[Token]) -> Self {
        let mut data = Self::default();
        let significant: Vec<&Token> = tokens.iter().filter(|t| !t.is_trivia()).collect();
        let mut statement_start = true;
        let mut i = 0;
        while i < significant.len() {
            let token = significant[i];
            match token.kind {
                TokenKind::Preprocessor => {
                    if let Some(entry) = parse_directive_line(token) {
                        data.imports.push(entry);
                    }
                    statement_start = true;
                    i += 1;
                }
                TokenKind::Identifier if statement_start && token.text == "import" => {
                    let (entry, next) = parse_keyword_statement(&significant, i, ImportKind::Import);
                    if let Some(entry) = entry {
                        data.imports.push(entry);
                    }
                    statement_start = true;
                    i = next;
                }
                TokenKind::Identifier if statement_start && token.text == "inherit" => {
                    let (entry, next) =
                        parse_keyword_statement(&significant, i, ImportKind::Inherit);
                    if let Some(entry) = entry {
                        data.imports.push(entry);
                    }
                    statement_start = true;
                    i = next;
                }
                TokenKind::Identifier if token.text == "class" => {
                    if let Some(next) = significant.get(i + 1) {
                        if next.kind == TokenKind::Identifier && !lexer::is_keyword(&next.text) {
                            data.class_names.push(next.text.clone());
                        }
                    }
                    statement_start = false;
                    i += 1;
                }
                TokenKind::Operator if matches!(token.text.as_str(), ";" | "{" | "}") => {
                    statement_start = true;
                    i += 1;
                }
                _ => {
                    statement_start = false;
                    i += 1;
                }
            }
        }
        data
    }
}

/// Convenience wrapper returning just the directive entries of `content`.
pub fn extract_imports(content: &str) -> Vec<ImportEntry> {
    PikeData::parse(content).imports
}

/// Parses one preprocessor line into an import entry, if it is a directive
/// the resolver handles.
fn parse_directive_line(token: &Token) -> Option<ImportEntry> {
    let line = token.text.trim();
    if let Some(rest) = strip_directive(line, "include") {
        let target = rest.trim();
        if target.is_empty() {
            return None;
        }
        return Some(ImportEntry::new(ImportKind::Include, target, token.line));
    }
    if let Some(rest) = strip_directive(line, "require") {
        return Some(parse_require(rest.trim(), token.line));
    }
    None
}

fn strip_directive<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix(name)?;
    // `#requirex` is not `#require`
    if rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(rest)
}

/// The three `#require` subsets the resolver handles; everything else is
/// recorded but skipped.
fn parse_require(target: &str, line: u32) -> ImportEntry {
    let mut entry = ImportEntry::new(ImportKind::Require, target, line);
    if let Some(literal) = string_literal(target) {
        entry.target_text = literal;
        entry.resolution_type = Some(ResolutionType::StringLiteral);
        return entry;
    }
    if let Some(ident) = constant_identifier(target) {
        entry.target_text = ident.to_string();
        entry.resolution_type = Some(ResolutionType::ConstantIdentifier);
        return entry;
    }
    entry.skip = true;
    entry
}

/// `"path"` with the quotes stripped, if the whole target is one literal.
fn string_literal(target: &str) -> Option<String> {
    let inner = target.strip_prefix('"')?.strip_suffix('"')?;
    if inner.contains('"') {
        return None;
    }
    Some(inner.to_string())
}

/// `constant(Ident)` / `constant(Ident.Sub)`, yielding the identifier.
fn constant_identifier(target: &str) -> Option<&str> {
    let inner = target.strip_prefix("constant")?.trim_start();
    let inner = inner.strip_prefix('(')?.strip_suffix(')')?.trim();
    let valid = !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    valid.then(|| inner)
}

/// Parses `import X.Y;` / `inherit X : alias;` starting at `start` (the
/// keyword). Returns the entry and the index just past the terminating `;`.
fn parse_keyword_statement(
    tokens: &[&Token],
    start: usize,
    kind: ImportKind,
) -> (Option<ImportEntry>, usize) {
    let line = tokens[start].line;
    let mut target = String::new();
    let mut alias = None;
    let mut in_alias = false;
    let mut i = start + 1;
    while i < tokens.len() {
        let token = tokens[i];
        match token.kind {
            TokenKind::Operator if token.text == ";" => {
                i += 1;
                break;
            }
            // `inherit X : alias;`
            TokenKind::Operator if token.text == ":" && kind == ImportKind::Inherit => {
                in_alias = true;
            }
            // a brace means we ran off the statement; bail out
            TokenKind::Operator if matches!(token.text.as_str(), "{" | "}") => {
                break;
            }
            _ => {
                if in_alias {
                    alias.get_or_insert_with(String::new).push_str(&token.text);
                } else {
                    target.push_str(&token.text);
                }
            }
        }
        i += 1;
    }
    if target.is_empty() {
        return (None, i);
    }
    let mut entry = ImportEntry::new(kind, target, line);
    entry.alias = alias;
    (Some(entry), i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn captures_keyword_statements() {
        let content = "import Crypto.RSA;\ninherit Protocols.HTTP.Query;\nint x;\n";
        let imports = extract_imports(content);
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].kind, ImportKind::Import);
        assert_eq!(imports[0].target_text, "Crypto.RSA");
        assert_eq!(imports[0].line, 1);
        assert_eq!(imports[1].kind, ImportKind::Inherit);
        assert_eq!(imports[1].target_text, "Protocols.HTTP.Query");
    }

    #[test]
    fn captures_inherit_alias() {
        let imports = extract_imports("inherit Stdio.File : base;\n");
        assert_eq!(imports[0].target_text, "Stdio.File");
        assert_eq!(imports[0].alias.as_deref(), Some("base"));
    }

    #[test]
    fn captures_include_with_delimiters() {
        let imports = extract_imports("#include \"local.h\"\n#include <system.h>\n");
        assert_eq!(imports[0].target_text, "\"local.h\"");
        assert_eq!(imports[1].target_text, "<system.h>");
        assert!(imports.iter().all(|i| i.kind == ImportKind::Include));
    }

    #[test]
    fn require_string_literal() {
        let imports = extract_imports("#require \"lib/helper.pike\"\n");
        let entry = &imports[0];
        assert_eq!(entry.kind, ImportKind::Require);
        assert_eq!(entry.target_text, "lib/helper.pike");
        assert_eq!(entry.resolution_type, Some(ResolutionType::StringLiteral));
        assert!(!entry.skip);
    }

    #[test]
    fn require_constant_identifier() {
        let imports = extract_imports("#require constant(Crypto.RSA)\n");
        let entry = &imports[0];
        assert_eq!(entry.target_text, "Crypto.RSA");
        assert_eq!(entry.resolution_type, Some(ResolutionType::ConstantIdentifier));
    }

    #[test]
    fn require_other_forms_are_skipped() {
        let imports = extract_imports("#require constant(A) && constant(B)\n");
        let entry = &imports[0];
        assert!(entry.skip);
        assert_eq!(entry.resolution_type, None);
    }

    #[test]
    fn directives_in_comments_and_strings_ignored() {
        let content = "// #include \"no.h\"\nstring s = \"#require nope\";\n/* #include <x> */\n";
        assert!(extract_imports(content).is_empty());
    }

    #[test]
    fn import_must_start_a_statement() {
        let content = "int import = 3;\nmy_import Crypto;\nimport Real.Module;\n";
        let imports = extract_imports(content);
        // `int import` uses import as a name mid-statement; only the last
        // line is a real statement
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].target_text, "Real.Module");
    }

    #[test]
    fn collects_class_names() {
        let data = PikeData::parse("class Foo {}\nprivate class Bar {\n  class Inner {}\n}\n");
        assert_eq!(data.class_names, vec!["Foo", "Bar", "Inner"]);
    }
}
