//! A small Pike tokenizer.
//!
//! Directive extraction and relative-reference rewriting must respect string
//! and comment boundaries, so both are built on this token stream rather than
//! on regexes. The stream is lossless: concatenating the `text` of every
//! token reproduces the input byte for byte, which is what makes token-level
//! source rewriting safe.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    /// `// ...` up to the end of line.
    LineComment,
    /// `//! ...` autodoc line, significant for documentation extraction.
    AutodocComment,
    /// `/* ... */`, possibly spanning lines.
    BlockComment,
    /// A whole preprocessor line including continuations, e.g. `#include
    /// "foo.h"`. Always starts at the beginning of a (logical) line.
    Preprocessor,
    /// Double quoted string literal, escapes preserved verbatim.
    String,
    /// Character literal such as `'a'` or `'\n'`.
    Char,
    Number,
    Identifier,
    /// Punctuation and operators, one token per operator with maximal munch.
    Operator,
}

/// A single token with its position. `line` is 1-based, `character` is the
/// 0-based column of the token's first byte.
#[derive(Clone, Debug, Serialize)]
pub struct Token {
    #[serde(skip)]
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub character: u32,
}

impl Token {
    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace
                | TokenKind::LineComment
                | TokenKind::BlockComment
                | TokenKind::AutodocComment
        )
    }
}

/// Multi-character operators, longest first so maximal munch falls out of the
/// match order.
const OPERATORS: &[&str] = &[
    ">>=", "<<=", "...", "->", "::", "..", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>",
];

/// Pike keywords the parser and the rewriter care about.
pub const KEYWORDS: &[&str] = &[
    "array", "break", "case", "catch", "class", "constant", "continue", "default", "do", "else",
    "enum", "final", "float", "for", "foreach", "function", "gauge", "if", "import", "inherit",
    "int", "lambda", "local", "mapping", "mixed", "multiset", "object", "optional", "private",
    "program", "protected", "public", "return", "sscanf", "static", "string", "switch", "typedef",
    "typeof", "variant", "void", "while",
];

pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}

/// Type keywords that can open a declaration.
pub const TYPE_KEYWORDS: &[&str] = &[
    "array", "float", "function", "int", "mapping", "mixed", "multiset", "object", "program",
    "string", "void",
];

/// Declaration modifiers.
pub const MODIFIER_KEYWORDS: &[&str] =
    &["final", "local", "optional", "private", "protected", "public", "static", "variant"];

/// Tokenizes the given Pike source.
///
/// The lexer is error tolerant: unterminated strings end at the newline and
/// unterminated block comments run to the end of input, mirroring how the
/// host tokenizer recovers. It never fails.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    character: u32,
    /// True until a non-trivia token is produced on the current line; a `#`
    /// only opens a preprocessor directive at the start of a line.
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            character: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            let start = self.pos;
            let b = self.bytes[start];
            let kind = match b {
                b' ' | b'\t' | b'\r' | b'\n' => self.lex_whitespace(),
                b'/' if self.peek(1) == Some(b'/') => self.lex_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.lex_block_comment(),
                b'#' if self.at_line_start => self.lex_preprocessor(),
                b'"' => self.lex_string(),
                b'\'' => self.lex_char(),
                b'0'..=b'9' => self.lex_number(),
                b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_identifier(),
                _ if b < 0x80 => self.lex_operator(),
                // non-ascii bytes can only start identifiers in practice
                _ => self.lex_identifier(),
            };
            self.push(kind, start);
        }
        self.tokens
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        debug_assert!(self.pos > start, "lexer must always make progress");
        let text = &self.src[start..self.pos];
        self.tokens.push(Token {
            kind,
            text: text.to_string(),
            line: self.line,
            character: self.character,
        });
        // advance the position bookkeeping over the consumed text
        for b in text.bytes() {
            if b == b'\n' {
                self.line += 1;
                self.character = 0;
                self.at_line_start = true;
            } else {
                self.character += 1;
            }
        }
        if !matches!(kind, TokenKind::Whitespace) {
            self.at_line_start = false;
        }
    }

    fn lex_whitespace(&mut self) -> TokenKind {
        while self.peek(0).is_some_and(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')) {
            self.bump();
        }
        TokenKind::Whitespace
    }

    fn lex_line_comment(&mut self) -> TokenKind {
        let autodoc = self.peek(2) == Some(b'!');
        while self.peek(0).is_some_and(|b| b != b'\n') {
            self.bump();
        }
        if autodoc {
            TokenKind::AutodocComment
        } else {
            TokenKind::LineComment
        }
    }

    fn lex_block_comment(&mut self) -> TokenKind {
        self.bump();
        self.bump();
        while self.pos < self.bytes.len() {
            if self.peek(0) == Some(b'*') && self.peek(1) == Some(b'/') {
                self.bump();
                self.bump();
                break;
            }
            self.bump();
        }
        TokenKind::BlockComment
    }

    fn lex_preprocessor(&mut self) -> TokenKind {
        // consume to end of line, honoring backslash continuations
        loop {
            match self.peek(0) {
                None => break,
                Some(b'\n') => break,
                Some(b'\\') if self.peek(1) == Some(b'\n') => {
                    self.bump();
                    self.bump();
                }
                Some(_) => self.bump(),
            }
        }
        TokenKind::Preprocessor
    }

    fn lex_string(&mut self) -> TokenKind {
        self.bump();
        loop {
            match self.peek(0) {
                None | Some(b'\n') => break,
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    if self.peek(0).is_some() {
                        self.bump();
                    }
                }
                Some(_) => self.bump(),
            }
        }
        TokenKind::String
    }

    fn lex_char(&mut self) -> TokenKind {
        self.bump();
        loop {
            match self.peek(0) {
                None | Some(b'\n') => break,
                Some(b'\'') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    if self.peek(0).is_some() {
                        self.bump();
                    }
                }
                Some(_) => self.bump(),
            }
        }
        TokenKind::Char
    }

    fn lex_number(&mut self) -> TokenKind {
        if self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X' | b'b' | b'B')) {
            self.bump();
            self.bump();
            while self.peek(0).is_some_and(|b| b.is_ascii_alphanumeric()) {
                self.bump();
            }
            return TokenKind::Number;
        }
        while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        // fraction, only if the dot is followed by a digit so ranges like
        // `1..2` and member access stay separate tokens
        if self.peek(0) == Some(b'.') && self.peek(1).is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
            while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
        }
        // exponent
        if matches!(self.peek(0), Some(b'e' | b'E')) {
            let mut ahead = 1;
            if matches!(self.peek(1), Some(b'+' | b'-')) {
                ahead = 2;
            }
            if self.peek(ahead).is_some_and(|b| b.is_ascii_digit()) {
                for _ in 0..=ahead {
                    self.bump();
                }
                while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        TokenKind::Number
    }

    fn lex_identifier(&mut self) -> TokenKind {
        while self.peek(0).is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80) {
            self.bump();
        }
        TokenKind::Identifier
    }

    fn lex_operator(&mut self) -> TokenKind {
        let rest = &self.src[self.pos..];
        for op in OPERATORS {
            if rest.starts_with(op) {
                self.pos += op.len();
                return TokenKind::Operator;
            }
        }
        self.bump();
        TokenKind::Operator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(kinds: &[TokenKind], src: &str) -> Vec<String> {
        tokenize(src).into_iter().filter(|t| kinds.contains(&t.kind)).map(|t| t.text).collect()
    }

    #[test]
    fn roundtrips_source() {
        let src = "inherit .Random;\n// comment\nint x = 0x1f; /* block */ string s = \"a\\\"b\";\n#include <foo.h>\n";
        let joined: String = tokenize(src).into_iter().map(|t| t.text).collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn classifies_comments() {
        let src = "//! doc line\n// plain\n/* block\n */\n";
        let kinds: Vec<_> =
            tokenize(src).into_iter().filter(|t| !matches!(t.kind, TokenKind::Whitespace)).collect();
        assert_eq!(kinds[0].kind, TokenKind::AutodocComment);
        assert_eq!(kinds[1].kind, TokenKind::LineComment);
        assert_eq!(kinds[2].kind, TokenKind::BlockComment);
    }

    #[test]
    fn preprocessor_only_at_line_start() {
        let src = "#include \"x.h\"\nint a = m[#\"key\"];\n";
        let pp = texts(&[TokenKind::Preprocessor], src);
        assert_eq!(pp, ["#include \"x.h\""]);
    }

    #[test]
    fn directives_inside_strings_are_not_directives() {
        let src = "string s = \"#require foo\";\n// #require bar\n";
        assert!(texts(&[TokenKind::Preprocessor], src).is_empty());
    }

    #[test]
    fn preprocessor_continuation() {
        let src = "#define LONG \\\n    1\nint x;\n";
        let pp = texts(&[TokenKind::Preprocessor], src);
        assert_eq!(pp, ["#define LONG \\\n    1"]);
    }

    #[test]
    fn numbers_and_ranges() {
        let src = "a[1..2]; float f = 1.5e3; int h = 0xFF;";
        let nums = texts(&[TokenKind::Number], src);
        assert_eq!(nums, ["1", "2", "1.5e3", "0xFF"]);
    }

    #[test]
    fn positions_are_line_and_column() {
        let toks = tokenize("int x;\n  string y;\n");
        let y = toks.iter().find(|t| t.text == "y").unwrap();
        assert_eq!((y.line, y.character), (2, 9));
        let string_tok = toks.iter().find(|t| t.text == "string").unwrap();
        assert_eq!((string_tok.line, string_tok.character), (2, 2));
    }

    #[test]
    fn operators_use_maximal_munch() {
        let ops = texts(&[TokenKind::Operator], "a->b; c::d; e != f; g <<= 2;");
        assert_eq!(ops, ["->", ";", "::", ";", "!=", ";", "<<=", ";"]);
    }
}
