//! Relative-reference rewriting for `.pmod` members.
//!
//! Files inside a `.pmod` directory may refer to sibling modules with a
//! leading dot (`inherit .Random;`). The host compiler resolves those
//! relative to the enclosing module, which the analyzer compiles out of
//! context - so before handing such a file over, every relative reference is
//! qualified with the parent module name. Member access (`obj.x`) must stay
//! untouched, which is why this works on the token stream.

use crate::lexer::{self, Token, TokenKind};

/// Keywords that can directly precede a relative module reference.
const REFERENCE_KEYWORDS: &[&str] =
    &["case", "class", "import", "inherit", "module", "return", "throw"];

/// Qualifies every relative module reference in `code` with
/// `parent_module`, leaving member access alone.
pub fn rewrite_relative_references(code: &str, parent_module: &str) -> String {
    let tokens = lexer::tokenize(code);
    let mut out = String::with_capacity(code.len() + 64);
    let mut prev_significant: Option<&Token> = None;
    for (i, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::Operator
            && token.text == "."
            && is_reference_position(prev_significant)
            && next_is_identifier(&tokens, i)
        {
            out.push_str(parent_module);
        }
        out.push_str(&token.text);
        if !matches!(token.kind, TokenKind::Whitespace) {
            prev_significant = Some(token);
        }
    }
    out
}

/// A lone `.` opens a relative reference when the preceding non-whitespace
/// token cannot end an expression: nothing at all, punctuation or an
/// operator, or one of the statement keywords.
fn is_reference_position(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(token) => match token.kind {
            // a closing delimiter ends an expression: `get_thing().name`
            TokenKind::Operator => !matches!(token.text.as_str(), ")" | "]" | "}"),
            TokenKind::Preprocessor => true,
            TokenKind::LineComment | TokenKind::BlockComment | TokenKind::AutodocComment => true,
            TokenKind::Identifier => REFERENCE_KEYWORDS.contains(&token.text.as_str()),
            // a value-like token before `.` means member access or a float
            TokenKind::String | TokenKind::Char | TokenKind::Number | TokenKind::Whitespace => {
                false
            }
        },
    }
}

fn next_is_identifier(tokens: &[Token], dot: usize) -> bool {
    tokens
        .iter()
        .skip(dot + 1)
        .find(|t| !t.is_trivia())
        .is_some_and(|t| t.kind == TokenKind::Identifier && !lexer::is_keyword(&t.text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rewrites_statement_and_expression_roots() {
        let input = "inherit .Random;\nobj.x = 1;\n.Foo bar;\n";
        let expected = "inherit Crypto.Random;\nobj.x = 1;\nCrypto.Foo bar;\n";
        assert_eq!(rewrite_relative_references(input, "Crypto"), expected);
    }

    #[test]
    fn member_access_is_untouched() {
        let input = "int y = obj.member;\nstring z = get_thing().name;\n";
        assert_eq!(rewrite_relative_references(input, "Crypto"), input);
    }

    #[test]
    fn rewrites_after_operators_and_parens() {
        let input = "return .Helper(.Other);\nmixed m = 1 + .Value;\n";
        let expected = "return Crypto.Helper(Crypto.Other);\nmixed m = 1 + Crypto.Value;\n";
        assert_eq!(rewrite_relative_references(input, "Crypto"), expected);
    }

    #[test]
    fn ranges_and_floats_are_not_references() {
        let input = "array a = b[1..2];\nfloat f = .5;\n";
        assert_eq!(rewrite_relative_references(input, "Crypto"), input);
    }

    #[test]
    fn dot_inside_strings_and_comments_is_left_alone() {
        let input = "string s = \".Foo\";\n// .Bar comment\n";
        assert_eq!(rewrite_relative_references(input, "Crypto"), input);
    }

    #[test]
    fn case_and_throw_open_references() {
        let input = "case .Kind: throw .Error(\"x\");\n";
        let expected = "case Crypto.Kind: throw Crypto.Error(\"x\");\n";
        assert_eq!(rewrite_relative_references(input, "Crypto"), expected);
    }
}
