//! Parsing of host function type strings.
//!
//! The host's type-of operator prints callables as
//! `function(t1, t2, ... : ret)`. Argument types can themselves be
//! parameterized (`mapping(string:int)`, `int(0..1)`), so the split points
//! are found by tracking paren and angle depth rather than naive splitting.

/// A parsed `function(...)` type string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionSignature {
    pub arg_types: Vec<String>,
    pub return_type: String,
}

impl FunctionSignature {
    /// Synthetic `arg1..argN` parameter names, one per argument.
    pub fn synthetic_names(&self) -> Vec<String> {
        (1..=self.arg_types.len()).map(|i| format!("arg{i}")).collect()
    }
}

/// Parses the canonical function type string, or returns `None` when the
/// input is not of `function(args : ret)` shape.
pub fn parse_function_type(type_string: &str) -> Option<FunctionSignature> {
    let inner = type_string.trim().strip_prefix("function")?.trim();
    let inner = inner.strip_prefix('(')?.strip_suffix(')')?;

    let (args_part, return_part) = split_return(inner);
    let mut arg_types = split_args(args_part);

    // a lone leading `void` argument denotes "no required arguments"
    if arg_types.first().map(String::as_str) == Some("void") {
        arg_types.remove(0);
    }

    Some(FunctionSignature {
        arg_types,
        return_type: return_part.trim().to_string(),
    })
}

/// Splits `args : ret` at the top-level colon. Nested type arguments like
/// `mapping(string:int)` keep their colons.
fn split_return(inner: &str) -> (&str, &str) {
    let mut depth = 0i32;
    for (i, c) in inner.char_indices() {
        match c {
            '(' | '<' | '[' => depth += 1,
            ')' | '>' | ']' => depth -= 1,
            ':' if depth == 0 => return (&inner[..i], &inner[i + 1..]),
            _ => {}
        }
    }
    (inner, "")
}

fn split_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '(' | '<' | '[' => depth += 1,
            ')' | '>' | ']' => depth -= 1,
            ',' if depth == 0 => {
                push_arg(&mut out, &args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push_arg(&mut out, &args[start..]);
    out
}

fn push_arg(out: &mut Vec<String>, arg: &str) {
    let arg = arg.trim();
    if !arg.is_empty() {
        out.push(arg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_simple_signature() {
        let sig = parse_function_type("function(int, string : void)").unwrap();
        assert_eq!(sig.arg_types, vec!["int", "string"]);
        assert_eq!(sig.return_type, "void");
        assert_eq!(sig.synthetic_names(), vec!["arg1", "arg2"]);
    }

    #[test]
    fn nested_type_arguments_are_not_split() {
        let sig =
            parse_function_type("function(mapping(string:int), array(int) : mapping(int:string))")
                .unwrap();
        assert_eq!(sig.arg_types, vec!["mapping(string:int)", "array(int)"]);
        assert_eq!(sig.return_type, "mapping(int:string)");
    }

    #[test]
    fn lone_leading_void_is_stripped() {
        let sig = parse_function_type("function(void : int)").unwrap();
        assert!(sig.arg_types.is_empty());
        assert_eq!(sig.return_type, "int");
    }

    #[test]
    fn empty_argument_list() {
        let sig = parse_function_type("function( : int)").unwrap();
        assert!(sig.arg_types.is_empty());
        assert_eq!(sig.return_type, "int");
    }

    #[test]
    fn ranged_int_types() {
        let sig = parse_function_type("function(int(0..1), string : int(0..))").unwrap();
        assert_eq!(sig.arg_types, vec!["int(0..1)", "string"]);
        assert_eq!(sig.return_type, "int(0..)");
    }

    #[test]
    fn rejects_non_function_types() {
        assert_eq!(parse_function_type("int"), None);
        assert_eq!(parse_function_type("mapping(string:int)"), None);
    }
}
