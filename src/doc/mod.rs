//! Parser for Pike autodoc comments.
//!
//! Input is the concatenated content of the `//!` lines attached to a
//! declaration, with the prefix already stripped. The parser runs a small
//! state machine over line-level `@keyword` delimiters, keeps a stack for
//! nested block groups (`@mapping`, `@code`, ...), and transliterates inline
//! markup (`@b{...@}`, `@[name]`, `@@`) into Markdown. The result is a
//! canonical [`DocBlock`] mapping that the hover layer renders.

mod markup;

pub use markup::inline_to_markdown;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical parse of one autodoc comment block.
///
/// Empty collections are pruned during serialization, so consumers can test
/// for key presence the way the editor layer expects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocBlock {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    /// Parameter names in declaration order; first sighting wins.
    #[serde(rename = "paramOrder", default, skip_serializing_if = "Vec::is_empty")]
    pub param_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throws: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bugs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seealso: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub members: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constants: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obsolete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thanks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_doc: Option<String>,
}

impl DocBlock {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Renders the block back into autodoc form. Re-parsing the output
    /// preserves every structured field modulo whitespace, which is what the
    /// cache layer relies on when doc blocks travel through serialization.
    pub fn to_autodoc(&self) -> String {
        let mut out = String::new();
        let mut push_line = |line: &str| {
            out.push_str(line);
            out.push('\n');
        };
        if !self.text.is_empty() {
            push_line(&self.text);
        }
        for name in &self.param_order {
            let desc = self.params.get(name).map(String::as_str).unwrap_or_default();
            push_line(&format!("@param {name} {desc}"));
        }
        // params recorded without an order entry should never exist, but
        // serialize them too rather than dropping data
        for (name, desc) in &self.params {
            if !self.param_order.contains(name) {
                push_line(&format!("@param {name} {desc}"));
            }
        }
        let sections: &[(&str, &Option<String>)] = &[
            ("returns", &self.returns),
            ("throws", &self.throws),
            ("note", &self.note),
            ("bugs", &self.bugs),
            ("deprecated", &self.deprecated),
            ("example", &self.example),
            ("obsolete", &self.obsolete),
            ("copyright", &self.copyright),
            ("thanks", &self.thanks),
            ("fixme", &self.fixme),
            ("index", &self.index),
            ("type", &self.type_doc),
        ];
        for (keyword, value) in sections {
            if let Some(value) = value {
                push_line(&format!("@{keyword} {value}"));
            }
        }
        for target in &self.seealso {
            push_line(&format!("@seealso {target}"));
        }
        for (name, desc) in &self.members {
            push_line(&format!("@member {name} {desc}"));
        }
        for (name, desc) in &self.constants {
            push_line(&format!("@constant {name} {desc}"));
        }
        for element in &self.elements {
            push_line(&format!("@elem {element}"));
        }
        out
    }

    /// Renders the block as Markdown hover content.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        if !self.text.is_empty() {
            out.push_str(&self.text);
            out.push('\n');
        }
        if !self.param_order.is_empty() {
            out.push_str("\n**Parameters**\n");
            for name in &self.param_order {
                let desc = self.params.get(name).map(String::as_str).unwrap_or_default();
                out.push_str(&format!("- `{name}` {desc}\n"));
            }
        }
        if let Some(returns) = &self.returns {
            out.push_str(&format!("\n**Returns** {returns}\n"));
        }
        if let Some(throws) = &self.throws {
            out.push_str(&format!("\n**Throws** {throws}\n"));
        }
        if let Some(deprecated) = &self.deprecated {
            out.push_str(&format!("\n**Deprecated** {deprecated}\n"));
        }
        if let Some(note) = &self.note {
            out.push_str(&format!("\n**Note** {note}\n"));
        }
        if let Some(example) = &self.example {
            out.push_str(&format!("\n```pike\n{example}\n```\n"));
        }
        if !self.seealso.is_empty() {
            out.push_str("\n**See also** ");
            out.push_str(
                &self.seealso.iter().map(|s| format!("`{s}`")).collect::<Vec<_>>().join(", "),
            );
            out.push('\n');
        }
        out
    }
}

/// The section a delimiter keyword switches the parser into.
#[derive(Clone, Debug, PartialEq)]
enum Section {
    Text,
    Param(String),
    Returns,
    Throws,
    Note,
    Bugs,
    Deprecated,
    Example,
    Seealso,
    Member(String),
    Constant(String),
    Element,
    Obsolete,
    Copyright,
    Thanks,
    Fixme,
    Index,
    Type,
}

/// Block groups that nest; each `@<group>` is closed by `@end<group>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Group {
    Mapping,
    Array,
    Multiset,
    Dl,
    Ul,
    Ol,
    Code,
    Section,
    Int,
    String,
    Mixed,
}

impl Group {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "mapping" => Some(Self::Mapping),
            "array" => Some(Self::Array),
            "multiset" => Some(Self::Multiset),
            "dl" => Some(Self::Dl),
            "ul" => Some(Self::Ul),
            "ol" => Some(Self::Ol),
            "code" => Some(Self::Code),
            "section" => Some(Self::Section),
            "int" => Some(Self::Int),
            "string" => Some(Self::String),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

/// Parses one autodoc comment into its canonical block shape.
pub fn parse_autodoc(input: &str) -> DocBlock {
    Parser::default().run(input)
}

#[derive(Default)]
struct Parser {
    block: DocBlock,
    section: Option<Section>,
    groups: Vec<Group>,
    ignoring: bool,
}

impl Parser {
    fn run(mut self, input: &str) -> DocBlock {
        self.section = Some(Section::Text);
        for raw_line in input.lines() {
            let line = raw_line.trim();
            match parse_delimiter(line) {
                // inside @code only the closing delimiter is significant
                Some((keyword, arg))
                    if !self.groups.contains(&Group::Code) || keyword == "endcode" =>
                {
                    self.delimiter(keyword, arg)
                }
                _ => self.text_line(line),
            }
        }
        self.block
    }

    fn delimiter(&mut self, keyword: &str, arg: &str) {
        if self.ignoring {
            if keyword == "endignore" {
                self.ignoring = false;
            }
            return;
        }
        match keyword {
            "ignore" => self.ignoring = true,
            "endignore" => {}
            "param" => {
                let (name, desc) = split_first_word(arg);
                if !name.is_empty() {
                    if !self.block.params.contains_key(name) {
                        self.block.param_order.push(name.to_string());
                    }
                    let entry = self.block.params.entry(name.to_string()).or_default();
                    append_fragment(entry, &inline_to_markdown(desc));
                    self.section = Some(Section::Param(name.to_string()));
                }
            }
            "returns" | "return" => {
                self.append_section_text(Section::Returns, arg);
            }
            "throws" | "throw" => self.append_section_text(Section::Throws, arg),
            "note" => self.append_section_text(Section::Note, arg),
            "bugs" => self.append_section_text(Section::Bugs, arg),
            "deprecated" => {
                // presence alone is significant; keep at least an empty string
                self.block.deprecated.get_or_insert_with(String::new);
                self.append_section_text(Section::Deprecated, arg);
            }
            "example" => self.append_section_text(Section::Example, arg),
            "seealso" => {
                for target in arg.split([',', ' ']).map(str::trim).filter(|t| !t.is_empty()) {
                    let target = target.trim_start_matches("@[").trim_end_matches(']').to_string();
                    if !self.block.seealso.contains(&target) {
                        self.block.seealso.push(target);
                    }
                }
                self.section = Some(Section::Seealso);
            }
            "member" => {
                let (name, desc) = split_member_arg(arg);
                let entry = self.block.members.entry(name.clone()).or_default();
                append_fragment(entry, &inline_to_markdown(&desc));
                self.section = Some(Section::Member(name));
            }
            "constant" => {
                let (name, desc) = split_first_word(arg);
                let entry = self.block.constants.entry(name.to_string()).or_default();
                append_fragment(entry, &inline_to_markdown(desc));
                self.section = Some(Section::Constant(name.to_string()));
            }
            "elem" | "item" | "value" => {
                self.block.elements.push(inline_to_markdown(arg));
                self.section = Some(Section::Element);
            }
            "obsolete" => self.append_section_text(Section::Obsolete, arg),
            "copyright" => self.append_section_text(Section::Copyright, arg),
            "thanks" => self.append_section_text(Section::Thanks, arg),
            "fixme" => self.append_section_text(Section::Fixme, arg),
            "index" => self.append_section_text(Section::Index, arg),
            "type" if self.groups.is_empty() => self.append_section_text(Section::Type, arg),
            _ => {
                if let Some(rest) = keyword.strip_prefix("end") {
                    if let Some(group) = Group::from_keyword(rest) {
                        self.close_group(group);
                        return;
                    }
                }
                if let Some(group) = Group::from_keyword(keyword) {
                    self.open_group(group);
                    return;
                }
                // unknown keyword: keep its text rather than lose it
                self.text_line(&format!("@{keyword} {arg}"));
            }
        }
    }

    fn open_group(&mut self, group: Group) {
        self.groups.push(group);
        if group == Group::Code {
            self.raw_line("```pike");
        }
    }

    fn close_group(&mut self, group: Group) {
        if let Some(pos) = self.groups.iter().rposition(|g| *g == group) {
            self.groups.truncate(pos);
        }
        if group == Group::Code {
            self.raw_line("```");
        }
    }

    fn append_section_text(&mut self, section: Section, arg: &str) {
        self.section = Some(section.clone());
        if !arg.is_empty() {
            let converted = inline_to_markdown(arg);
            self.append_to(&section, &converted);
        }
    }

    fn text_line(&mut self, line: &str) {
        if self.ignoring {
            return;
        }
        let section = self.section.clone().unwrap_or(Section::Text);
        if self.groups.contains(&Group::Code) {
            // verbatim, line structure preserved
            self.append_to_joined(&section, line, '\n');
        } else {
            self.append_to(&section, &inline_to_markdown(line));
        }
    }

    fn raw_line(&mut self, line: &str) {
        let section = self.section.clone().unwrap_or(Section::Text);
        self.append_to_joined(&section, line, '\n');
    }

    fn append_to(&mut self, section: &Section, fragment: &str) {
        self.append_to_joined(section, fragment, ' ');
    }

    fn append_to_joined(&mut self, section: &Section, fragment: &str, joiner: char) {
        let target: &mut String = match section {
            Section::Text => &mut self.block.text,
            Section::Param(name) => self.block.params.entry(name.clone()).or_default(),
            Section::Returns => self.block.returns.get_or_insert_with(String::new),
            Section::Throws => self.block.throws.get_or_insert_with(String::new),
            Section::Note => self.block.note.get_or_insert_with(String::new),
            Section::Bugs => self.block.bugs.get_or_insert_with(String::new),
            Section::Deprecated => self.block.deprecated.get_or_insert_with(String::new),
            Section::Example => self.block.example.get_or_insert_with(String::new),
            Section::Seealso => {
                // prose after @seealso continues the list
                for target in
                    fragment.split([',', ' ']).map(str::trim).filter(|t| !t.is_empty())
                {
                    if !self.block.seealso.contains(&target.to_string()) {
                        self.block.seealso.push(target.to_string());
                    }
                }
                return;
            }
            Section::Member(name) => {
                let entry = self.block.members.entry(name.clone()).or_default();
                append_fragment(entry, fragment);
                return;
            }
            Section::Constant(name) => self.block.constants.entry(name.clone()).or_default(),
            Section::Element => {
                if let Some(last) = self.block.elements.last_mut() {
                    append_fragment(last, fragment);
                }
                return;
            }
            Section::Obsolete => self.block.obsolete.get_or_insert_with(String::new),
            Section::Copyright => self.block.copyright.get_or_insert_with(String::new),
            Section::Thanks => self.block.thanks.get_or_insert_with(String::new),
            Section::Fixme => self.block.fixme.get_or_insert_with(String::new),
            Section::Index => self.block.index.get_or_insert_with(String::new),
            Section::Type => self.block.type_doc.get_or_insert_with(String::new),
        };
        append_joined(target, fragment, joiner);
    }
}

/// Returns the `(keyword, rest-of-line)` pair if the line is an `@keyword`
/// delimiter. Inline markup such as `@b{` never matches: the keyword must be
/// a bare word.
fn parse_delimiter(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('@')?;
    if rest.starts_with('@') {
        // escaped @@, not a delimiter
        return None;
    }
    let end = rest.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let (keyword, tail) = rest.split_at(end);
    // `@b{bold@}` style inline markup opens a brace right after the keyword
    if tail.starts_with('{') {
        return None;
    }
    Some((keyword, tail.trim()))
}

fn split_first_word(arg: &str) -> (&str, &str) {
    match arg.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (arg, ""),
    }
}

/// `@member type "name"` or `@member name desc`; the quoted form carries the
/// key, the rest describes it.
fn split_member_arg(arg: &str) -> (String, String) {
    if let Some(start) = arg.find('"') {
        if let Some(len) = arg[start + 1..].find('"') {
            let name = arg[start + 1..start + 1 + len].to_string();
            let mut desc = String::new();
            append_fragment(&mut desc, arg[..start].trim());
            append_fragment(&mut desc, arg[start + len + 2..].trim());
            return (name, desc);
        }
    }
    let (name, desc) = split_first_word(arg);
    (name.to_string(), desc.to_string())
}

fn append_fragment(target: &mut String, fragment: &str) {
    append_joined(target, fragment, ' ');
}

fn append_joined(target: &mut String, fragment: &str, joiner: char) {
    let fragment = fragment.trim_end();
    if fragment.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(joiner);
    }
    target.push_str(fragment.trim_start());
}

/// Strips the `//!` prefix and one optional following space from each raw
/// comment line, yielding the parser input.
pub fn strip_autodoc_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for line in lines {
        let content = line.trim_start();
        let content = content.strip_prefix("//!").unwrap_or(content);
        let content = content.strip_prefix(' ').unwrap_or(content);
        out.push_str(content);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_realistic_block() {
        let input = "Do a thing.\n@param name Who to greet\n@returns The greeting\n@seealso other_fn\n";
        let block = parse_autodoc(input);
        assert_eq!(block.text, "Do a thing.");
        assert_eq!(block.params.get("name").map(String::as_str), Some("Who to greet"));
        assert_eq!(block.param_order, vec!["name"]);
        assert_eq!(block.returns.as_deref(), Some("The greeting"));
        assert_eq!(block.seealso, vec!["other_fn"]);
        assert!(block.deprecated.is_none());
        // pruning: no deprecated key in the serialized mapping
        let json = serde_json::to_value(&block).unwrap();
        assert!(json.get("deprecated").is_none());
        assert!(json.get("paramOrder").is_some());
    }

    #[test]
    fn param_order_preserves_first_sighting() {
        let input = "@param b second\n@param a first\n@param b again\n";
        let block = parse_autodoc(input);
        assert_eq!(block.param_order, vec!["b", "a"]);
        assert_eq!(block.params.get("b").map(String::as_str), Some("second again"));
    }

    #[test]
    fn continuation_lines_attach_to_current_section() {
        let input = "@param x the value\n  continued here\n@returns something\n  more\n";
        let block = parse_autodoc(input);
        assert_eq!(block.params.get("x").map(String::as_str), Some("the value continued here"));
        assert_eq!(block.returns.as_deref(), Some("something more"));
    }

    #[test]
    fn inline_markup_is_transliterated() {
        let block = parse_autodoc("Makes @b{bold@} and @i{italic@} and @tt{mono@} and @[Stdio.File].\n");
        assert_eq!(block.text, "Makes **bold** and *italic* and `mono` and `Stdio.File`.");
    }

    #[test]
    fn double_at_collapses() {
        let block = parse_autodoc("Write user@@host here.\n");
        assert_eq!(block.text, "Write user@host here.");
    }

    #[test]
    fn ignore_suppresses_output() {
        let input = "kept\n@ignore\ndropped\n@param ghost nope\n@endignore\nalso kept\n";
        let block = parse_autodoc(input);
        assert_eq!(block.text, "kept also kept");
        assert!(block.params.is_empty());
    }

    #[test]
    fn code_group_keeps_verbatim_text_as_fence() {
        let input = "Usage:\n@code\nint x = @weird@;\n@endcode\ndone\n";
        let block = parse_autodoc(input);
        assert!(block.text.contains("```pike"));
        assert!(block.text.contains("int x = @weird@;"));
        assert!(block.text.contains("```"));
    }

    #[test]
    fn mapping_group_members() {
        let input = "@mapping\n@member int \"count\"\nNumber of entries.\n@member string \"name\"\nThe name.\n@endmapping\n";
        let block = parse_autodoc(input);
        assert_eq!(block.members.get("count").map(String::as_str), Some("int Number of entries."));
        assert_eq!(block.members.get("name").map(String::as_str), Some("string The name."));
    }

    #[test]
    fn deprecated_presence_without_text() {
        let block = parse_autodoc("Old stuff.\n@deprecated\n");
        assert_eq!(block.deprecated.as_deref(), Some(""));
        let json = serde_json::to_value(&block).unwrap();
        assert!(json.get("deprecated").is_some());
    }

    #[test]
    fn autodoc_roundtrip_fixed_point() {
        let input = "Do a thing.\n@param name Who to greet\n@param count How many times\n@returns The greeting\n@throws On bad input\n@deprecated use greet2\n@seealso other_fn\n@seealso greet2\n";
        let first = parse_autodoc(input);
        let second = parse_autodoc(&first.to_autodoc());
        assert_eq!(first.params, second.params);
        assert_eq!(first.param_order, second.param_order);
        assert_eq!(first.returns, second.returns);
        assert_eq!(first.throws, second.throws);
        assert_eq!(first.deprecated, second.deprecated);
        assert_eq!(first.seealso, second.seealso);
    }

    #[test]
    fn strips_prefixes() {
        let out = strip_autodoc_lines(["//! Line one", "//!Line two", "//!", "//!  indented"]);
        assert_eq!(out, "Line one\nLine two\n\n indented\n");
    }
}
