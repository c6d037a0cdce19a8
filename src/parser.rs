use log::{debug, warn};
use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0, multispace1},
    multi::separated_list0,
    sequence::{delimited, preceded, separated_pair},
    IResult,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{collections::BTreeMap, ops::ControlFlow};
use thiserror::Error;

use crate::models::{placeholder_fields, FieldSet, HandlerLocation, Inference, RouteMatch};
use crate::walker::Corpus;

/// Calls that decode the request payload into a local, in priority order
static BIND_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"ShouldBindJSON\s*\(\s*&\s*(\w+)\s*\)",
        r"BindJSON\s*\(\s*&\s*(\w+)\s*\)",
        r"ShouldBind\s*\(\s*&\s*(\w+)\s*\)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

static GIN_H_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"gin\.H\s*\{([\s\S]*?)\}").unwrap()
});

static RESPONSE_KEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:"([^"]+)"|(\w+))\s*:\s*"#).unwrap()
});

static QUOTED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"]+)""#).unwrap()
});

const ROUTE_VERBS: [&str; 6] = ["POST", "GET", "PUT", "DELETE", "PATCH", "Any"];

/// `POST(` and `post(` style call tokens for every route verb
static VERB_CALLS: Lazy<Vec<String>> = Lazy::new(|| {
    ROUTE_VERBS
        .iter()
        .flat_map(|verb| [format!("{}(", verb), format!("{}(", verb.to_lowercase())])
        .collect()
});

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("handler {0} not found")]
    HandlerNotFound(String),
}

/// Heuristic scanner over a corpus of Go source files.
///
/// Nothing here builds a syntax tree: handlers, structs and routes are found
/// by textual patterns, so misses are expected on unusual code layouts.
pub struct GoParser {
    corpus: Corpus,
}

impl GoParser {
    pub fn new(corpus: Corpus) -> Self {
        Self { corpus }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Finds the first function or method named `handler` and returns its
    /// body. Methods with a receiver are tried before free functions in each
    /// file.
    pub fn find_handler(&self, handler: &str) -> Result<HandlerLocation, ParserError> {
        let name = regex::escape(handler);
        let patterns = [
            Regex::new(&format!(r"func\s+\(.*\)\s*{}\s*\(", name)),
            Regex::new(&format!(r"func\s+{}\s*\(", name)),
        ];
        let patterns: Vec<Regex> = patterns.into_iter().filter_map(Result::ok).collect();

        self.corpus
            .visit(|unit| match locate_body(&unit.text, &patterns) {
                Some(body) => {
                    debug!("Found handler {} in {:?}", handler, unit.path);
                    ControlFlow::Break(HandlerLocation {
                        path: unit.path.clone(),
                        body: body.to_string(),
                    })
                }
                None => ControlFlow::Continue(()),
            })
            .ok_or_else(|| ParserError::HandlerNotFound(handler.to_string()))
    }

    /// Collects the fields of every `type <name> struct` in the corpus as
    /// external name to Go type. Later files win on key collisions.
    pub fn find_struct_fields(&self, type_name: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        let pattern = format!(
            r"type\s+{}\s+struct\s*\{{([\s\S]*?)\}}",
            regex::escape(type_name)
        );
        let struct_regex = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(err) => {
                warn!("Cannot build struct pattern for {}: {}", type_name, err);
                return fields;
            }
        };

        for unit in self.corpus.units() {
            if let Some(block) = struct_regex.captures(&unit.text).and_then(|c| c.get(1)) {
                debug!("Found struct {} in {:?}", type_name, unit.path);
                fields.extend(parse_struct_fields(block.as_str()));
            }
        }

        fields
    }

    /// Infers the request body shape from the variable the handler binds the
    /// payload into.
    pub fn extract_request_fields(&self, body: &str) -> FieldSet {
        let Some(var_name) = bound_variable(body) else {
            debug!("No bind call found in handler body");
            return FieldSet::new();
        };
        let var = regex::escape(&var_name);

        let declared = Regex::new(&format!(r"var\s+{}\s+\*?(?:\w+\.)?(\w+)", var)).ok();
        if let Some(type_name) = declared.as_ref().and_then(|re| capture(re, body)) {
            if type_name != "struct" {
                return placeholder_fields(self.find_struct_fields(&type_name).into_keys());
            }
        }

        let inline = Regex::new(&format!(
            r"(?:var\s+{0}\s+|\b{0}\s*:=\s*)struct\s*\{{([^}}]*)\}}",
            var
        ))
        .ok();
        if let Some(block) = inline.as_ref().and_then(|re| capture(re, body)) {
            return placeholder_fields(parse_struct_fields(&block).into_keys());
        }

        let assigned = Regex::new(&format!(r"\b{}\s*:?=\s*&?(?:\w+\.)?(\w+)", var)).ok();
        if let Some(type_name) = assigned.as_ref().and_then(|re| capture(re, body)) {
            return placeholder_fields(self.find_struct_fields(&type_name).into_keys());
        }

        debug!("Could not resolve the type of {}", var_name);
        FieldSet::new()
    }

    /// Finds the route path registered for `handler`, stopping at the first
    /// registration found anywhere in the corpus.
    pub fn find_route(&self, handler: &str) -> Option<RouteMatch> {
        self.corpus.visit(|unit| match route_in_source(&unit.text, handler) {
            Some(path) => {
                debug!("Found route {} for {} in {:?}", path, handler, unit.path);
                ControlFlow::Break(RouteMatch {
                    path,
                    handler: handler.to_string(),
                })
            }
            None => ControlFlow::Continue(()),
        })
    }

    /// Locates `handler` and infers its request and response shapes. A
    /// missing handler yields empty field sets.
    pub fn infer(&self, handler: &str) -> Inference {
        match self.find_handler(handler) {
            Ok(location) => Inference {
                request_fields: self.extract_request_fields(&location.body),
                response_fields: extract_response_fields(&location.body),
            },
            Err(err) => {
                warn!("{}, continuing without inferred fields", err);
                Inference::default()
            }
        }
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn bound_variable(body: &str) -> Option<String> {
    BIND_REGEXES.iter().find_map(|re| capture(re, body))
}

fn locate_body<'a>(text: &'a str, patterns: &[Regex]) -> Option<&'a str> {
    patterns.iter().find_map(|re| {
        let found = re.find(text)?;
        let open = found.end() + text[found.end()..].find('{')?;
        balanced_body(text, open)
    })
}

/// Returns the text between the brace at `open` and its matching closer.
/// Braces inside strings and comments are counted like any other.
fn balanced_body(text: &str, open: usize) -> Option<&str> {
    let mut depth = 0usize;
    for (i, byte) in text.bytes().enumerate().skip(open) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses the inside of a struct declaration into external name to Go type.
pub fn parse_struct_fields(block: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for line in field_lines(block) {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let (Some(name), Some(field_type)) = (tokens.next(), tokens.next()) else {
            continue;
        };

        let external = match json_name(line) {
            Some(JsonName::Skip) => continue,
            Some(JsonName::Named(tagged)) => tagged.to_string(),
            None => name.to_lowercase(),
        };
        fields.insert(external, field_type.to_string());
    }

    fields
}

/// Splits a field block on newlines and on `;` outside struct tags
fn field_lines(block: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut in_tag = false;

    for (i, c) in block.char_indices() {
        match c {
            '`' => in_tag = !in_tag,
            '\n' => {
                lines.push(&block[start..i]);
                start = i + 1;
                in_tag = false;
            }
            ';' if !in_tag => {
                lines.push(&block[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    lines.push(&block[start..]);
    lines
}

enum JsonName<'a> {
    Named(&'a str),
    Skip,
}

fn json_name(line: &str) -> Option<JsonName<'_>> {
    let start = line.find('`')? + 1;
    let end = start + line[start..].find('`')?;
    let (_, pairs) = struct_tag(&line[start..end]).ok()?;
    let value = pairs.into_iter().find(|(key, _)| *key == "json")?.1;

    match value.split(',').next().unwrap_or_default() {
        "" => None,
        "-" => Some(JsonName::Skip),
        name => Some(JsonName::Named(name)),
    }
}

fn tag_pair(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        take_while1(|c: char| c != ':' && c != '"' && !c.is_whitespace()),
        char(':'),
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
    )(input)
}

/// `json:"email" binding:"required"` into key/value pairs
fn struct_tag(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    preceded(multispace0, separated_list0(multispace1, tag_pair))(input)
}

/// Extracts the keys of the first `gin.H{...}` literal in a handler body.
pub fn extract_response_fields(body: &str) -> FieldSet {
    let Some(inside) = GIN_H_REGEX.captures(body).and_then(|c| c.get(1)) else {
        debug!("No gin.H literal found in handler body");
        return FieldSet::new();
    };

    let keys = RESPONSE_KEY_REGEX
        .captures_iter(inside.as_str())
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string());

    placeholder_fields(keys)
}

fn is_verb_call(line: &str) -> bool {
    VERB_CALLS.iter().any(|call| line.contains(call.as_str()))
}

/// Finds the first route registration in `text` that names `handler` on the
/// same line or within the next three lines.
pub fn route_in_source(text: &str, handler: &str) -> Option<String> {
    let lines: Vec<&str> = text.split('\n').collect();

    for (i, line) in lines.iter().enumerate() {
        if !is_verb_call(line) {
            continue;
        }
        let Some(candidate) = QUOTED_REGEX.captures(line).and_then(|c| c.get(1)) else {
            continue;
        };

        let window = &lines[i..lines.len().min(i + 4)];
        if window.iter().any(|l| l.contains(handler)) {
            return Some(candidate.as_str().to_string());
        }
    }

    None
}
