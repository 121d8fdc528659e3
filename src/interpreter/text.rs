//! Query text helpers
//!
//! Nothing here builds an AST. The helpers collapse whitespace, locate
//! top-level keywords (outside parentheses and quoted strings) and read the
//! handful of operand forms the recognised shapes use.

use chrono::{SecondsFormat, Utc};
use serde_json::{Number, Value};

/// Collapse runs of whitespace outside single-quoted literals, trim, and drop
/// trailing semicolons. Case is preserved; matching is done case-insensitively.
pub(crate) fn collapse(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut in_quote = false;
    let mut pending_space = false;

    for c in query.chars() {
        if in_quote {
            out.push(c);
            if c == '\'' {
                in_quote = false;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '\'' {
            in_quote = true;
        }
        out.push(c);
    }

    while out.ends_with(';') || out.ends_with(' ') {
        out.pop();
    }
    out
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'*'
}

/// Find `needle` in `haystack` at parenthesis depth zero and outside quotes,
/// starting from byte offset `from`. Alphabetic needles must sit on word
/// boundaries. Matching ignores ASCII case.
pub(crate) fn find_top_level(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || hay.len() < pat.len() {
        return None;
    }
    let wordy = pat[0].is_ascii_alphabetic();
    let mut depth: i32 = 0;
    let mut in_quote = false;

    let mut i = 0;
    while i + pat.len() <= hay.len() {
        let b = hay[i];
        if in_quote {
            if b == b'\'' {
                in_quote = false;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' => in_quote = true,
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if i >= from && depth == 0 && hay[i..i + pat.len()].eq_ignore_ascii_case(pat) {
            let before_ok = !wordy || i == 0 || !is_ident_byte(hay[i - 1]);
            let end = i + pat.len();
            let after_ok = !wordy || end == hay.len() || !is_ident_byte(hay[end]);
            if before_ok && after_ok && b != b'(' {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Split on a top-level separator (`,` or a keyword such as `and`)
pub(crate) fn split_top_level<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(pos) = find_top_level(text, separator, start) {
        parts.push(text[start..pos].trim());
        start = pos + separator.len();
    }
    parts.push(text[start..].trim());
    parts
}

/// Case-insensitive prefix strip that respects word boundaries
pub(crate) fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let text = text.trim_start();
    let head = text.as_bytes().get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword.as_bytes()) {
        return None;
    }
    // An ASCII keyword matched, so the next byte starts a character
    let rest = &text[keyword.len()..];
    match rest.as_bytes().first() {
        Some(b) if is_ident_byte(*b) => None,
        _ => Some(rest.trim_start()),
    }
}

/// Strip one pair of enclosing parentheses
pub(crate) fn unwrap_parens(text: &str) -> Option<&str> {
    let text = text.trim();
    if !(text.starts_with('(') && text.ends_with(')')) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    // Reject "(a) + (b)": the opening paren must close at the very end
    let mut depth = 0;
    for b in inner.bytes() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(inner.trim())
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strip MySQL backtick quoting from an identifier
pub(crate) fn unquote_ident(text: &str) -> &str {
    text.trim().trim_matches('`')
}

/// A possibly-qualified column reference (`p.user_id`, `username`)
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (qualifier, name) = match text.split_once('.') {
            Some((q, n)) => (Some(unquote_ident(q)), unquote_ident(n)),
            None => (None, unquote_ident(text)),
        };
        if !is_identifier(name) || qualifier.map_or(false, |q| !is_identifier(q)) {
            return None;
        }
        Some(Self {
            qualifier: qualifier.map(|q| q.to_ascii_lowercase()),
            name: name.to_ascii_lowercase(),
        })
    }
}

/// Positional parameter cursor; placeholders are bound in textual order
pub(crate) struct ParamCursor<'a> {
    params: &'a [Value],
    pos: usize,
    missing: usize,
}

impl<'a> ParamCursor<'a> {
    pub(crate) fn new(params: &'a [Value]) -> Self {
        Self { params, pos: 0, missing: 0 }
    }

    /// Next parameter; an exhausted list binds NULL
    pub(crate) fn next_value(&mut self) -> Value {
        match self.params.get(self.pos) {
            Some(value) => {
                self.pos += 1;
                value.clone()
            }
            None => {
                self.missing += 1;
                Value::Null
            }
        }
    }

    /// True when every placeholder had a parameter and every parameter was used
    pub(crate) fn exactly_consumed(&self) -> bool {
        self.missing == 0 && self.pos == self.params.len()
    }
}

/// Parse a SQL literal: quoted string, number, NULL, TRUE/FALSE, NOW()
pub(crate) fn parse_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return Some(Value::String(text[1..text.len() - 1].replace("''", "'")));
    }
    match text.to_ascii_lowercase().as_str() {
        "null" => return Some(Value::Null),
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "now()" | "current_timestamp" | "current_timestamp()" => {
            return Some(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ))
        }
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

/// Resolve a value operand: `?` binds the next parameter, otherwise a literal
pub(crate) fn parse_value(text: &str, params: &mut ParamCursor<'_>) -> Option<Value> {
    if text.trim() == "?" {
        Some(params.next_value())
    } else {
        parse_literal(text)
    }
}

/// Interpret a LIMIT/OFFSET operand as a row count
pub(crate) fn as_count(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
