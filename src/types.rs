//! Core types for RelaySQL
//!
//! Rows are open JSON objects: no schema, no type constraints. Comparisons
//! between stored values and query parameters follow MySQL-style affinity so
//! that `'42'` matches `42` and `true` matches `1`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row record: field name -> scalar/string value
pub type Row = Map<String, Value>;

/// Connectivity mode published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Queries are answered by the remote endpoint
    Remote,
    /// Queries are answered by the local embedded store
    Local,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Remote
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Remote => write!(f, "remote"),
            Mode::Local => write!(f, "local"),
        }
    }
}

/// Body posted to the remote query endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Check two values for equality with numeric/string/bool affinity
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        // Affinity: String to Number
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            match (s.trim().parse::<f64>(), n.as_f64()) {
                (Ok(parsed), Some(n)) => parsed == n,
                _ => false,
            }
        }
        // Affinity: Bool to Number (TINYINT(1))
        (Value::Bool(b), Value::Number(n)) | (Value::Number(n), Value::Bool(b)) => {
            n.as_f64() == Some(if *b { 1.0 } else { 0.0 })
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            matches!((b, s.as_str()), (true, "1") | (true, "true") | (false, "0") | (false, "false"))
        }
        _ => a == b,
    }
}

/// Order two values; NULL sorts first, numbers before non-numeric strings
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(s), Value::Number(n)) => match s.parse::<f64>() {
            Ok(parsed) => parsed.partial_cmp(&n.as_f64().unwrap_or(0.0)).unwrap_or(Ordering::Equal),
            Err(_) => Ordering::Greater,
        },
        (Value::Number(n), Value::String(s)) => match s.parse::<f64>() {
            Ok(parsed) => n.as_f64().unwrap_or(0.0).partial_cmp(&parsed).unwrap_or(Ordering::Equal),
            Err(_) => Ordering::Less,
        },
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Case-insensitive SQL LIKE with `%` and `_` wildcards
pub fn like_match(value: &Value, pattern: &Value) -> bool {
    let text = match value {
        Value::Null => return false,
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    };
    let pattern = match pattern {
        Value::String(s) => s.to_lowercase(),
        Value::Null => return false,
        other => other.to_string().to_lowercase(),
    };
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_chars(&text, &pattern)
}

fn like_chars(text: &[char], pattern: &[char]) -> bool {
    // Iterative wildcard match with single-star backtracking
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}
