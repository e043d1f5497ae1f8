//! Scalar field lookup and display formatting for small service responses
//!
//! The auth and host-query endpoints return objects whose overall shape is not
//! fixed (the token may sit at the top level or under `data`, the upload
//! domains under `hosts[0].up`). Callers only ever need one field of a known
//! kind, so lookups search the parsed document breadth-first and return the
//! shallowest match.

use serde_json::Value;
use std::collections::VecDeque;

/// Parsed response document
#[derive(Debug, Clone)]
pub struct Fields {
    root: Value,
}

impl Fields {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw).map(|root| Self { root })
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.find(key, Value::is_string).and_then(Value::as_str)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.find(key, Value::is_i64).and_then(Value::as_i64)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.find(key, Value::is_boolean).and_then(Value::as_bool)
    }

    /// First element of the shallowest `key` array, when it is a string
    pub fn first_str_in(&self, key: &str) -> Option<&str> {
        self.find(key, Value::is_array)
            .and_then(|v| v.as_array())
            .and_then(|items| items.first())
            .and_then(Value::as_str)
    }

    fn find(&self, key: &str, accept: impl Fn(&Value) -> bool) -> Option<&Value> {
        let mut queue = VecDeque::from([&self.root]);

        while let Some(node) = queue.pop_front() {
            match node {
                Value::Object(map) => {
                    if let Some(hit) = map.get(key).filter(|v| accept(*v)) {
                        return Some(hit);
                    }
                    queue.extend(map.values());
                }
                Value::Array(items) => queue.extend(items.iter()),
                _ => {}
            }
        }

        None
    }
}

/// Re-indents raw JSON text for the terminal
///
/// Works on the token stream rather than a parsed value, so string contents
/// and escape sequences come out byte for byte and malformed bodies still
/// print. Two spaces per nesting level.
pub fn pretty(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    let newline = |out: &mut String, depth: usize| {
        out.push('\n');
        out.extend(std::iter::repeat_n("  ", depth));
    };

    for c in raw.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' | '[' => {
                out.push(c);
                depth += 1;
                newline(&mut out, depth);
            }
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                newline(&mut out, depth);
                out.push(c);
            }
            ',' => {
                out.push(c);
                newline(&mut out, depth);
            }
            ':' => out.push_str(": "),
            c if c.is_whitespace() => {}
            c => out.push(c),
        }
    }

    out
}
