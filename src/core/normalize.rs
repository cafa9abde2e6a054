//! Dotted-path normalization of nested JSON, and path lookup in the same syntax.

use crate::domain::model::FlatRow;
use serde_json::Value;

/// Flattens nested objects into `parent.child` keys.
///
/// Arrays are kept whole as cell values; an empty nested object contributes
/// no key at all. A non-object resource becomes an empty row.
pub fn normalize_resource(resource: &Value) -> FlatRow {
    let mut row = FlatRow::new();
    if let Value::Object(obj) = resource {
        flatten_into(&mut row, None, obj);
    }
    row
}

fn flatten_into(row: &mut FlatRow, prefix: Option<&str>, obj: &serde_json::Map<String, Value>) {
    for (key, value) in obj {
        let name = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten_into(row, Some(&name), nested),
            other => {
                row.insert(name, other.clone());
            }
        }
    }
}

/// Normalizes every resource and returns the rows with the union of their
/// keys in first-seen order.
pub fn normalize_all(resources: &[Value]) -> (Vec<FlatRow>, Vec<String>) {
    let mut schema: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let rows: Vec<FlatRow> = resources
        .iter()
        .map(|resource| {
            let row = normalize_resource(resource);
            for key in row.keys() {
                if seen.insert(key.clone()) {
                    schema.push(key.clone());
                }
            }
            row
        })
        .collect();

    (rows, schema)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut key = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        _ => return None,
                    }
                }
                segments.push(Segment::Index(digits.parse().ok()?));
            }
            other => key.push(other),
        }
    }
    if !key.is_empty() {
        segments.push(Segment::Key(key));
    }

    Some(segments)
}

/// Resolves a path such as `total[0].amount.value` against a JSON value.
///
/// Returns `None` for malformed paths and for any step that does not exist.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    parse_path(path)?
        .into_iter()
        .try_fold(value, |current, segment| match segment {
            Segment::Key(k) => current.get(k.as_str()),
            Segment::Index(i) => current.get(i),
        })
}
