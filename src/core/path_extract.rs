//! Finds every occurrence of a key anywhere in a JSON document.

use crate::domain::model::{cell_text, ColumnTable, PathMatch};
use crate::utils::error::Result;
use serde_json::Value;
use std::path::Path;

/// All `(path, value)` pairs whose final key equals `key`, in document order.
///
/// A match does not stop the walk: a nested key of the same name inside a
/// matched value is reported as well.
pub fn extract_key_paths(document: &Value, key: &str) -> Vec<PathMatch> {
    let mut matches = Vec::new();
    walk(document, key, "", &mut matches);
    matches
}

fn walk(value: &Value, key: &str, path: &str, matches: &mut Vec<PathMatch>) {
    match value {
        Value::Object(obj) => {
            for (name, child) in obj {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", path, name)
                };
                if name == key {
                    matches.push(PathMatch {
                        path: child_path.clone(),
                        value: cell_text(child),
                    });
                }
                walk(child, key, &child_path, matches);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, key, &format!("{}[{}]", path, i), matches);
            }
        }
        _ => {}
    }
}

/// `path,value` table for writing to CSV.
pub fn matches_to_table(matches: &[PathMatch]) -> Result<ColumnTable> {
    let mut table = ColumnTable::new(vec!["path".to_string(), "value".to_string()]);
    for m in matches {
        table.push_row(vec![m.path.clone(), m.value.clone()])?;
    }
    Ok(table)
}

/// `<input stem>_<key>.csv`, next to the input file.
pub fn default_output_path(input: &str, key: &str) -> String {
    let path = Path::new(input);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let file_name = format!("{}_{}.csv", stem, key);
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.join(file_name).to_string_lossy().into_owned(),
        None => file_name,
    }
}
