//! Class index to label name mapping.
//!
//! YOLO exports store class names in the ONNX `names` metadata entry as a
//! Python dict literal, e.g. `{0: 'Tom', 1: 'Jerry'}`. A plain labels file
//! (one name per line, line number = class index) is accepted as fallback.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;

fn names_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#).expect("static names regex")
    })
}

/// Parse a `names` metadata value into a class-indexed label list.
///
/// Gaps in the index are filled with `class_<n>`.
pub fn parse_names_metadata(value: &str) -> Result<Vec<String>> {
    let mut entries: Vec<(usize, String)> = Vec::new();
    for caps in names_entry_regex().captures_iter(value) {
        let index: usize = caps[1]
            .parse()
            .with_context(|| format!("invalid class index '{}'", &caps[1]))?;
        let name = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        entries.push((index, name));
    }

    let max_index = entries
        .iter()
        .map(|(index, _)| *index)
        .max()
        .ok_or_else(|| anyhow!("no class names found in model metadata"))?;

    let mut names: Vec<String> = (0..=max_index).map(|i| format!("class_{}", i)).collect();
    for (index, name) in entries {
        names[index] = name;
    }
    Ok(names)
}

/// Load a labels file with one class name per line.
pub fn load_labels_file(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    let names: Vec<String> = raw
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    if names.is_empty() {
        return Err(anyhow!("labels file {} is empty", path.display()));
    }
    Ok(names)
}

/// Label for `class_id`, or `class_<id>` when the index is unknown.
pub fn label_for(names: &[String], class_id: usize) -> String {
    names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}
