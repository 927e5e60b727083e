//! JSON renderers for command results.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Pretty JSON for `value`, newline terminated.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value).context("failed to format JSON")?;
    text.push('\n');
    Ok(text)
}

/// Write `value` as JSON to `path`, or to stdout when no path is given.
pub(crate) fn emit_json<T: Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    let text = to_json(value)?;
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emit_json_writes_files() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("report.json");
        emit_json(&json!({ "removed": 2 }), Some(&path))?;
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(written["removed"], 2);
        Ok(())
    }

    #[test]
    fn to_json_is_newline_terminated() -> Result<()> {
        assert!(to_json(&json!([1, 2]))?.ends_with("]\n"));
        Ok(())
    }
}
