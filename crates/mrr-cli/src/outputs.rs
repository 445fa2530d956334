//! Loading model outputs.
//!
//! Accepts a JSON array or JSON Lines. Parsing is lenient (comments and
//! trailing commas are fine) because outputs are often produced by ad-hoc
//! scripts. A record that cannot be read as a `ModelOutput` but still names
//! its `bug_id` is kept as malformed so the scenario is scored as a failure
//! rather than as missing.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json_lenient::Value;

use mrr_core::{insert_output, ModelOutput, OutputSlot};

#[derive(Debug, Default)]
pub struct LoadedOutputs {
    pub slots: HashMap<String, OutputSlot>,
    pub parsed: usize,
    pub malformed: usize,
    /// Records without a readable bug id.
    pub skipped: usize,
    pub duplicates: usize,
}

impl LoadedOutputs {
    fn insert(&mut self, bug_id: String, slot: OutputSlot) {
        let parsed = matches!(slot, OutputSlot::Parsed(_));
        if !insert_output(&mut self.slots, bug_id, slot) {
            self.duplicates += 1;
        } else if parsed {
            self.parsed += 1;
        } else {
            self.malformed += 1;
        }
    }

    fn skip(&mut self, record: usize, reason: &str) {
        self.skipped += 1;
        tracing::warn!(record, reason, "output record skipped");
    }

    fn accept(&mut self, record: usize, value: Value) {
        match serde_json_lenient::from_value::<ModelOutput>(value.clone()) {
            Ok(output) if !output.bug_id.trim().is_empty() => {
                self.insert(output.bug_id.clone(), OutputSlot::Parsed(output));
            }
            Ok(_) => self.skip(record, "empty bug_id"),
            Err(e) => match value.get("bug_id").and_then(Value::as_str) {
                Some(id) if !id.trim().is_empty() => {
                    self.insert(id.to_string(), OutputSlot::Malformed { reason: e.to_string() });
                }
                _ => self.skip(record, &e.to_string()),
            },
        }
    }
}

fn lenient<T: DeserializeOwned>(text: &str) -> serde_json_lenient::Result<T> {
    let mut de = serde_json_lenient::Deserializer::from_str(text);
    de.set_allow_comments(true);
    de.set_ignore_trailing_commas(true);
    let value = T::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// Best-effort `"bug_id": "..."` extraction from a line that is not JSON.
fn sniff_bug_id(line: &str) -> Option<String> {
    let rest = &line[line.find("\"bug_id\"")? + "\"bug_id\"".len()..];
    let rest = rest.trim_start().strip_prefix(':')?.trim_start().strip_prefix('"')?;
    let id = &rest[..rest.find('"')?];
    (!id.trim().is_empty()).then(|| id.to_string())
}

pub fn parse_outputs(text: &str) -> Result<LoadedOutputs> {
    let mut loaded = LoadedOutputs::default();
    let is_array = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("//"))
        .is_some_and(|l| l.starts_with('['));

    if is_array {
        let records: Vec<Value> =
            lenient(text).context("outputs file looks like a JSON array but does not parse")?;
        for (i, value) in records.into_iter().enumerate() {
            loaded.accept(i + 1, value);
        }
        return Ok(loaded);
    }

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        match lenient::<Value>(line) {
            Ok(value) => loaded.accept(i + 1, value),
            Err(e) => match sniff_bug_id(line) {
                Some(id) => loaded.insert(id, OutputSlot::Malformed { reason: e.to_string() }),
                None => loaded.skip(i + 1, &e.to_string()),
            },
        }
    }
    Ok(loaded)
}

pub fn load_outputs(path: &Path) -> Result<LoadedOutputs> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let loaded = parse_outputs(&text).with_context(|| format!("parsing {}", path.display()))?;
    tracing::info!(
        parsed = loaded.parsed,
        malformed = loaded.malformed,
        skipped = loaded.skipped,
        "model outputs loaded"
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_array_with_comments_and_trailing_commas() {
        let text = r#"
// produced by the harness
[
  {"bug_id": "mrr_logic_errors_0001", "retrieved_files": ["a.py", "b.py",], "tests_passed": true},
  {"bug_id": "mrr_logic_errors_0002", "retrieved_files": [],},
]
"#;
        let loaded = parse_outputs(text).unwrap();
        assert_eq!(loaded.parsed, 2);
        match &loaded.slots["mrr_logic_errors_0001"] {
            OutputSlot::Parsed(o) => {
                assert_eq!(o.retrieved_files, vec!["a.py", "b.py"]);
                assert_eq!(o.tests_passed, Some(true));
            }
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn test_jsonl_with_malformed_lines() {
        let text = concat!(
            "{\"bug_id\": \"mrr_api_misuse_0001\", \"retrieved_files\": [\"x.go\"]}\n",
            "\n",
            "{\"bug_id\": \"mrr_api_misuse_0002\", \"retrieved_files\": \"not-a-list\"}\n",
            "{\"bug_id\": \"mrr_api_misuse_0003\", \"retrieved_files\": [\n",
            "garbage without id\n",
            "{\"retrieved_files\": []}\n",
        );
        let loaded = parse_outputs(text).unwrap();
        assert_eq!(loaded.parsed, 1);
        assert_eq!(loaded.malformed, 2);
        assert_eq!(loaded.skipped, 2);
        assert!(matches!(
            loaded.slots["mrr_api_misuse_0002"],
            OutputSlot::Malformed { .. }
        ));
        assert!(matches!(
            loaded.slots["mrr_api_misuse_0003"],
            OutputSlot::Malformed { .. }
        ));
    }

    #[test]
    fn test_first_duplicate_wins() {
        let text = concat!(
            "{\"bug_id\": \"mrr_memory_issues_0001\", \"iterations\": 2}\n",
            "{\"bug_id\": \"mrr_memory_issues_0001\", \"iterations\": 9}\n",
        );
        let loaded = parse_outputs(text).unwrap();
        assert_eq!(loaded.duplicates, 1);
        match &loaded.slots["mrr_memory_issues_0001"] {
            OutputSlot::Parsed(o) => assert_eq!(o.iterations, Some(2)),
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn test_broken_array_is_an_error() {
        assert!(parse_outputs("[{\"bug_id\": \"x\"").is_err());
    }

    #[test]
    fn test_sniff_bug_id() {
        assert_eq!(
            sniff_bug_id(r#"{"bug_id" : "mrr_syntax_errors_0004", oops"#).as_deref(),
            Some("mrr_syntax_errors_0004")
        );
        assert_eq!(sniff_bug_id("no id here"), None);
        assert_eq!(sniff_bug_id(r#"{"bug_id": ""}"#), None);
    }

    #[test]
    fn test_load_outputs_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs.jsonl");
        std::fs::write(&path, "{\"bug_id\": \"mrr_logic_errors_0001\"}\n").unwrap();
        let loaded = load_outputs(&path).unwrap();
        assert_eq!(loaded.parsed, 1);
        assert!(load_outputs(&dir.path().join("missing.jsonl")).is_err());
    }
}
