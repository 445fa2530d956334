//! Hand-built scenarios shared by unit tests.

use chrono::{TimeZone, Utc};

use crate::scenario::*;

/// A valid scenario with `files` context entries. The first two entries are
/// must-find, the next two should-find, the rest low relevance.
pub fn scenario_with_context(bug_id: &str, files: usize) -> Scenario {
    let (category, _) = parse_bug_id(bug_id).expect("fixture bug id");
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();

    let scattered_context: Vec<ContextFile> = (0..files)
        .map(|i| ContextFile {
            file_path: format!("app/module_{i}.py"),
            relevance: match i {
                0 | 1 => Relevance::Critical,
                2 | 3 => Relevance::High,
                _ => Relevance::Low,
            },
            kind: ContextKind::Code,
            modified_at: start,
            summary: format!("module {i}"),
        })
        .collect();

    Scenario {
        bug_id: bug_id.to_string(),
        category,
        language: Language::Python,
        title: "Off-by-one error in loop boundary".into(),
        description: "Last page of results is processed twice.".into(),
        symptoms: vec!["duplicate rows in export".into()],
        complexity: Complexity {
            spatial_files: files,
            temporal_months: 6,
            obfuscation: Obfuscation::Medium,
        },
        scattered_context,
        temporal_info: TemporalInfo {
            start,
            end,
            bug_introduced: start,
            commit_count: 12,
        },
        ground_truth: GroundTruth {
            root_cause: "The loop uses an inclusive upper bound".into(),
            root_cause_keywords: vec!["off-by-one".into(), "loop".into(), "boundary".into()],
            fix_location: FixLocation {
                file: "app/module_0.py".into(),
                line_start: 40,
                line_end: 44,
            },
            fix_description: "Use an exclusive upper bound".into(),
            must_find_files: vec!["app/module_0.py".into(), "app/module_1.py".into()],
            should_find_files: vec!["app/module_2.py".into(), "app/module_3.py".into()],
            test_name: "test_pagination_last_page".into(),
        },
        artifacts: Vec::new(),
    }
}
