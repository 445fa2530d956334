use std::collections::BTreeSet;

use crate::error::MrrResult;
use crate::scenario::{BenchmarkMetadata, Scenario};

/// One scenario file found while scanning a store.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    /// Store-relative path, `/`-separated.
    pub location: String,
    /// Name of the category directory the file sits in.
    pub category_dir: String,
    pub parsed: Result<Scenario, String>,
}

#[derive(Debug, Clone, Default)]
pub struct StoreScan {
    pub entries: Vec<ScanEntry>,
}

impl StoreScan {
    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.entries.iter().filter_map(|e| e.parsed.as_ref().ok())
    }

    pub fn malformed(&self) -> impl Iterator<Item = (&ScanEntry, &str)> {
        self.entries
            .iter()
            .filter_map(|e| e.parsed.as_ref().err().map(|reason| (e, reason.as_str())))
    }

    /// Bug ids defined by more than one parsed file, sorted.
    pub fn duplicate_ids(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut dups = BTreeSet::new();
        for s in self.scenarios() {
            if !seen.insert(s.bug_id.as_str()) {
                dups.insert(s.bug_id.as_str());
            }
        }
        dups.into_iter().collect()
    }

    pub fn into_scenarios(self) -> Vec<Scenario> {
        self.entries.into_iter().filter_map(|e| e.parsed.ok()).collect()
    }
}

pub trait ScenarioStore {
    // Metadata
    fn metadata(&self) -> MrrResult<Option<BenchmarkMetadata>>;
    fn write_metadata(&self, metadata: &BenchmarkMetadata) -> MrrResult<()>;

    // Scenarios
    fn write_scenario(&self, scenario: &Scenario) -> MrrResult<()>;
    fn load(&self, bug_id: &str) -> MrrResult<Option<Scenario>>;
    /// Every scenario file, in sorted location order. A file that fails to
    /// parse is reported in its entry instead of aborting the scan.
    fn scan(&self) -> MrrResult<StoreScan>;

    // Artifacts
    fn write_artifact(&self, path: &str, content: &str) -> MrrResult<()>;
    fn artifact_exists(&self, path: &str) -> bool;

    /// Content digest over all scenario and artifact files.
    fn fingerprint(&self) -> MrrResult<String>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;
    use crate::error::MrrError;

    /// Map-backed store for unit tests.
    #[derive(Default)]
    pub struct MemStore {
        pub metadata: Mutex<Option<BenchmarkMetadata>>,
        pub files: Mutex<BTreeMap<String, String>>,
        pub artifacts: Mutex<BTreeMap<String, String>>,
    }

    impl MemStore {
        pub fn insert_raw(&self, location: &str, content: &str) {
            self.files
                .lock()
                .unwrap()
                .insert(location.to_string(), content.to_string());
        }
    }

    impl ScenarioStore for MemStore {
        fn metadata(&self) -> MrrResult<Option<BenchmarkMetadata>> {
            Ok(self.metadata.lock().unwrap().clone())
        }

        fn write_metadata(&self, metadata: &BenchmarkMetadata) -> MrrResult<()> {
            *self.metadata.lock().unwrap() = Some(metadata.clone());
            Ok(())
        }

        fn write_scenario(&self, scenario: &Scenario) -> MrrResult<()> {
            let location = format!("scenarios/{}/{}.json", scenario.category, scenario.bug_id);
            let json = serde_json::to_string_pretty(scenario)?;
            self.insert_raw(&location, &json);
            Ok(())
        }

        fn load(&self, bug_id: &str) -> MrrResult<Option<Scenario>> {
            Ok(self.scan()?.into_scenarios().into_iter().find(|s| s.bug_id == bug_id))
        }

        fn scan(&self) -> MrrResult<StoreScan> {
            let files = self.files.lock().map_err(|e| MrrError::Database(e.to_string()))?;
            let entries = files
                .iter()
                .map(|(location, content)| ScanEntry {
                    location: location.clone(),
                    category_dir: location.split('/').nth(1).unwrap_or_default().to_string(),
                    parsed: serde_json::from_str(content).map_err(|e| e.to_string()),
                })
                .collect();
            Ok(StoreScan { entries })
        }

        fn write_artifact(&self, path: &str, content: &str) -> MrrResult<()> {
            self.artifacts
                .lock()
                .unwrap()
                .insert(path.to_string(), content.to_string());
            Ok(())
        }

        fn artifact_exists(&self, path: &str) -> bool {
            self.artifacts.lock().unwrap().contains_key(path)
        }

        fn fingerprint(&self) -> MrrResult<String> {
            let files = self.files.lock().unwrap();
            let artifacts = self.artifacts.lock().unwrap();
            let bytes: usize = files.values().chain(artifacts.values()).map(String::len).sum();
            Ok(format!("mem-{}-{}-{bytes}", files.len(), artifacts.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MemStore;
    use super::*;
    use crate::scenario::Category;
    use crate::test_fixtures::scenario_with_context;

    #[test]
    fn test_duplicate_ids_across_category_dirs() {
        let store = MemStore::default();
        let s = scenario_with_context("mrr_logic_errors_0001", 12);
        store.write_scenario(&s).unwrap();
        store.write_scenario(&scenario_with_context("mrr_logic_errors_0002", 12)).unwrap();
        let mut moved = s.clone();
        moved.category = Category::MemoryIssues;
        let json = serde_json::to_string(&moved).unwrap();
        store.insert_raw("scenarios/memory_issues/mrr_logic_errors_0001.json", &json);

        let scan = store.scan().unwrap();
        assert_eq!(scan.scenarios().count(), 3);
        assert_eq!(scan.duplicate_ids(), vec!["mrr_logic_errors_0001"]);
    }

    #[test]
    fn test_no_duplicates() {
        let store = MemStore::default();
        for i in 1..=3 {
            store
                .write_scenario(&scenario_with_context(&format!("mrr_api_misuse_{i:04}"), 10))
                .unwrap();
        }
        assert!(store.scan().unwrap().duplicate_ids().is_empty());
    }
}
