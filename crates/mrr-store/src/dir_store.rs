use std::fs;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use mrr_core::scenario::parse_bug_id;
use mrr_core::{BenchmarkMetadata, MrrError, MrrResult, ScanEntry, Scenario, ScenarioStore, StoreScan};

const METADATA_FILE: &str = "metadata.json";
const SCENARIOS_DIR: &str = "scenarios";
const ARTIFACTS_DIR: &str = "artifacts";

/// Scenario store laid out as plain files under one root directory:
///
/// ```text
/// <root>/metadata.json
/// <root>/scenarios/<category>/<bug_id>.json
/// <root>/artifacts/{code,docs,logs}/...
/// ```
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open an existing store directory.
    pub fn open(root: &Path) -> MrrResult<Self> {
        if !root.is_dir() {
            return Err(MrrError::NotFound(format!(
                "scenario directory {}",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Prepare `root` for a fresh generation. A directory that already holds
    /// anything is refused unless `force` is set, in which case the previous
    /// store contents are removed.
    pub fn create(root: &Path, force: bool) -> MrrResult<Self> {
        if root.exists() {
            let occupied = fs::read_dir(root)?.next().is_some();
            if occupied && !force {
                return Err(MrrError::InvalidInput(format!(
                    "{} is not empty (use --force to overwrite)",
                    root.display()
                )));
            }
            if occupied {
                for dir in [SCENARIOS_DIR, ARTIFACTS_DIR] {
                    let path = root.join(dir);
                    if path.exists() {
                        fs::remove_dir_all(&path)?;
                    }
                }
                let metadata = root.join(METADATA_FILE);
                if metadata.exists() {
                    fs::remove_file(metadata)?;
                }
                tracing::info!(root = %root.display(), "cleared previous scenario store");
            }
        }
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scenario_path(&self, scenario: &Scenario) -> PathBuf {
        self.root
            .join(SCENARIOS_DIR)
            .join(scenario.category.as_str())
            .join(format!("{}.json", scenario.bug_id))
    }

    fn write_file(&self, relative: &Path, content: &str) -> MrrResult<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Store-relative files under `dir`, `/`-separated, sorted.
    fn files_under(&self, dir: &str) -> MrrResult<Vec<String>> {
        let mut out = Vec::new();
        let base = self.root.join(dir);
        if base.is_dir() {
            collect_files(&base, dir, &mut out)?;
        }
        out.sort();
        Ok(out)
    }
}

fn collect_files(dir: &Path, prefix: &str, out: &mut Vec<String>) -> MrrResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = format!("{prefix}/{name}");
        if entry.file_type()?.is_dir() {
            collect_files(&entry.path(), &relative, out)?;
        } else {
            out.push(relative);
        }
    }
    Ok(())
}

/// Artifact paths must stay inside `artifacts/`.
fn checked_artifact_path(path: &str) -> MrrResult<&Path> {
    let p = Path::new(path);
    let inside = p.starts_with(ARTIFACTS_DIR)
        && p.components().all(|c| matches!(c, Component::Normal(_)));
    if !inside {
        return Err(MrrError::InvalidInput(format!("artifact path {path} is outside artifacts/")));
    }
    Ok(p)
}

fn pretty_json<T: serde::Serialize>(value: &T) -> MrrResult<String> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

impl ScenarioStore for DirStore {
    fn metadata(&self) -> MrrResult<Option<BenchmarkMetadata>> {
        let path = self.root.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn write_metadata(&self, metadata: &BenchmarkMetadata) -> MrrResult<()> {
        self.write_file(Path::new(METADATA_FILE), &pretty_json(metadata)?)
    }

    fn write_scenario(&self, scenario: &Scenario) -> MrrResult<()> {
        if parse_bug_id(&scenario.bug_id).is_none() {
            return Err(MrrError::InvalidScenario {
                bug_id: scenario.bug_id.clone(),
                reason: "bug_id is not of the form mrr_<category>_<index>".into(),
            });
        }
        let path = self.scenario_path(scenario);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, pretty_json(scenario)?)?;
        Ok(())
    }

    fn load(&self, bug_id: &str) -> MrrResult<Option<Scenario>> {
        let Some((category, _)) = parse_bug_id(bug_id) else {
            return Ok(None);
        };
        let path = self
            .root
            .join(SCENARIOS_DIR)
            .join(category.as_str())
            .join(format!("{bug_id}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn scan(&self) -> MrrResult<StoreScan> {
        let mut entries = Vec::new();
        for location in self.files_under(SCENARIOS_DIR)? {
            if !location.ends_with(".json") {
                continue;
            }
            let mut parts = location.split('/');
            let category_dir = parts.nth(1).unwrap_or_default().to_string();
            let parsed = fs::read_to_string(self.root.join(&location))
                .map_err(|e| e.to_string())
                .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));
            if let Err(reason) = &parsed {
                tracing::debug!(%location, %reason, "unreadable scenario file");
            }
            entries.push(ScanEntry {
                location,
                category_dir,
                parsed,
            });
        }
        Ok(StoreScan { entries })
    }

    fn write_artifact(&self, path: &str, content: &str) -> MrrResult<()> {
        let relative = checked_artifact_path(path)?;
        self.write_file(relative, content)
    }

    fn artifact_exists(&self, path: &str) -> bool {
        checked_artifact_path(path)
            .map(|p| self.root.join(p).is_file())
            .unwrap_or(false)
    }

    fn fingerprint(&self) -> MrrResult<String> {
        let mut hasher = Sha256::new();
        for dir in [ARTIFACTS_DIR, SCENARIOS_DIR] {
            for location in self.files_under(dir)? {
                let content = fs::read(self.root.join(&location))?;
                hasher.update(location.as_bytes());
                hasher.update([0u8]);
                hasher.update((content.len() as u64).to_le_bytes());
                hasher.update(&content);
            }
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}
