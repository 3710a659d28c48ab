//! Write run artifacts to the output directory.
//!
//! - `run.json`: the whole [`BatchRun`], readable by `triage stats`.
//! - `analyses.json`: the flat list of issue analyses in processing order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use triage_harness_core::models::IssueAnalysis;
use triage_harness_core::run::BatchRun;

pub const RUN_FILE: &str = "run.json";
pub const ANALYSES_FILE: &str = "analyses.json";

/// Paths of the files written by [`write_artifacts`].
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub run: PathBuf,
    pub analyses: PathBuf,
}

pub fn write_artifacts(run: &BatchRun, dir: &Path) -> Result<Artifacts> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let run_path = dir.join(RUN_FILE);
    let json = serde_json::to_string_pretty(run)?;
    std::fs::write(&run_path, &json)
        .with_context(|| format!("Failed to write {}", run_path.display()))?;

    let analyses: Vec<&IssueAnalysis> = run.analyses().collect();
    let analyses_path = dir.join(ANALYSES_FILE);
    let json = serde_json::to_string_pretty(&analyses)?;
    std::fs::write(&analyses_path, &json)
        .with_context(|| format!("Failed to write {}", analyses_path.display()))?;

    Ok(Artifacts {
        run: run_path,
        analyses: analyses_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_harness_core::models::RepoRef;

    #[test]
    fn test_writes_both_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let run = BatchRun::new(
            "run-1".into(),
            "key".into(),
            RepoRef::parse("acme/widgets").unwrap(),
            5,
            chrono::Utc::now(),
        );
        let artifacts = write_artifacts(&run, &tmp.path().join("out")).unwrap();

        let loaded: BatchRun =
            serde_json::from_str(&std::fs::read_to_string(&artifacts.run).unwrap()).unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(
            std::fs::read_to_string(&artifacts.analyses).unwrap().trim(),
            "[]"
        );
    }
}
