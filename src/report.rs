use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScanError};
use crate::extractors::BugKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantFunctions {
    pub paths: Vec<String>,
    pub names: Vec<String>,
    pub codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugReport {
    /// Stable identity for this report, independent of the map key it's persisted
    /// under (which is just insertion order).
    pub report_id: uuid::Uuid,
    pub bug_type: BugKind,
    pub buggy_value: String,
    pub relevant_functions: RelevantFunctions,
    pub explanation: String,
    pub is_human_confirmed_true: String,
    pub detected_at: chrono::DateTime<chrono::Utc>,
}

/// Serializes the accumulated reports to `detect_info.json` under `out_dir`, keyed by
/// a monotonic integer as text (matching the persisted report's on-disk shape), via
/// write-to-temp-then-rename so a reader never observes a half-written file.
pub fn write_detect_info(out_dir: &Path, reports: &BTreeMap<u64, BugReport>) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;
    let final_path = out_dir.join("detect_info.json");
    let tmp_path = out_dir.join("detect_info.json.tmp");

    let as_strings: BTreeMap<String, &BugReport> = reports.iter().map(|(k, v)| (k.to_string(), v)).collect();
    let body = serde_json::to_string_pretty(&as_strings).map_err(|e| ScanError::analysis(e.to_string()))?;

    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(body.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_and_round_trips_detect_info() {
        let dir = tempdir().unwrap();
        let mut reports = BTreeMap::new();
        reports.insert(
            0,
            BugReport {
                report_id: uuid::Uuid::new_v4(),
                bug_type: BugKind::Npd,
                buggy_value: "p@a.c:3".into(),
                relevant_functions: RelevantFunctions {
                    paths: vec!["a.c".into()],
                    names: vec!["f".into()],
                    codes: vec!["void f() {}".into()],
                },
                explanation: "p is dereferenced after being set to NULL".into(),
                is_human_confirmed_true: "unknown".into(),
                detected_at: chrono::Utc::now(),
            },
        );
        write_detect_info(dir.path(), &reports).unwrap();
        let raw = std::fs::read_to_string(dir.path().join("detect_info.json")).unwrap();
        let parsed: BTreeMap<String, serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key("0"));
    }

    #[test]
    fn report_survives_a_json_round_trip() {
        let original = BugReport {
            report_id: uuid::Uuid::new_v4(),
            bug_type: BugKind::Uaf,
            buggy_value: "q@b.c:7".into(),
            relevant_functions: RelevantFunctions {
                paths: vec!["b.c".into()],
                names: vec!["g".into()],
                codes: vec!["void g() {}".into()],
            },
            explanation: "q is used after free(q)".into(),
            is_human_confirmed_true: "unknown".into(),
            detected_at: chrono::Utc::now(),
        };
        let body = serde_json::to_string(&original).unwrap();
        let round_tripped: BugReport = serde_json::from_str(&body).unwrap();
        pretty_assertions::assert_eq!(original, round_tripped);
    }
}
