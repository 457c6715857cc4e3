use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::domain::{CallContext, Value};
use crate::report::BugReport;

type Seeded = (Value, CallContext);

/// Shared accumulator every worker task writes into. All four maps are append-only;
/// the single mutex per map is the coarse lock the propagation engine is specified to
/// use instead of finer-grained synchronization.
#[derive(Default)]
pub struct DFBScanState {
    reachable_values_per_path: Mutex<FxHashMap<Seeded, Vec<Vec<Seeded>>>>,
    external_value_match: Mutex<FxHashMap<Seeded, FxHashSet<Seeded>>>,
    potential_buggy_paths: Mutex<FxHashMap<Value, FxHashMap<String, Vec<Value>>>>,
    bug_reports: Mutex<BTreeMap<u64, BugReport>>,
    next_report_id: AtomicU64,
}

impl DFBScanState {
    pub fn new() -> Self {
        DFBScanState::default()
    }

    pub fn update_reachable_values_per_path(&self, key: Seeded, frontier: Vec<Seeded>) {
        self.reachable_values_per_path.lock().entry(key).or_default().push(frontier);
    }

    pub fn reachable_frontiers(&self, key: &Seeded) -> Vec<Vec<Seeded>> {
        self.reachable_values_per_path.lock().get(key).cloned().unwrap_or_default()
    }

    pub fn update_external_value_match(&self, from: Seeded, to: Seeded) {
        self.external_value_match.lock().entry(from).or_default().insert(to);
    }

    pub fn external_matches(&self, key: &Seeded) -> FxHashSet<Seeded> {
        self.external_value_match.lock().get(key).cloned().unwrap_or_default()
    }

    pub fn update_potential_buggy_paths(&self, source: Value, path: Vec<Value>) {
        let dedup_key = path.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" -> ");
        self.potential_buggy_paths
            .lock()
            .entry(source)
            .or_default()
            .entry(dedup_key)
            .or_insert(path);
    }

    pub fn buggy_paths_for(&self, source: &Value) -> Vec<Vec<Value>> {
        self.potential_buggy_paths
            .lock()
            .get(source)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn update_bug_report(&self, report: BugReport) -> u64 {
        let id = self.next_report_id.fetch_add(1, Ordering::SeqCst);
        self.bug_reports.lock().insert(id, report);
        id
    }

    pub fn snapshot_reports(&self) -> BTreeMap<u64, BugReport> {
        self.bug_reports.lock().clone()
    }

    pub fn bug_report_count(&self) -> usize {
        self.bug_reports.lock().len()
    }
}
