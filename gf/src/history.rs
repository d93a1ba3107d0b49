//! History ledger - append-only record of query -> plan pairs
//!
//! One mutex guards the in-memory log. Every append persists the whole log
//! synchronously while holding that lock; a failed write is logged and the
//! in-memory entry stays, so the running session never loses history.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::plan::{Plan, Query, Step};

/// Persistence failures, logged and never surfaced to the operator
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One query paired with the plan produced for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: Query,
    pub response: Vec<Step>,
}

/// Concurrency-safe, durable ledger of history entries
#[derive(Debug)]
pub struct HistoryLedger {
    entries: Mutex<Vec<HistoryEntry>>,
    /// Backing file; `None` keeps the ledger in memory only
    path: Option<PathBuf>,
}

impl HistoryLedger {
    /// Ledger with no backing file
    pub fn in_memory() -> Self {
        debug!("HistoryLedger::in_memory: called");
        Self {
            entries: Mutex::new(Vec::new()),
            path: None,
        }
    }

    /// Open the ledger persisted at `path`
    ///
    /// A missing or unparseable file yields an empty ledger; startup never
    /// fails because of history.
    pub fn load_on_start(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(path = %path.display(), "HistoryLedger::load_on_start: called");
        let entries = match read_entries(&path) {
            Ok(entries) => {
                info!(count = entries.len(), path = %path.display(), "Loaded history");
                entries
            }
            Err(HistoryError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("HistoryLedger::load_on_start: no history file yet");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Ignoring unreadable history file");
                Vec::new()
            }
        };

        Self {
            entries: Mutex::new(entries),
            path: Some(path),
        }
    }

    /// Append one entry and persist the ledger
    pub fn append(&self, query: Query, plan: &Plan) {
        debug!(%query, steps = plan.len(), "HistoryLedger::append: called");
        let mut entries = self.lock();
        entries.push(HistoryEntry {
            query,
            response: plan.steps().to_vec(),
        });

        if let Some(path) = &self.path
            && let Err(e) = write_entries(path, &entries)
        {
            warn!(error = %e, path = %path.display(), "Failed to persist history");
        }
    }

    /// Human-readable rendering of every entry in insertion order
    pub fn render(&self) -> String {
        debug!("HistoryLedger::render: called");
        let entries = self.lock();
        if entries.is_empty() {
            return "No history available.".to_string();
        }

        let mut out = String::new();
        for (i, entry) in entries.iter().enumerate() {
            let _ = writeln!(out, "Query {}: {}", i + 1, entry.query);
            for step in &entry.response {
                let _ = writeln!(out, "  Step {}: {}", step.number, step.description);
            }
            out.push('\n');
        }
        out
    }

    /// Snapshot of the current entries
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        // Entries are only ever pushed whole, so a poisoned lock still guards a valid log
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_entries(path: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

fn write_entries(path: &Path, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn query(text: &str) -> Query {
        Query::new(text).unwrap()
    }

    fn one_step_plan() -> Plan {
        Plan::new(vec![Step::new(1, "list files", "show contents", Some("ls"))]).unwrap()
    }

    #[test]
    fn test_render_empty_ledger() {
        let ledger = HistoryLedger::in_memory();
        assert_eq!(ledger.render(), "No history available.");
    }

    #[test]
    fn test_render_lists_entries_in_order() {
        let ledger = HistoryLedger::in_memory();
        ledger.append(query("list files"), &one_step_plan());
        ledger.append(query("noop"), &Plan::empty());

        let rendered = ledger.render();
        assert_eq!(
            rendered,
            "Query 1: list files\n  Step 1: list files\n\nQuery 2: noop\n\n"
        );
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("history.json");

        let ledger = HistoryLedger::load_on_start(&path);
        ledger.append(query("q1"), &one_step_plan());
        ledger.append(query("q2"), &Plan::empty());
        let before = ledger.entries();

        let reloaded = HistoryLedger::load_on_start(&path);
        assert_eq!(reloaded.entries(), before);
        assert_eq!(reloaded.entries()[0].query.as_str(), "q1");
        assert!(reloaded.entries()[1].response.is_empty());
    }

    #[test]
    fn test_persisted_format() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("history.json");
        let ledger = HistoryLedger::load_on_start(&path);
        ledger.append(query("list files"), &one_step_plan());

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json[0]["query"], "list files");
        assert_eq!(json[0]["response"][0]["step"], 1);
        assert_eq!(json[0]["response"][0]["reason"], "show contents");
        assert_eq!(json[0]["response"][0]["command"], "ls");
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp = tempdir().unwrap();
        let ledger = HistoryLedger::load_on_start(temp.path().join("nope.json"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();

        let ledger = HistoryLedger::load_on_start(&path);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_append_survives_write_failure() {
        let temp = tempdir().unwrap();
        // A directory where the file should be makes every write fail
        let path = temp.path().join("history.json");
        fs::create_dir_all(path.with_extension("json.tmp")).unwrap();

        let ledger = HistoryLedger::load_on_start(&path);
        ledger.append(query("still here"), &one_step_plan());

        assert_eq!(ledger.len(), 1);
        assert!(ledger.render().contains("still here"));
    }

    #[test]
    fn test_concurrent_appends_and_renders() {
        let ledger = Arc::new(HistoryLedger::in_memory());
        let mut handles = Vec::new();

        for t in 0..4 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    ledger.append(query(&format!("t{}-{}", t, i)), &Plan::empty());
                    let _ = ledger.render();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ledger.len(), 100);
        // Each thread's own entries keep their relative order
        let entries = ledger.entries();
        for t in 0..4 {
            let mine: Vec<String> = entries
                .iter()
                .map(|e| e.query.as_str().to_string())
                .filter(|q| q.starts_with(&format!("t{}-", t)))
                .collect();
            let expected: Vec<String> = (0..25).map(|i| format!("t{}-{}", t, i)).collect();
            assert_eq!(mine, expected);
        }
    }

    #[test]
    fn test_append_then_render_ends_with_entry() {
        let ledger = HistoryLedger::in_memory();
        ledger.append(query("first"), &Plan::empty());
        ledger.append(query("last one"), &one_step_plan());

        let rendered = ledger.render();
        let last_group = rendered.trim_end().rsplit("\n\n").next().unwrap();
        assert!(last_group.starts_with("Query 2: last one"));
    }
}
