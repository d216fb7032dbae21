use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Paper;

/// One sent paper. Extra metadata (currently just the title) is flattened
/// next to `sent_date` in the JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeenEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_date: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    papers: BTreeMap<String, SeenEntry>,
    #[serde(default)]
    last_run: Option<String>,
}

/// Durable record of which paper ids have already been emailed.
///
/// The whole store plus `last_run` is one JSON document, replaced atomically
/// on every mutation. Single-process use only; atomic replacement protects
/// against a crash mid-write, not concurrent writers.
pub struct StateStore {
    path: PathBuf,
    state: State,
}

impl StateStore {
    /// Load the store, creating an empty one (and its parent directory) when
    /// the file is missing. A corrupt file logs a warning and reinitializes
    /// rather than failing the run.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create state directory {}", parent.display())
                })?;
            }
            let store = Self {
                path,
                state: State::default(),
            };
            store.save()?;
            return Ok(store);
        }

        let state = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    eprintln!("Warning: Could not parse state file {}: {}", path.display(), e);
                    eprintln!("Initializing with empty state");
                    State::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Could not read state file {}: {}", path.display(), e);
                eprintln!("Initializing with empty state");
                State::default()
            }
        };

        Ok(Self { path, state })
    }

    pub fn is_seen(&self, paper_id: &str) -> bool {
        self.state.papers.contains_key(paper_id)
    }

    /// Keep only papers whose id is not in the store. Papers with an empty id
    /// are never tracked and always pass through; they can be resent on every
    /// run, which is accepted behavior.
    pub fn filter_unseen(&self, papers: Vec<Paper>) -> Vec<Paper> {
        papers
            .into_iter()
            .filter(|p| !self.state.papers.contains_key(&p.id))
            .collect()
    }

    /// Record the given ids as sent now, merge in any per-id metadata, update
    /// `last_run`, and persist. Must only be called after the digest publish
    /// has been confirmed.
    pub fn mark_as_sent(
        &mut self,
        paper_ids: &[String],
        metadata: &HashMap<String, BTreeMap<String, Value>>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        for id in paper_ids {
            if id.is_empty() {
                continue;
            }
            self.state.papers.insert(
                id.clone(),
                SeenEntry {
                    sent_date: Some(now.clone()),
                    extra: metadata.get(id).cloned().unwrap_or_default(),
                },
            );
        }

        self.state.last_run = Some(now);
        self.save()
    }

    /// Prune entries sent more than `days` ago. Entries with a missing or
    /// unparseable `sent_date` are retained forever: over-retention is safer
    /// than an accidental resend.
    pub fn cleanup_old_entries(&mut self, days: i64) -> Result<()> {
        let cutoff = Utc::now() - Duration::days(days);

        self.state.papers.retain(|_, entry| {
            let Some(sent_date) = entry.sent_date.as_deref() else {
                return true;
            };
            match parse_sent_date(sent_date) {
                Some(sent) => sent > cutoff,
                None => true,
            }
        });

        self.save()
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.state
            .last_run
            .as_deref()
            .and_then(parse_sent_date)
    }

    pub fn len(&self) -> usize {
        self.state.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.papers.is_empty()
    }

    /// Atomic write: serialize into a sibling temp file, then rename it over
    /// the canonical path. A failure at either step removes the temp file and
    /// propagates, leaving the previous document intact.
    fn save(&self) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let json =
            serde_json::to_string_pretty(&self.state).context("Failed to serialize state")?;

        if let Err(e) = fs::write(&tmp, &json) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to write {}", tmp.display()));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e)
                .with_context(|| format!("Failed to replace {}", self.path.display()));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Accept RFC 3339 as written by this implementation, plus the naive
/// isoformat timestamps found in state files written by older revisions.
fn parse_sent_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> StateStore {
        StateStore::open(dir.path().join("state/seen_ids.json")).unwrap()
    }

    fn papers(ids: &[&str]) -> Vec<Paper> {
        ids.iter()
            .map(|id| Paper::new(*id, format!("Paper {}", id), "https://example.org", Source::Arxiv))
            .collect()
    }

    #[test]
    fn test_open_creates_missing_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.is_empty());
        assert!(dir.path().join("state/seen_ids.json").exists());
    }

    #[test]
    fn test_mark_then_filter_suppresses_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seen.json");

        let mut store = StateStore::open(&path).unwrap();
        store
            .mark_as_sent(&["2401.1".to_string()], &HashMap::new())
            .unwrap();

        // Same id must be excluded on any later run reusing the store
        let reopened = StateStore::open(&path).unwrap();
        let unseen = reopened.filter_unseen(papers(&["2401.1", "2401.2"]));
        assert_eq!(unseen.len(), 1);
        assert_eq!(unseen[0].id, "2401.2");
    }

    #[test]
    fn test_unmarked_state_reproduces_same_unseen_set() {
        // Publish failure means mark_as_sent never ran; re-filtering the same
        // aggregate must yield the same result
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let first = store.filter_unseen(papers(&["a", "b"]));
        let second = store.filter_unseen(papers(&["a", "b"]));
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_empty_id_passes_filter() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store
            .mark_as_sent(&["tracked".to_string()], &HashMap::new())
            .unwrap();

        let unseen = store.filter_unseen(papers(&["", "tracked"]));
        assert_eq!(unseen.len(), 1);
        assert_eq!(unseen[0].id, "");
    }

    #[test]
    fn test_mark_as_sent_merges_metadata_and_last_run() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        let mut metadata = HashMap::new();
        metadata.insert(
            "x".to_string(),
            BTreeMap::from([("title".to_string(), Value::from("A Title"))]),
        );
        store.mark_as_sent(&["x".to_string()], &metadata).unwrap();

        assert!(store.is_seen("x"));
        assert!(store.last_run().is_some());
        assert_eq!(
            store.state.papers["x"].extra["title"],
            Value::from("A Title")
        );
    }

    #[test]
    fn test_cleanup_prunes_only_confirmed_old_entries() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        let old = (Utc::now() - Duration::days(31)).to_rfc3339();
        let recent = (Utc::now() - Duration::days(29)).to_rfc3339();
        store.state.papers.insert(
            "old".to_string(),
            SeenEntry { sent_date: Some(old), extra: BTreeMap::new() },
        );
        store.state.papers.insert(
            "recent".to_string(),
            SeenEntry { sent_date: Some(recent), extra: BTreeMap::new() },
        );
        store.state.papers.insert(
            "undated".to_string(),
            SeenEntry { sent_date: None, extra: BTreeMap::new() },
        );
        store.state.papers.insert(
            "garbled".to_string(),
            SeenEntry { sent_date: Some("not a date".to_string()), extra: BTreeMap::new() },
        );

        store.cleanup_old_entries(30).unwrap();

        assert!(!store.is_seen("old"));
        assert!(store.is_seen("recent"));
        assert!(store.is_seen("undated"));
        assert!(store.is_seen("garbled"));
    }

    #[test]
    fn test_corrupt_file_reinitializes_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seen.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = StateStore::open(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_crash_before_rename_leaves_canonical_file_intact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seen.json");

        let mut store = StateStore::open(&path).unwrap();
        store
            .mark_as_sent(&["committed".to_string()], &HashMap::new())
            .unwrap();

        // Simulate a crash between temp-file write and rename: a stray temp
        // file must not affect what a fresh open reads
        fs::write(path.with_extension("tmp"), "{ half-writ").unwrap();

        let reopened = StateStore::open(&path).unwrap();
        assert!(reopened.is_seen("committed"));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_parse_sent_date_accepts_legacy_isoformat() {
        // Older revisions wrote naive utcnow().isoformat() timestamps
        assert!(parse_sent_date("2024-06-01T12:00:00.123456").is_some());
        assert!(parse_sent_date("2024-06-01T12:00:00+00:00").is_some());
        assert!(parse_sent_date("June 1st").is_none());
    }
}
