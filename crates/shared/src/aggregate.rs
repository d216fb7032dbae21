use std::collections::HashSet;

use crate::models::{Paper, PaperKey};
use crate::sources::PaperSource;

/// Runs every query against every connector, deduplicates the union by
/// identity key, and returns the aggregate sorted by date descending.
pub struct Aggregator {
    sources: Vec<Box<dyn PaperSource>>,
}

impl Aggregator {
    pub fn new(sources: Vec<Box<dyn PaperSource>>) -> Self {
        Self { sources }
    }

    /// Queries are issued independently, never batched; one connector failing
    /// (which it reports as an empty result) does not affect the others.
    ///
    /// Sorting compares the raw date strings, so records with an empty date
    /// sink to the end. No truncation happens here; capping the digest is the
    /// caller's job.
    pub async fn search_all(
        &mut self,
        queries: &[String],
        lookback_days: i64,
        max_results: usize,
    ) -> Vec<Paper> {
        let mut all_papers: Vec<Paper> = Vec::new();
        let mut seen: HashSet<PaperKey> = HashSet::new();

        for source in &mut self.sources {
            println!("\nSearching {}...", source.name());
            for query in queries {
                let papers = source.search(query, lookback_days, max_results).await;
                let found = papers.len();

                for paper in papers {
                    // Unaddressable records cannot be deduplicated or tracked
                    let Some(key) = paper.dedup_key() else {
                        continue;
                    };
                    if seen.insert(key) {
                        all_papers.push(paper);
                    }
                }

                println!("  Query '{}': found {} papers", truncate(query, 60), found);
            }
        }

        all_papers.sort_by(|a, b| b.date.cmp(&a.date));
        all_papers
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
