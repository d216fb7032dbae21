use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use reqwest::Client;
use serde_json::Value;

use super::{PaperSource, RateLimiter};
use crate::models::{Paper, Source};

const BASE_URL: &str = "https://api.crossref.org/works";
// Crossref polite pool: identify the caller with a mailto User-Agent
const USER_AGENT: &str = "ResearchRadarBot/1.0 (mailto:research@example.com)";

pub struct CrossrefSearcher {
    client: Client,
    limiter: RateLimiter,
}

impl CrossrefSearcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            limiter: RateLimiter::new(std::time::Duration::from_secs(1)),
        })
    }

    async fn try_search(
        &self,
        query: &str,
        lookback_days: i64,
        max_results: usize,
    ) -> Result<Vec<Paper>> {
        let from_date = (Utc::now() - Duration::days(lookback_days))
            .format("%Y-%m-%d")
            .to_string();
        let filter = format!(
            "from-created-date:{},type:posted-content,type:journal-article",
            from_date
        );

        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("query", query),
                ("rows", &max_results.to_string()),
                ("sort", "created"),
                ("order", "desc"),
                ("filter", &filter),
            ])
            .send()
            .await
            .context("Failed to query Crossref API")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Crossref API returned error: {}", status);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse Crossref API response")?;

        let items = body["message"]["items"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        Ok(items.iter().filter_map(work_to_paper).collect())
    }
}

#[async_trait]
impl PaperSource for CrossrefSearcher {
    fn name(&self) -> &'static str {
        "Crossref"
    }

    async fn search(&mut self, query: &str, lookback_days: i64, max_results: usize) -> Vec<Paper> {
        self.limiter.wait().await;

        match self.try_search(query, lookback_days, max_results).await {
            Ok(papers) => papers,
            Err(e) => {
                eprintln!("Error searching Crossref: {:#}", e);
                Vec::new()
            }
        }
    }
}

/// Convert one Crossref work into a Paper; works without a DOI or title are
/// unaddressable and dropped.
fn work_to_paper(work: &Value) -> Option<Paper> {
    let doi = work["DOI"].as_str().filter(|d| !d.is_empty())?.to_string();

    let title = work["title"]
        .as_array()
        .map(|t| {
            t.iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    if title.trim().is_empty() {
        return None;
    }

    let authors: Vec<String> = work["author"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|a| {
                    let given = a["given"].as_str().unwrap_or("").trim();
                    let family = a["family"].as_str().unwrap_or("").trim();
                    match (given.is_empty(), family.is_empty()) {
                        (false, false) => Some(format!("{} {}", given, family)),
                        (true, false) => Some(family.to_string()),
                        _ => None,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let date = work["created"]["date-parts"]
        .as_array()
        .and_then(|dp| dp.first())
        .and_then(|dp| dp.as_array())
        .and_then(|parts| {
            let year = parts.first()?.as_i64()? as i32;
            let month = parts.get(1).and_then(|m| m.as_u64()).unwrap_or(1) as u32;
            let day = parts.get(2).and_then(|d| d.as_u64()).unwrap_or(1) as u32;
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .map(|d| format!("{}T00:00:00", d.format("%Y-%m-%d")))
        .unwrap_or_default();

    let mut abstract_text = work["abstract"].as_str().unwrap_or("").to_string();
    if abstract_text.is_empty() {
        abstract_text = work["subtitle"]
            .as_array()
            .map(|s| {
                s.iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
    }
    if abstract_text.is_empty() {
        abstract_text = "Abstract not available from Crossref.".to_string();
    }
    if abstract_text.contains('<') {
        abstract_text = strip_markup(&abstract_text);
    }

    Some(Paper {
        id: doi.clone(),
        url: format!("https://doi.org/{}", doi),
        doi: Some(doi),
        title: title.trim().to_string(),
        authors,
        abstract_text: abstract_text.trim().replace('\n', " "),
        date,
        source: Source::Crossref,
        relevance_score: None,
        relevance_reason: None,
        summary: None,
        practical_application: None,
    })
}

/// Crossref abstracts arrive as JATS XML snippets; drop the tags, keep the text.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_work_to_paper_basic() {
        let work = json!({
            "DOI": "10.1000/example.1",
            "title": ["Consumer Digital Twins"],
            "author": [
                {"given": "Grace", "family": "Hopper"},
                {"family": "Knuth"},
                {"given": "OnlyGiven"}
            ],
            "created": {"date-parts": [[2024, 3, 9]]},
            "abstract": "<jats:p>Plain text inside.</jats:p>"
        });
        let paper = work_to_paper(&work).unwrap();
        assert_eq!(paper.id, "10.1000/example.1");
        assert_eq!(paper.doi.as_deref(), Some("10.1000/example.1"));
        assert_eq!(paper.url, "https://doi.org/10.1000/example.1");
        assert_eq!(paper.authors, vec!["Grace Hopper", "Knuth"]);
        assert_eq!(paper.date, "2024-03-09T00:00:00");
        assert_eq!(paper.abstract_text, "Plain text inside.");
    }

    #[test]
    fn test_work_without_doi_is_dropped() {
        let work = json!({"title": ["No DOI"], "created": {"date-parts": [[2024]]}});
        assert!(work_to_paper(&work).is_none());
    }

    #[test]
    fn test_work_without_title_is_dropped() {
        let work = json!({"DOI": "10.1/x", "title": []});
        assert!(work_to_paper(&work).is_none());
    }

    #[test]
    fn test_partial_date_parts_default_to_first() {
        let work = json!({
            "DOI": "10.1/y",
            "title": ["Year Only"],
            "created": {"date-parts": [[2023]]}
        });
        let paper = work_to_paper(&work).unwrap();
        assert_eq!(paper.date, "2023-01-01T00:00:00");
    }

    #[test]
    fn test_missing_abstract_uses_placeholder() {
        let work = json!({"DOI": "10.1/z", "title": ["Quiet"]});
        let paper = work_to_paper(&work).unwrap();
        assert_eq!(paper.abstract_text, "Abstract not available from Crossref.");
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("<jats:p>Hello <jats:italic>world</jats:italic></jats:p>"),
            "Hello world"
        );
    }
}
