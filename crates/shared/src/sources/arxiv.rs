use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{PaperSource, RateLimiter};
use crate::models::{Paper, Source};

const BASE_URL: &str = "http://export.arxiv.org/api/query";

/// Atom feed subset returned by the arXiv query API.
#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<EntryAuthor>,
}

#[derive(Debug, Deserialize)]
struct EntryAuthor {
    #[serde(default)]
    name: String,
}

pub struct ArxivSearcher {
    client: Client,
    limiter: RateLimiter,
}

impl ArxivSearcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            // arXiv asks for no more than one request every 3 seconds
            limiter: RateLimiter::new(std::time::Duration::from_secs(3)),
        })
    }

    async fn try_search(
        &self,
        query: &str,
        lookback_days: i64,
        max_results: usize,
    ) -> Result<Vec<Paper>> {
        let search_query = format!("all:{}", query);
        let url = format!(
            "{}?search_query={}&start=0&max_results={}&sortBy=submittedDate&sortOrder=descending",
            BASE_URL,
            urlencoding::encode(&search_query),
            max_results
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to query arXiv API")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("arXiv API returned error: {}", status);
        }

        let body = response
            .text()
            .await
            .context("Failed to read arXiv response body")?;

        let feed: Feed =
            quick_xml::de::from_str(&body).context("Failed to parse arXiv Atom feed")?;

        let cutoff = Utc::now() - Duration::days(lookback_days);

        let mut papers = Vec::new();
        for entry in feed.entries {
            let published = parse_date(&entry.published);

            // Unknown dates stay in; only confirmed-old entries are dropped
            if let Some(date) = published {
                if date < cutoff {
                    continue;
                }
            }

            let arxiv_id = extract_arxiv_id(&entry.id);
            if arxiv_id.is_empty() {
                continue;
            }

            papers.push(Paper {
                id: arxiv_id,
                doi: None,
                title: clean_text(&entry.title),
                authors: entry
                    .authors
                    .into_iter()
                    .map(|a| a.name)
                    .filter(|n| !n.is_empty())
                    .collect(),
                abstract_text: clean_text(&entry.summary),
                date: published
                    .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
                    .unwrap_or_default(),
                url: entry.id,
                source: Source::Arxiv,
                relevance_score: None,
                relevance_reason: None,
                summary: None,
                practical_application: None,
            });
        }

        Ok(papers)
    }
}

#[async_trait]
impl PaperSource for ArxivSearcher {
    fn name(&self) -> &'static str {
        "arXiv"
    }

    async fn search(&mut self, query: &str, lookback_days: i64, max_results: usize) -> Vec<Paper> {
        self.limiter.wait().await;

        match self.try_search(query, lookback_days, max_results).await {
            Ok(papers) => papers,
            Err(e) => {
                eprintln!("Error searching arXiv: {:#}", e);
                Vec::new()
            }
        }
    }
}

fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    if date_str.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(date_str)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Extract the bare arXiv id from an abs URL, dropping the version suffix:
/// `http://arxiv.org/abs/2301.12345v2` -> `2301.12345`.
fn extract_arxiv_id(url: &str) -> String {
    let Some(last) = url.rsplit('/').next() else {
        return String::new();
    };
    match last.rfind('v') {
        Some(pos) if last[pos + 1..].chars().all(|c| c.is_ascii_digit()) && pos + 1 < last.len() => {
            last[..pos].to_string()
        }
        _ => last.to_string(),
    }
}

fn clean_text(text: &str) -> String {
    text.replace('\n', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_arxiv_id_strips_version() {
        assert_eq!(
            extract_arxiv_id("http://arxiv.org/abs/2301.12345v1"),
            "2301.12345"
        );
        assert_eq!(
            extract_arxiv_id("http://arxiv.org/abs/2301.12345v12"),
            "2301.12345"
        );
    }

    #[test]
    fn test_extract_arxiv_id_without_version() {
        assert_eq!(
            extract_arxiv_id("http://arxiv.org/abs/2301.12345"),
            "2301.12345"
        );
    }

    #[test]
    fn test_extract_arxiv_id_old_style() {
        // Pre-2007 ids embed the archive name; the 'v' check must not eat it
        assert_eq!(extract_arxiv_id("http://arxiv.org/abs/cs.CV-9901001"), "cs.CV-9901001");
    }

    #[test]
    fn test_parse_date_rfc3339() {
        let parsed = parse_date("2024-01-02T03:04:05Z").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2024-01-02");
    }

    #[test]
    fn test_parse_date_garbage_is_none() {
        assert_eq!(parse_date("next tuesday"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Deep\n  Learning \n"), "Deep Learning");
    }

    #[test]
    fn test_atom_feed_parsing() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query Results</title>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <title>Synthetic Consumers
 via LLM Agents</title>
    <summary>We study synthetic consumer panels.</summary>
    <published>2024-01-01T00:00:00Z</published>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
  </entry>
</feed>"#;
        let feed: Feed = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(feed.entries.len(), 1);
        let entry = &feed.entries[0];
        assert_eq!(entry.published, "2024-01-01T00:00:00Z");
        assert_eq!(entry.authors.len(), 2);
        assert_eq!(extract_arxiv_id(&entry.id), "2401.00001");
        assert_eq!(clean_text(&entry.title), "Synthetic Consumers via LLM Agents");
    }
}
