use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{PaperSource, RateLimiter};
use crate::models::{Paper, Source};

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(default)]
    paper_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    r#abstract: Option<String>,
    #[serde(default)]
    authors: Vec<ItemAuthor>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemAuthor {
    #[serde(default)]
    name: Option<String>,
}

pub struct SemanticScholarSearcher {
    client: Client,
    limiter: RateLimiter,
}

impl SemanticScholarSearcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            // Unauthenticated quota is 100 requests per 5 minutes
            limiter: RateLimiter::new(std::time::Duration::from_secs(1)),
        })
    }

    async fn try_search(
        &self,
        query: &str,
        lookback_days: i64,
        max_results: usize,
    ) -> Result<Vec<Paper>> {
        let cutoff = (Utc::now() - Duration::days(lookback_days)).date_naive();
        let year_filter = format!("{}-", cutoff.year());

        let response = self
            .client
            .get(format!("{}/paper/search", BASE_URL))
            .query(&[
                ("query", query),
                ("year", &year_filter),
                ("limit", &max_results.to_string()),
                ("fields", "paperId,title,abstract,authors,publicationDate,url"),
            ])
            .send()
            .await
            .context("Failed to query Semantic Scholar API")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Semantic Scholar API returned error: {}", status);
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse Semantic Scholar API response")?;

        let mut papers = Vec::new();
        for item in body.data {
            // The year filter is coarse; enforce the exact window here. Items
            // without a parseable publication date cannot be windowed and are
            // skipped.
            let Some(date_str) = item.publication_date.as_deref() else {
                continue;
            };
            let Ok(pub_date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
                continue;
            };
            if pub_date < cutoff {
                continue;
            }

            if item.paper_id.is_empty() {
                continue;
            }

            papers.push(Paper {
                id: format!("s2:{}", item.paper_id),
                doi: None,
                title: item.title,
                authors: item.authors.into_iter().filter_map(|a| a.name).collect(),
                abstract_text: item.r#abstract.unwrap_or_default(),
                date: date_str.to_string(),
                url: item.url.unwrap_or_default(),
                source: Source::SemanticScholar,
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
impl PaperSource for SemanticScholarSearcher {
    fn name(&self) -> &'static str {
        "Semantic Scholar"
    }

    async fn search(&mut self, query: &str, lookback_days: i64, max_results: usize) -> Vec<Paper> {
        self.limiter.wait().await;

        match self.try_search(query, lookback_days, max_results).await {
            Ok(papers) => papers,
            Err(e) => {
                eprintln!("Error searching Semantic Scholar: {:#}", e);
                Vec::new()
            }
        }
    }
}
