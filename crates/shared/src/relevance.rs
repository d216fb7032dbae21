use std::cmp::Ordering;

use anyhow::Result;

use crate::gemini::GeminiClient;
use crate::models::Paper;

/// Two-threshold selection policy for scored papers.
#[derive(Debug, Clone, Copy)]
pub struct TierThresholds {
    /// Score at or above which a paper is always included.
    pub highly_relevant: f64,
    /// Floor below which a paper is rejected outright.
    pub also_relevant: f64,
    /// Target digest size; also-relevant papers top up toward it.
    pub min_total_papers: usize,
}

/// Scores papers 0-10 against a fixed business context via a Gemini judge.
pub struct RelevanceFilter {
    gemini: GeminiClient,
}

impl RelevanceFilter {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        // Low temperature: scoring should be as deterministic as the model allows
        Ok(Self {
            gemini: GeminiClient::new(api_key, model, 0.1)?,
        })
    }

    /// Score one paper. Never fails: an LLM error scores 0.0 with a
    /// diagnostic reason, so one bad call cannot abort the batch.
    pub async fn score_paper(&mut self, paper: &Paper, business_context: &str) -> (f64, String) {
        let abstract_text = if paper.abstract_text.is_empty() {
            "No abstract available"
        } else {
            &paper.abstract_text
        };

        let prompt = format!(
            r#"You are evaluating research papers for relevance to a specific business.

BUSINESS CONTEXT:
{business_context}

PAPER TO EVALUATE:
Title: {title}
Abstract: {abstract_text}

Task: Score this paper's relevance to the business on a scale of 0-10:
- 0-2: Completely irrelevant (e.g., manufacturing, IoT devices, infrastructure)
- 3-4: Tangentially related but not useful
- 5-6: Somewhat relevant, has some applicable concepts
- 7-8: Relevant, directly applicable to the business
- 9-10: Highly relevant, core to the business focus

CRITICAL EVALUATION CRITERIA:
1. Is this about CONSUMER/CUSTOMER research or industrial/manufacturing applications?
2. Does it involve behavioral modeling, preference prediction, or market research?
3. Does it use AI/LLM agents for understanding human behavior?
4. Is it about creating synthetic data/personas for consumer insights?

FORMAT YOUR RESPONSE EXACTLY AS:
SCORE: [number 0-10]
REASON: [one sentence explanation]

Example:
SCORE: 2
REASON: This paper is about aerostatic thrust bearings in manufacturing, which is completely irrelevant to consumer behavioral modeling.

Evaluate the paper now:"#,
            business_context = business_context,
            title = paper.title,
            abstract_text = abstract_text,
        );

        match self.gemini.generate(&prompt, 200).await {
            Ok(text) => parse_score_response(&text),
            Err(e) => {
                eprintln!("Error scoring paper '{}': {:#}", truncate(&paper.title, 50), e);
                (0.0, format!("Error: {}", e))
            }
        }
    }
}

/// Tolerant line-prefix scan of the judge's reply. LLM format compliance is
/// not guaranteed, so missing or malformed fields fall back to defaults
/// rather than failing.
pub fn parse_score_response(text: &str) -> (f64, String) {
    let mut score = 0.0;
    let mut reason = "Unknown".to_string();

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("SCORE:") {
            match rest.trim().parse::<f64>() {
                Ok(parsed) => score = parsed,
                Err(_) => eprintln!("Warning: Could not parse score '{}'", rest.trim()),
            }
        } else if let Some(rest) = line.strip_prefix("REASON:") {
            reason = rest.trim().to_string();
        }
    }

    (score, reason)
}

/// Apply the two-tier selection policy to scored papers.
///
/// All highly-relevant papers are kept. When they alone do not reach
/// `min_total_papers`, also-relevant papers (sorted by score descending) top
/// up the set until the minimum is met or the tier is exhausted. Papers below
/// the also-relevant floor are never included.
pub fn select_by_tier(mut scored: Vec<Paper>, thresholds: &TierThresholds) -> Vec<Paper> {
    scored.retain(|p| p.score() >= thresholds.also_relevant);
    scored.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(Ordering::Equal)
    });

    let highly_relevant = scored
        .partition_point(|p| p.score() >= thresholds.highly_relevant);
    let keep = highly_relevant.max(thresholds.min_total_papers.min(scored.len()));
    scored.truncate(keep);
    scored
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
