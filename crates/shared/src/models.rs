use std::fmt;

use serde::{Deserialize, Serialize};

/// Bibliographic source a paper was discovered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Arxiv,
    Crossref,
    SemanticScholar,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Arxiv => write!(f, "arxiv"),
            Source::Crossref => write!(f, "crossref"),
            Source::SemanticScholar => write!(f, "semantic_scholar"),
        }
    }
}

/// Deduplication identity for a paper.
///
/// arXiv and Semantic Scholar papers are keyed by their source-specific id;
/// Crossref papers are keyed by DOI. The two namespaces are deliberately kept
/// disjoint: a paper indexed by both arXiv and Crossref will appear twice in
/// an aggregate. Cross-namespace reconciliation is an explicit non-goal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaperKey {
    SourceId(String),
    Doi(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub doi: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// ISO-8601 date string, or empty when the source date could not be parsed.
    pub date: String,
    pub url: String,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practical_application: Option<String>,
}

impl Paper {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        source: Source,
    ) -> Self {
        Self {
            id: id.into(),
            doi: None,
            title: title.into(),
            authors: Vec::new(),
            abstract_text: String::new(),
            date: String::new(),
            url: url.into(),
            source,
            relevance_score: None,
            relevance_reason: None,
            summary: None,
            practical_application: None,
        }
    }

    /// Identity used for aggregate deduplication. `None` means the record is
    /// unaddressable and cannot be tracked.
    pub fn dedup_key(&self) -> Option<PaperKey> {
        match self.source {
            Source::Crossref => self
                .doi
                .as_deref()
                .filter(|d| !d.is_empty())
                .map(|d| PaperKey::Doi(d.to_string())),
            Source::Arxiv | Source::SemanticScholar => {
                if self.id.is_empty() {
                    None
                } else {
                    Some(PaperKey::SourceId(self.id.clone()))
                }
            }
        }
    }

    /// "A, B, C et al." preview for presentation; connectors keep the full list.
    pub fn author_preview(&self, limit: usize) -> String {
        if self.authors.is_empty() {
            return "Authors not available".to_string();
        }
        let mut preview = self.authors[..self.authors.len().min(limit)].join(", ");
        if self.authors.len() > limit {
            preview.push_str(" et al.");
        }
        preview
    }

    pub fn score(&self) -> f64 {
        self.relevance_score.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(source: Source) -> Paper {
        Paper::new("2401.12345", "A Paper", "https://example.org", source)
    }

    #[test]
    fn test_dedup_key_uses_id_for_arxiv() {
        let p = paper(Source::Arxiv);
        assert_eq!(
            p.dedup_key(),
            Some(PaperKey::SourceId("2401.12345".to_string()))
        );
    }

    #[test]
    fn test_dedup_key_uses_doi_for_crossref() {
        let mut p = paper(Source::Crossref);
        p.doi = Some("10.1000/xyz".to_string());
        assert_eq!(p.dedup_key(), Some(PaperKey::Doi("10.1000/xyz".to_string())));
    }

    #[test]
    fn test_crossref_without_doi_has_no_key() {
        // Crossref identity lives in the DOI namespace; an id alone is not enough
        let p = paper(Source::Crossref);
        assert_eq!(p.dedup_key(), None);
    }

    #[test]
    fn test_empty_id_has_no_key() {
        let p = Paper::new("", "Untracked", "https://example.org", Source::Arxiv);
        assert_eq!(p.dedup_key(), None);
    }

    #[test]
    fn test_id_and_doi_namespaces_are_distinct() {
        // The same string in both namespaces must not collide
        assert_ne!(
            PaperKey::SourceId("10.1000/xyz".to_string()),
            PaperKey::Doi("10.1000/xyz".to_string())
        );
    }

    #[test]
    fn test_author_preview_truncates() {
        let mut p = paper(Source::Arxiv);
        p.authors = vec![
            "Ada".to_string(),
            "Ben".to_string(),
            "Cam".to_string(),
            "Dee".to_string(),
        ];
        assert_eq!(p.author_preview(3), "Ada, Ben, Cam et al.");
        assert_eq!(p.author_preview(5), "Ada, Ben, Cam, Dee");
    }
}
