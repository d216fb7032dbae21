use anyhow::Result;

use crate::gemini::GeminiClient;

/// Generates source-agnostic boolean search queries with an LLM, falling back
/// to a static list whenever generation fails. Query generation is an
/// enhancement stage: it must never abort the run.
pub struct QueryGenerator {
    gemini: GeminiClient,
}

impl QueryGenerator {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        Ok(Self {
            gemini: GeminiClient::new(api_key, model, 0.3)?,
        })
    }

    pub async fn generate_queries(
        &mut self,
        research_focus: &str,
        num_queries: usize,
        exclude_topics: &[String],
    ) -> Vec<String> {
        let exclude = if exclude_topics.is_empty() {
            "None".to_string()
        } else {
            exclude_topics.join(", ")
        };

        let prompt = format!(
            r#"You are a research librarian helping to find academic papers.

RESEARCH FOCUS:
{research_focus}

TOPICS TO EXPLICITLY EXCLUDE:
{exclude}

Generate {num_queries} search queries for arXiv and academic databases. Each query should:
1. Be FOCUSED but not overly restrictive - aim for 2-3 core concepts with OR alternatives
2. Use quoted phrases for multi-word concepts (e.g., "digital twin", "synthetic users")
3. Combine concepts with AND, use OR for synonyms/alternatives
4. Use NOT to exclude major irrelevant topics (manufacturing, IoT, infrastructure)
5. Keep queries SIMPLE - too many AND conditions will find nothing

CRITICAL: The queries must be balanced - specific enough to filter out irrelevant papers, but broad enough to actually find papers.

Format: Return ONLY the queries, one per line, with no numbering or explanation.
Use arXiv search syntax: quotes for phrases, AND, OR, NOT for operators.

Example GOOD queries (focused but findable):
"digital twin" AND consumer NOT (manufacturing OR IoT)
"synthetic users" AND (behavior OR preference)
"LLM agent" AND (consumer OR customer OR marketing)

Example BAD queries (too restrictive, will find nothing):
"digital twin" AND consumer AND "behavioral model" AND AI AND marketing NOT manufacturing

Generate {num_queries} balanced queries now:"#,
        );

        match self.gemini.generate(&prompt, 1000).await {
            Ok(text) => {
                let queries = parse_query_lines(&text, num_queries);
                if queries.is_empty() {
                    eprintln!("Warning: No valid queries generated, using fallback");
                    fallback_queries()
                } else {
                    println!("Generated {} search queries using LLM", queries.len());
                    queries
                }
            }
            Err(e) => {
                eprintln!("Error generating queries with LLM: {:#}", e);
                eprintln!("Falling back to default queries");
                fallback_queries()
            }
        }
    }
}

/// One query per reply line; numbering prefixes are stripped, comment lines
/// and fragments too short to be real queries are skipped.
fn parse_query_lines(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            line.trim_start_matches(|c: char| {
                c.is_ascii_digit() || c == '.' || c == '-' || c == ')' || c == ' '
            })
        })
        .filter(|cleaned| cleaned.len() > 10)
        .map(str::to_string)
        .take(limit)
        .collect()
}

/// Static queries used when LLM generation is disabled or fails.
pub fn fallback_queries() -> Vec<String> {
    [
        r#""digital twin" AND (consumer OR customer) AND (behavior OR preference) NOT (manufacturing OR IoT OR industrial)"#,
        r#""synthetic users" AND "language model" AND (marketing OR consumer OR survey)"#,
        r#"("synthetic persona" OR "virtual consumer") AND (simulation OR modeling)"#,
        r#""LLM agent" AND (consumer OR customer) AND (research OR study OR survey)"#,
        r#""agent based" AND (consumer OR customer) AND (simulation OR modeling) NOT (supply chain)"#,
        r#""preference prediction" AND ("language model" OR LLM) AND consumer"#,
        r#""survey augmentation" OR ("retrodiction" AND consumer)"#,
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_numbering() {
        let text = "1. \"digital twin\" AND consumer\n2) \"synthetic users\" AND behavior";
        let queries = parse_query_lines(text, 7);
        assert_eq!(
            queries,
            vec![
                "\"digital twin\" AND consumer",
                "\"synthetic users\" AND behavior"
            ]
        );
    }

    #[test]
    fn test_parse_skips_comments_and_short_lines() {
        let text = "# header\nshort\n\"LLM agent\" AND (consumer OR customer)";
        let queries = parse_query_lines(text, 7);
        assert_eq!(queries, vec!["\"LLM agent\" AND (consumer OR customer)"]);
    }

    #[test]
    fn test_parse_caps_at_requested_count() {
        let text = "\"query one\" AND alpha\n\"query two\" AND beta\n\"query three\" AND gamma";
        assert_eq!(parse_query_lines(text, 2).len(), 2);
    }

    #[test]
    fn test_fallback_queries_are_nonempty() {
        let queries = fallback_queries();
        assert_eq!(queries.len(), 7);
        assert!(queries.iter().all(|q| q.len() > 10));
    }

    #[test]
    fn test_generator_requires_api_key() {
        assert!(QueryGenerator::new("", "gemini-2.0-flash-exp").is_err());
    }
}
