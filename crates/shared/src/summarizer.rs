use std::fs;
use std::path::Path;

use anyhow::Result;

use crate::gemini::GeminiClient;
use crate::models::Paper;

const PROMPT_TEMPLATE_PATH: &str = "prompt/summary_prompt.md";

/// Gemini-backed paper summarizer with an externalized prompt template.
pub struct Summarizer {
    gemini: GeminiClient,
    prompt_template: String,
}

impl Summarizer {
    pub fn new(api_key: &str, model: &str, temperature: f64) -> Result<Self> {
        Ok(Self {
            gemini: GeminiClient::new(api_key, model, temperature)?,
            prompt_template: load_prompt_template(),
        })
    }

    /// Summarize one paper. Failures are logged and yield `None`; the caller
    /// drops the paper from the digest rather than aborting the batch.
    pub async fn summarize(&mut self, paper: &Paper) -> Option<String> {
        let prompt = fill_template(&self.prompt_template, paper);

        match self.gemini.generate(&prompt, 600).await {
            Ok(text) => Some(clean_summary(&text)),
            Err(e) => {
                eprintln!("Error summarizing paper '{}': {:#}", paper.title, e);
                None
            }
        }
    }

    /// Produce a short "how could we use this" note tied to the business
    /// context. Optional enhancement: `None` on failure, the digest simply
    /// omits the section.
    pub async fn practical_application(
        &mut self,
        paper: &Paper,
        business_context: &str,
    ) -> Option<String> {
        let summary = paper
            .summary
            .as_deref()
            .unwrap_or(paper.abstract_text.as_str());

        let prompt = format!(
            r#"You are a product strategist translating research into concrete next steps.

BUSINESS CONTEXT:
{business_context}

PAPER:
Title: {title}
Summary: {summary}

Task: In 2-3 sentences, explain how the findings or methods of this paper
could be applied by this business. Be concrete: name the technique and what it
would be used for. If the paper has no plausible application, say so in one
sentence instead.

Respond with the sentences only, no preamble and no headings."#,
            business_context = business_context,
            title = paper.title,
            summary = summary,
        );

        match self.gemini.generate(&prompt, 300).await {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                eprintln!(
                    "Error generating practical application for '{}': {:#}",
                    paper.title, e
                );
                None
            }
        }
    }
}

fn load_prompt_template() -> String {
    match fs::read_to_string(Path::new(PROMPT_TEMPLATE_PATH)) {
        Ok(template) => template,
        Err(_) => default_prompt().to_string(),
    }
}

fn default_prompt() -> &'static str {
    r#"SYSTEM
You are a precise research analyst for a newsletter read by ML engineers and PMs at a customer-twin startup.
Goal. Summarize each paper in two to three short paragraphs and link it to customer digital twins, synthetic users, LLM agents for consumer research, and practical evaluation.

Constraints.
Be factual and verify against provided metadata and abstract.
Avoid speculation. If a claim is unclear, state that briefly.
Mention one limitation or ethical risk in one concise sentence if relevant.
Output only the fields below. Do not add preamble.

USER
Paper metadata and abstract.
TITLE: {{title}}
AUTHORS: {{authors}}
DATE: {{date}}
LINK: {{url}}
ABSTRACT: {{abstract}}

OUTPUT FORMAT
TITLE: {{title}}
LINK: {{url}}
AUTHORS: {{authors}}
DATE: {{date}}
SUMMARY:
{{write two to three paragraphs tailored to customer twins. do not use bullets}}"#
}

fn fill_template(template: &str, paper: &Paper) -> String {
    let authors = format_authors(&paper.authors);

    template
        .replace("{{title}}", none_if_empty(&paper.title, "Title not available"))
        .replace("{{authors}}", none_if_empty(&authors, "Authors not available"))
        .replace("{{date}}", none_if_empty(&paper.date, "Date not available"))
        .replace("{{url}}", none_if_empty(&paper.url, "URL not available"))
        .replace(
            "{{abstract}}",
            none_if_empty(&paper.abstract_text, "Abstract not available"),
        )
}

fn none_if_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// First five authors spelled out, the rest folded into an "et al." count.
fn format_authors(authors: &[String]) -> String {
    let mut formatted = authors[..authors.len().min(5)].join(", ");
    if authors.len() > 5 {
        formatted.push_str(&format!(" et al. ({} authors total)", authors.len()));
    }
    formatted
}

/// Models occasionally echo the template scaffolding; keep only the part
/// starting at the summary proper.
fn clean_summary(text: &str) -> String {
    let text = text.trim();

    if let Some((_, after)) = text.split_once("OUTPUT FORMAT") {
        return after.trim().to_string();
    }
    if let Some((_, after)) = text.split_once("SUMMARY:") {
        return format!("SUMMARY:\n{}", after.trim());
    }
    text.to_string()
}
