use anyhow::{Context, Result};
use chrono::Utc;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::models::Paper;

/// SMTP digest publisher. Construction requires credentials (fatal
/// configuration); sending returns an error the pipeline treats as
/// "do not mark anything as sent".
pub struct EmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSender {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        use_ssl: bool,
    ) -> Result<Self> {
        if username.is_empty() || password.is_empty() {
            anyhow::bail!(
                "SMTP credentials must be provided or set as SMTP_USERNAME/SMTP_PASSWORD environment variables"
            );
        }

        let credentials = Credentials::new(username.to_string(), password.to_string());

        let transport = if use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .context("Failed to configure SMTP relay")?
                .port(port)
                .credentials(credentials)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .context("Failed to configure SMTP STARTTLS relay")?
                .port(port)
                .credentials(credentials)
                .build()
        };

        Ok(Self { transport })
    }

    pub async fn send_digest(
        &self,
        recipients: &[String],
        papers: &[Paper],
        from_email: &str,
        from_name: &str,
        subject_prefix: &str,
    ) -> Result<()> {
        let subject = format!(
            "{} - {}",
            subject_prefix,
            Utc::now().format("%Y-%m-%d %H:%M UTC")
        );

        let from: Mailbox = format!("{} <{}>", from_name, from_email)
            .parse()
            .with_context(|| format!("Invalid from address: {}", from_email))?;

        let mut builder = Message::builder().from(from).subject(subject);
        for recipient in recipients {
            let to: Mailbox = recipient
                .parse()
                .with_context(|| format!("Invalid recipient address: {}", recipient))?;
            builder = builder.to(to);
        }

        let message = builder
            .multipart(MultiPart::alternative_plain_html(
                render_text(papers),
                render_html(papers),
            ))
            .context("Failed to build digest message")?;

        self.transport
            .send(message)
            .await
            .context("Failed to send digest via SMTP")?;

        println!("Successfully sent digest to {} recipients", recipients.len());
        Ok(())
    }
}

pub fn render_html(papers: &[Paper]) -> String {
    let now = Utc::now();
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str("  <meta charset=\"UTF-8\">\n");
    html.push_str("  <title>Research Radar</title>\n");
    html.push_str("  <style>\n");
    html.push_str("    body { font-family: Arial, sans-serif; max-width: 900px; margin: 40px auto; padding: 0 20px; line-height: 1.6; color: #2c3e50; }\n");
    html.push_str("    h1 { border-bottom: 3px solid #3498db; padding-bottom: 10px; }\n");
    html.push_str("    .subtitle { color: #7f8c8d; }\n");
    html.push_str("    .paper { margin: 30px 0; padding-bottom: 20px; border-bottom: 1px solid #ecf0f1; }\n");
    html.push_str("    .paper-number { color: #7f8c8d; font-size: 0.8em; letter-spacing: 1px; }\n");
    html.push_str("    .paper-title a { color: #2c3e50; font-size: 1.2em; font-weight: bold; text-decoration: none; }\n");
    html.push_str("    .paper-title a:hover { text-decoration: underline; }\n");
    html.push_str("    .metadata { color: #7f8c8d; font-size: 0.9em; margin: 5px 0; }\n");
    html.push_str("    .score { background: #ecf0f1; border-radius: 3px; padding: 2px 6px; font-size: 0.85em; }\n");
    html.push_str("    .practical { background: #f4f9fd; border-left: 4px solid #3498db; padding: 10px; margin-top: 10px; }\n");
    html.push_str("    .practical .label { font-size: 0.8em; font-weight: bold; letter-spacing: 1px; color: #3498db; }\n");
    html.push_str("    .footer { color: #7f8c8d; font-size: 0.85em; margin-top: 40px; }\n");
    html.push_str("  </style>\n</head>\n<body>\n");

    html.push_str("  <h1>Research Radar</h1>\n");
    html.push_str("  <p class=\"subtitle\">Latest research on digital twins, synthetic users, and LLM agents for consumer research</p>\n");

    for (i, paper) in papers.iter().enumerate() {
        html.push_str(&format_paper_html(paper, i + 1));
    }

    html.push_str(&format!(
        "  <div class=\"footer\">{} paper{} &bull; generated {} &bull; arXiv, Crossref and Semantic Scholar</div>\n",
        papers.len(),
        if papers.len() == 1 { "" } else { "s" },
        now.format("%Y-%m-%d %H:%M UTC")
    ));
    html.push_str("</body>\n</html>\n");
    html
}

fn format_paper_html(paper: &Paper, index: usize) -> String {
    let mut html = String::new();

    html.push_str("  <div class=\"paper\">\n");
    html.push_str(&format!(
        "    <span class=\"paper-number\">PAPER {:02}</span>\n",
        index
    ));
    html.push_str(&format!(
        "    <div class=\"paper-title\"><a href=\"{}\">{}</a></div>\n",
        escape_html(&paper.url),
        escape_html(&paper.title)
    ));

    html.push_str(&format!(
        "    <div class=\"metadata\"><strong>Authors:</strong> {} &bull; <strong>Date:</strong> {} &bull; <strong>Source:</strong> {}",
        escape_html(&paper.author_preview(3)),
        escape_html(none_if_empty(&paper.date, "Date not available")),
        paper.source.to_string().to_uppercase()
    ));
    if let Some(score) = paper.relevance_score {
        html.push_str(&format!(
            " &bull; <span class=\"score\">relevance {:.1}/10</span>",
            score
        ));
    }
    html.push_str("</div>\n");

    let summary = paper.summary.as_deref().unwrap_or("Summary not available.");
    for paragraph in summary_paragraphs(summary) {
        html.push_str(&format!("    <p>{}</p>\n", escape_html(paragraph)));
    }

    if let Some(practical) = paper.practical_application.as_deref() {
        html.push_str("    <div class=\"practical\">\n");
        html.push_str("      <div class=\"label\">PRACTICAL APPLICATION</div>\n");
        html.push_str(&format!("      <p>{}</p>\n", escape_html(practical)));
        html.push_str("    </div>\n");
    }

    html.push_str("  </div>\n");
    html
}

pub fn render_text(papers: &[Paper]) -> String {
    let mut text = String::new();

    text.push_str("RESEARCH RADAR\n");
    text.push_str(&"=".repeat(40));
    text.push_str("\n\n");
    text.push_str(&format!(
        "Generated on {}\n",
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    ));
    text.push_str(&format!(
        "This digest includes {} paper{}.\n\n",
        papers.len(),
        if papers.len() == 1 { "" } else { "s" }
    ));

    for (i, paper) in papers.iter().enumerate() {
        text.push_str(&format_paper_text(paper, i + 1));
        text.push('\n');
        text.push_str(&"-".repeat(40));
        text.push_str("\n\n");
    }

    text
}

fn format_paper_text(paper: &Paper, index: usize) -> String {
    let mut text = format!("[{}] {}\n\n", index, paper.title);

    text.push_str(&format!("Authors: {}\n", paper.author_preview(3)));
    text.push_str(&format!(
        "Date: {}\n",
        none_if_empty(&paper.date, "Date not available")
    ));
    text.push_str(&format!(
        "Source: {}\n",
        paper.source.to_string().to_uppercase()
    ));
    if let Some(score) = paper.relevance_score {
        text.push_str(&format!("Relevance: {:.1}/10\n", score));
    }
    text.push_str(&format!("Link: {}\n\n", paper.url));

    text.push_str("Summary:\n");
    text.push_str(
        strip_summary_scaffolding(paper.summary.as_deref().unwrap_or("Summary not available.")),
    );
    text.push('\n');

    if let Some(practical) = paper.practical_application.as_deref() {
        text.push_str(&format!("\nPractical application:\n{}\n", practical));
    }

    text
}

/// Summaries may arrive with the prompt's TITLE/LINK/... scaffolding; keep
/// only the prose after the SUMMARY: marker when it is present.
fn strip_summary_scaffolding(summary: &str) -> &str {
    if summary.contains("TITLE:") {
        if let Some((_, after)) = summary.split_once("SUMMARY:") {
            return after.trim();
        }
    }
    summary.trim()
}

fn summary_paragraphs(summary: &str) -> impl Iterator<Item = &str> {
    strip_summary_scaffolding(summary)
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

fn none_if_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    fn paper() -> Paper {
        let mut p = Paper::new(
            "10.1/x",
            "Twins & Agents <critique>",
            "https://doi.org/10.1/x",
            Source::Crossref,
        );
        p.authors = vec!["Ada".into(), "Ben".into(), "Cam".into(), "Dee".into()];
        p.date = "2024-02-01T00:00:00".into();
        p.summary = Some("TITLE: x\nLINK: y\nSUMMARY:\nFirst paragraph.\n\nSecond paragraph.".into());
        p.relevance_score = Some(8.5);
        p.practical_application = Some("Use it for panel simulation.".into());
        p
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("A & B"), "A &amp; B");
        assert_eq!(escape_html("<script>"), "&lt;script&gt;");
        assert_eq!(escape_html("He said \"hi\""), "He said &quot;hi&quot;");
    }

    #[test]
    fn test_html_digest_escapes_and_includes_fields() {
        let html = render_html(&[paper()]);
        assert!(html.contains("Twins &amp; Agents &lt;critique&gt;"));
        assert!(html.contains("Ada, Ben, Cam et al."));
        assert!(html.contains("relevance 8.5/10"));
        assert!(html.contains("CROSSREF"));
        assert!(html.contains("<p>First paragraph.</p>"));
        assert!(html.contains("<p>Second paragraph.</p>"));
        assert!(html.contains("PRACTICAL APPLICATION"));
    }

    #[test]
    fn test_text_digest_strips_scaffolding() {
        let text = render_text(&[paper()]);
        assert!(text.contains("[1] Twins & Agents <critique>"));
        assert!(text.contains("Summary:\nFirst paragraph."));
        assert!(!text.contains("LINK: y"));
        assert!(text.contains("Practical application:"));
    }

    #[test]
    fn test_plain_summary_is_kept_verbatim() {
        assert_eq!(
            strip_summary_scaffolding("Just two paragraphs of prose."),
            "Just two paragraphs of prose."
        );
    }

    #[test]
    fn test_missing_credentials_rejected() {
        assert!(EmailSender::new("smtp.example.com", 465, "", "", true).is_err());
    }

    #[test]
    fn test_singular_plural_count_line() {
        let text = render_text(&[paper()]);
        assert!(text.contains("includes 1 paper."));
    }
}
