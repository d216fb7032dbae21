use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use shared::{
    emailer, select_by_tier, Aggregator, ArxivSearcher, CrossrefSearcher, EmailSender, Paper,
    PaperSource, QueryGenerator, RelevanceFilter, Secrets, SemanticScholarSearcher, Settings,
    StateStore, Summarizer, TierThresholds,
};

#[derive(Parser)]
#[command(name = "send-digest")]
#[command(about = "Discover, score, summarize and email new research papers")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured lookback window (days)
    #[arg(short, long)]
    days: Option<i64>,

    /// Run the whole pipeline but print the digest instead of emailing,
    /// and leave the state file untouched
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("Research Radar");
    println!("{}", "=".repeat(50));

    let settings = Settings::load(&args.config)?;
    let secrets = Secrets::from_env();

    let lookback_days = args.days.unwrap_or(settings.search.search_window_days);
    let max_results = settings.search.max_results_per_source;

    let mut state = StateStore::open(&settings.state.file)?;
    state.cleanup_old_entries(settings.state.retention_days)?;

    // Resolve queries: LLM-generated when enabled, static otherwise. Query
    // generation is an enhancement; any failure falls back to the static list.
    let queries = resolve_queries(&settings, &secrets).await;
    if queries.is_empty() {
        println!("Error: No queries available");
        return Ok(());
    }

    let mut aggregator = Aggregator::new(build_sources()?);
    let papers = aggregator
        .search_all(&queries, lookback_days, max_results)
        .await;

    println!("\nTotal papers found: {}", papers.len());
    if papers.is_empty() {
        println!("No papers found. Exiting.");
        return Ok(());
    }

    let unseen = state.filter_unseen(papers);
    println!("Found {} new papers", unseen.len());
    if unseen.is_empty() {
        println!("No new papers to send. Exiting.");
        return Ok(());
    }

    let selected = if settings.search.use_relevance_filtering {
        match apply_relevance_filter(unseen.clone(), &settings, &secrets).await {
            Some(selected) => {
                if selected.is_empty() {
                    println!(
                        "\nNo papers scored >= {}/10. Exiting.",
                        settings.search.also_relevant_threshold
                    );
                    return Ok(());
                }
                selected
            }
            // Fail-open: relevance filtering is an optimization, not a gate
            None => unseen,
        }
    } else {
        unseen
    };

    let mut to_summarize = selected;
    if to_summarize.len() > settings.summarization.max_summaries {
        println!("\nLimiting to {} papers", settings.summarization.max_summaries);
        to_summarize.truncate(settings.summarization.max_summaries);
    }

    println!("\n🤖 Summarizing {} papers...", to_summarize.len());
    let mut summarizer = Summarizer::new(
        &secrets.gemini_api_key,
        &settings.summarization.model,
        settings.summarization.temperature,
    )?;

    let mut summarized: Vec<Paper> = Vec::new();
    for mut paper in to_summarize {
        println!("  Summarizing: {}...", truncate(&paper.title, 60));
        match summarizer.summarize(&paper).await {
            Some(summary) => {
                paper.summary = Some(summary);
                summarized.push(paper);
            }
            None => println!("    Warning: Failed to summarize"),
        }
    }

    if summarized.is_empty() {
        println!("No papers were successfully summarized. Exiting.");
        return Ok(());
    }
    println!("✓ Successfully summarized {} papers", summarized.len());

    println!(
        "\nGenerating practical applications for {} papers...",
        summarized.len()
    );
    for paper in &mut summarized {
        println!("  Analyzing: {}...", truncate(&paper.title, 60));
        match summarizer
            .practical_application(paper, &settings.search.business_context)
            .await
        {
            Some(practical) => paper.practical_application = Some(practical),
            None => println!("    Warning: Failed to generate practical application"),
        }
    }

    if args.dry_run {
        println!("\nDry run: skipping email and state update\n");
        print!("{}", emailer::render_text(&summarized));
        return Ok(());
    }

    println!("\n📧 Sending email digest...");
    if settings.email.recipients.is_empty() {
        println!("Warning: No recipients configured. Skipping email.");
        return Ok(());
    }

    let sender = match EmailSender::new(
        &settings.smtp.host,
        settings.smtp.port,
        &secrets.smtp_username,
        &secrets.smtp_password,
        settings.smtp.use_ssl,
    ) {
        Ok(sender) => sender,
        Err(e) => {
            eprintln!("Error setting up email: {:#}", e);
            return Ok(());
        }
    };

    match sender
        .send_digest(
            &settings.email.recipients,
            &summarized,
            &settings.email.from_email,
            &settings.email.from_name,
            &settings.email.subject_prefix,
        )
        .await
    {
        Ok(()) => {
            // Marking papers as sent is gated on a confirmed send: a publish
            // failure must leave the same papers unseen for the next run
            let paper_ids: Vec<String> = summarized
                .iter()
                .filter(|p| !p.id.is_empty())
                .map(|p| p.id.clone())
                .collect();
            let metadata: HashMap<String, BTreeMap<String, Value>> = summarized
                .iter()
                .filter(|p| !p.id.is_empty())
                .map(|p| {
                    (
                        p.id.clone(),
                        BTreeMap::from([("title".to_string(), Value::from(p.title.clone()))]),
                    )
                })
                .collect();
            state.mark_as_sent(&paper_ids, &metadata)?;
            println!("Marked {} papers as sent", paper_ids.len());
        }
        Err(e) => eprintln!("Error sending email: {:#}", e),
    }

    println!("\nNewsletter generation complete!");
    println!("{}", "=".repeat(50));
    Ok(())
}

fn build_sources() -> Result<Vec<Box<dyn PaperSource>>> {
    Ok(vec![
        Box::new(ArxivSearcher::new()?),
        Box::new(CrossrefSearcher::new()?),
        Box::new(SemanticScholarSearcher::new()?),
    ])
}

async fn resolve_queries(settings: &Settings, secrets: &Secrets) -> Vec<String> {
    if settings.search.use_llm_query_generation {
        println!("Generating search queries using LLM...");
        match QueryGenerator::new(&secrets.gemini_api_key, &settings.search.query_model) {
            Ok(mut generator) => {
                let queries = generator
                    .generate_queries(
                        &settings.search.research_focus,
                        settings.search.num_queries,
                        &settings.search.exclude_topics,
                    )
                    .await;
                for (i, q) in queries.iter().enumerate() {
                    println!("  {}. {}", i + 1, q);
                }
                return queries;
            }
            Err(e) => {
                eprintln!("Error generating queries: {:#}", e);
                eprintln!("Falling back to configured queries");
            }
        }
    } else {
        println!(
            "Using {} configured queries",
            settings.search.fallback_queries.len()
        );
    }
    settings.search.fallback_queries.clone()
}

/// Score every unseen paper and apply the two-tier selection. Returns `None`
/// when the scorer cannot be constructed, which the caller treats as
/// "process everything" (fail-open).
async fn apply_relevance_filter(
    unseen: Vec<Paper>,
    settings: &Settings,
    secrets: &Secrets,
) -> Option<Vec<Paper>> {
    let mut filter =
        match RelevanceFilter::new(&secrets.gemini_api_key, &settings.search.relevance_model) {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!("Error in relevance filtering: {:#}", e);
                eprintln!("Proceeding without relevance filtering");
                return None;
            }
        };

    let thresholds = TierThresholds {
        highly_relevant: settings.search.highly_relevant_threshold,
        also_relevant: settings.search.also_relevant_threshold,
        min_total_papers: settings.search.min_total_papers,
    };

    println!("\nScoring {} papers for relevance...", unseen.len());
    let total = unseen.len();
    let mut scored = Vec::with_capacity(total);
    for (i, mut paper) in unseen.into_iter().enumerate() {
        println!(
            "  [{}/{}] Scoring: {}...",
            i + 1,
            total,
            truncate(&paper.title, 60)
        );

        let (score, reason) = filter
            .score_paper(&paper, &settings.search.business_context)
            .await;
        println!("      Score: {:.1}/10 - {}...", score, truncate(&reason, 80));

        paper.relevance_score = Some(score);
        paper.relevance_reason = Some(reason);
        scored.push(paper);
    }

    let highly = scored
        .iter()
        .filter(|p| p.score() >= thresholds.highly_relevant)
        .count();
    let also = scored
        .iter()
        .filter(|p| {
            p.score() >= thresholds.also_relevant && p.score() < thresholds.highly_relevant
        })
        .count();

    println!("\nFiltering results:");
    println!(
        "  Highly relevant (>={}): {} papers",
        thresholds.highly_relevant, highly
    );
    println!(
        "  Also relevant ({}-{}): {} papers",
        thresholds.also_relevant, thresholds.highly_relevant, also
    );

    let selection = select_by_tier(scored, &thresholds);
    if selection.len() > highly {
        println!(
            "  Added {} also-relevant papers to reach minimum of {}",
            selection.len() - highly,
            thresholds.min_total_papers
        );
    }
    println!("\nTotal papers selected: {}", selection.len());

    Some(selection)
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
