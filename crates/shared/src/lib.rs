// Public modules
pub mod aggregate;
pub mod config;
pub mod emailer;
pub mod gemini;
pub mod models;
pub mod queries;
pub mod relevance;
pub mod sources;
pub mod state;
pub mod summarizer;

// Re-export commonly used types
pub use aggregate::Aggregator;
pub use config::{Secrets, Settings};
pub use emailer::EmailSender;
pub use gemini::GeminiClient;
pub use models::{Paper, PaperKey, Source};
pub use queries::{fallback_queries, QueryGenerator};
pub use relevance::{select_by_tier, RelevanceFilter, TierThresholds};
pub use sources::{
    ArxivSearcher, CrossrefSearcher, PaperSource, RateLimiter, SemanticScholarSearcher,
};
pub use state::StateStore;
pub use summarizer::Summarizer;
