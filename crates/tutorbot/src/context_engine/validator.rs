
//! Advisory relevance scoring of a composed bundle against the query.
//!
//! Validation never blocks a turn: a poor score is logged and surfaced for
//! observability, and the turn proceeds. Blocking on imperfect context
//! would trade availability for an uncertain gain.
use serde::Serialize;
use std::collections::HashSet;

use crate::context_engine::composer::{ContextBundle, ContextStrategy};

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub similarity_score_floor: f32,
    /// Turns a summary may lag behind the log before it counts as stale.
    pub summary_stale_turns: usize,
    pub max_context_tokens: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            similarity_score_floor: 0.15,
            summary_stale_turns: 6,
            max_context_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EmptyContext,
    LowSimilarity,
    StaleSummary,
    /// Post-composition bundles should never carry this; its presence
    /// indicates a composer bug.
    OverBudget,
}

#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub score: f32,
    pub issues: Vec<IssueKind>,
}

/// Pure and stateless; shared freely across turns.
#[derive(Debug, Clone)]
pub struct RelevanceValidator {
    config: ValidatorConfig,
}

impl RelevanceValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Score the bundle against the query. `summary_lag_messages` is how
    /// many messages the running summary trails the log by, when one
    /// exists.
    pub fn validate(
        &self,
        query: &str,
        bundle: &ContextBundle,
        summary_lag_messages: Option<usize>,
    ) -> Validation {
        let mut score: f32 = 0.0;
        let mut issues = Vec::new();

        if bundle.is_empty() {
            issues.push(IssueKind::EmptyContext);
        }

        // Section scoring, strongest context source first
        if !bundle.snippets.is_empty() {
            score += 0.7;
        } else if bundle.strategy == ContextStrategy::RecentWindow && !bundle.recent_messages.is_empty() {
            score += 0.5;
        } else if !bundle.recent_messages.is_empty() {
            score += 0.3;
        }

        let retrieval_wanted = matches!(
            bundle.strategy,
            ContextStrategy::Hybrid | ContextStrategy::SummarySearch
        );
        if retrieval_wanted
            && bundle.best_retrieval_score.map_or(true, |s| s < self.config.similarity_score_floor)
        {
            issues.push(IssueKind::LowSimilarity);
        }

        if bundle.summary.is_some() {
            if let Some(lag) = summary_lag_messages {
                if lag > self.config.summary_stale_turns {
                    issues.push(IssueKind::StaleSummary);
                }
            }
        }

        if bundle.total_tokens > self.config.max_context_tokens {
            issues.push(IssueKind::OverBudget);
        }

        // Word overlap between query and assembled context
        let query_words: HashSet<String> = words_of(query);
        let mut context_words: HashSet<String> = HashSet::new();
        if let Some(ref summary) = bundle.summary {
            context_words.extend(words_of(summary));
        }
        for message in &bundle.recent_messages {
            context_words.extend(words_of(&message.content));
        }
        for snippet in &bundle.snippets {
            context_words.extend(words_of(&snippet.text));
        }

        let overlap = query_words.intersection(&context_words).count();
        score += (overlap as f32 * 0.1).min(0.3);

        // Length sanity: very large context can drown the question, a
        // couple of words cannot help it
        let context_chars: usize = bundle.summary.as_deref().map_or(0, str::len)
            + bundle.recent_messages.iter().map(|m| m.content.len()).sum::<usize>()
            + bundle.snippets.iter().map(|s| s.text.len()).sum::<usize>();
        if context_chars > 4000 {
            score -= 0.1;
        }
        if context_chars > 0 && context_chars < 50 {
            score -= 0.2;
        }

        // Bonus for drawing on more than one source
        let sources = [
            !bundle.snippets.is_empty(),
            !bundle.recent_messages.is_empty(),
            bundle.summary.is_some(),
        ];
        if sources.iter().filter(|&&s| s).count() >= 2 {
            score += 0.1;
        }

        Validation {
            score: score.clamp(0.0, 1.0),
            issues,
        }
    }
}

fn words_of(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}
