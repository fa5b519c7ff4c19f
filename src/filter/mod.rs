use serde::{Deserialize, Serialize};

use crate::fetcher::{ClassificationPolicy, DurationClass, ListingEntry};

/// Pre-download criteria for channel listings.
///
/// Every present criterion must hold; an absent one always matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub min_views: Option<u64>,

    pub duration_class: Option<DurationClass>,

    /// Keywords that must all appear in title or description, compared case-insensitively
    pub keywords: Option<Vec<String>>,

    #[serde(skip)]
    policy: ClassificationPolicy,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_views(mut self, min_views: u64) -> Self {
        self.min_views = Some(min_views);
        self
    }

    pub fn with_duration_class(mut self, class: DurationClass) -> Self {
        self.duration_class = Some(class);
        self
    }

    /// Set keywords from comma separated input; empty input clears them
    pub fn with_keywords(mut self, input: &str) -> Self {
        let keywords = parse_keywords(input);
        self.keywords = (!keywords.is_empty()).then_some(keywords);
        self
    }

    /// Classify entry durations with `policy` instead of the default
    pub fn with_policy(mut self, policy: ClassificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.min_views.is_none()
            && self.duration_class.is_none()
            && self.keywords.as_ref().map_or(true, |k| k.is_empty())
    }

    pub fn matches(&self, entry: &ListingEntry) -> bool {
        if let Some(min_views) = self.min_views {
            if entry.view_count() < min_views {
                return false;
            }
        }

        if let Some(class) = self.duration_class {
            if self.policy.classify(entry.duration_seconds()) != class {
                return false;
            }
        }

        if let Some(keywords) = &self.keywords {
            let haystack = format!("{} {}", entry.title(), entry.description()).to_lowercase();
            if !keywords
                .iter()
                .all(|k| haystack.contains(k.trim().to_lowercase().as_str()))
            {
                return false;
            }
        }

        true
    }

    /// Keep matching entries, preserving listing order
    pub fn apply(&self, entries: Vec<ListingEntry>) -> Vec<ListingEntry> {
        let total = entries.len();
        let matched: Vec<ListingEntry> = entries.into_iter().filter(|e| self.matches(e)).collect();
        tracing::info!("Filter kept {} of {} entries", matched.len(), total);
        matched
    }
}

/// Split comma separated keywords into trimmed lowercase terms, dropping empty ones
pub fn parse_keywords(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
