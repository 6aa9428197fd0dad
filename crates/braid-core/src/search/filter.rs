//! Metadata filtering and recency boost
//!
//! Filters are pass/fail: a rejected candidate is dropped, never penalized.
//! Survivors get a small additive boost that decays linearly with age.

use chrono::{NaiveDate, Utc};

use crate::config::FilterConfig;
use crate::document::{CandidateDocument, SearchFilters};

/// Boost for a document dated today
pub const DEFAULT_MAX_BOOST: f64 = 0.2;

/// Age at which the boost reaches zero
pub const DEFAULT_WINDOW_DAYS: i64 = 365;

/// Calendar-date part of a date string: everything before the first space or `T`
fn date_part(value: &str) -> &str {
    value
        .split([' ', 'T'])
        .next()
        .unwrap_or(value)
        .trim()
}

/// Parse `YYYY-MM-DD`, ignoring any time suffix
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date_part(value), "%Y-%m-%d").ok()
}

fn active(filter: &Option<String>) -> Option<&str> {
    filter.as_deref().filter(|f| !f.is_empty())
}

/// Applies caller filters and the recency boost
#[derive(Debug, Clone)]
pub struct FilterEngine {
    max_boost: f64,
    window_days: i64,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BOOST, DEFAULT_WINDOW_DAYS)
    }
}

impl FilterEngine {
    pub fn new(max_boost: f64, window_days: i64) -> Self {
        Self {
            max_boost: max_boost.max(0.0),
            window_days: window_days.max(1),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.recency_max_boost, config.recency_window_days)
    }

    /// Whether a candidate satisfies every active filter.
    ///
    /// Category and filetype must match exactly. Date bounds are inclusive
    /// string comparisons on the calendar-date part; a candidate without a
    /// date is exempt from them.
    pub fn passes(&self, doc: &CandidateDocument, filters: &SearchFilters) -> bool {
        let matches = |filter: &Option<String>, key: &str| match active(filter) {
            Some(wanted) => doc.field(key).as_deref() == Some(wanted),
            None => true,
        };
        if !matches(&filters.category, "category") || !matches(&filters.filetype, "filetype") {
            return false;
        }

        let Some(date) = doc.date() else {
            return true;
        };
        let date = date_part(&date);

        let after_from = active(&filters.date_from).is_none_or(|from| date >= date_part(from));
        let before_to = active(&filters.date_to).is_none_or(|to| date <= date_part(to));
        after_from && before_to
    }

    /// Boost for a document date relative to `today`.
    ///
    /// Missing or unparseable dates get 0. Future dates count as age 0.
    pub fn recency_boost(&self, date: Option<&str>, today: NaiveDate) -> f64 {
        let Some(date) = date.and_then(parse_date) else {
            return 0.0;
        };
        let age_days = (today - date).num_days().clamp(0, self.window_days);
        (self.max_boost - self.max_boost * age_days as f64 / self.window_days as f64).max(0.0)
    }

    /// Filter, boost and re-sort candidates as of `today`.
    ///
    /// The re-sort is stable, so equal boosted scores keep their fused order.
    pub fn apply_at(
        &self,
        candidates: Vec<CandidateDocument>,
        filters: Option<&SearchFilters>,
        today: NaiveDate,
    ) -> Vec<CandidateDocument> {
        let before = candidates.len();
        let mut kept: Vec<CandidateDocument> = match filters.filter(|f| !f.is_empty()) {
            Some(filters) => candidates
                .into_iter()
                .filter(|doc| self.passes(doc, filters))
                .collect(),
            None => candidates,
        };

        for doc in &mut kept {
            doc.fused_score += self.recency_boost(doc.date().as_deref(), today);
        }
        kept.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));

        tracing::debug!(before, after = kept.len(), "Applied filters and recency boost");
        kept
    }

    /// [`FilterEngine::apply_at`] with today's UTC date
    pub fn apply(
        &self,
        candidates: Vec<CandidateDocument>,
        filters: Option<&SearchFilters>,
    ) -> Vec<CandidateDocument> {
        self.apply_at(candidates, filters, Utc::now().date_naive())
    }
}

// ============================================================================
// TESTS
// ============================================================================
