//! Reciprocal Rank Fusion
//!
//! Combines ranked lists using the RRF formula:
//! score(d) = sum of 1/(k + rank(d)) across all lists, rank 1 = best
//!
//! RRF is effective because:
//! - It ignores the incomparable raw score scales of the sources
//! - It rewards documents appearing in several lists
//! - The k parameter (typically 60) dampens the effect of high ranks
//!
//! Ordering is fully deterministic: equal fused scores keep the order in
//! which documents were first encountered, scanning lists in argument order.

use std::collections::{HashMap, HashSet};

use crate::config::DEFAULT_RRF_K;
use crate::document::{CandidateDocument, SourceHit};

/// Fuse any number of ranked id lists.
///
/// Only the first occurrence of an id within a list counts.
pub fn reciprocal_rank_fusion(lists: &[&[String]], k: f64) -> Vec<(String, f64)> {
    let mut order: Vec<(String, f64)> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();

    for list in lists {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut rank = 0usize;
        for id in list.iter() {
            if !seen.insert(id.as_str()) {
                continue;
            }
            rank += 1;
            let contribution = 1.0 / (k + rank as f64);
            match position.get(id.as_str()) {
                Some(&i) => order[i].1 += contribution,
                None => {
                    position.insert(id.as_str(), order.len());
                    order.push((id.clone(), contribution));
                }
            }
        }
    }

    // Stable: ties stay in first-seen order
    order.sort_by(|a, b| b.1.total_cmp(&a.1));
    order
}

/// Merges the lexical and vector lists into scored candidates
#[derive(Debug, Clone)]
pub struct FusionEngine {
    k: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RRF_K)
    }
}

impl FusionEngine {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Fuse the two source lists.
    ///
    /// Payloads start from the lexical hit and are overlaid by the vector hit,
    /// which carries fuller chunk text. Output is sorted by `fused_score`
    /// descending, ties in first-seen order (lexical list scanned first).
    pub fn fuse(&self, lexical: &[SourceHit], vector: &[SourceHit]) -> Vec<CandidateDocument> {
        let mut candidates: Vec<CandidateDocument> = Vec::with_capacity(lexical.len() + vector.len());
        let mut position: HashMap<String, usize> = HashMap::new();

        for (is_vector, list) in [(false, lexical), (true, vector)] {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut rank = 0usize;

            for hit in list {
                if !seen.insert(hit.id.as_str()) {
                    continue;
                }
                rank += 1;

                let index = *position.entry(hit.id.clone()).or_insert_with(|| {
                    candidates.push(CandidateDocument::new(hit.id.clone()));
                    candidates.len() - 1
                });
                let doc = &mut candidates[index];

                doc.fused_score += 1.0 / (self.k + rank as f64);
                if is_vector {
                    doc.vector_score = Some(hit.score);
                } else {
                    doc.lexical_score = Some(hit.score);
                }
                for (key, value) in &hit.payload {
                    doc.payload.insert(key.clone(), value.clone());
                }
            }
        }

        candidates.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));
        tracing::debug!(
            lexical = lexical.len(),
            vector = vector.len(),
            candidates = candidates.len(),
            "Fused source lists"
        );
        candidates
    }
}

// ============================================================================
// TESTS
// ============================================================================
