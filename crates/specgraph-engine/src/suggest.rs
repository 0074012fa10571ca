//! Near-match suggestions for broken references

use crate::config::EngineConfig;
use rapidfuzz::distance::levenshtein;
use serde::{Deserialize, Serialize};

/// Candidate replacement for a broken reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Candidate value, in the same form as the broken value
    pub candidate: String,
    /// Normalized similarity in 0..=1
    pub similarity: f64,
}

/// Normalized Levenshtein similarity: `1 - distance / max(len_a, len_b)`
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein::distance(a.chars(), b.chars());
    1.0 - distance as f64 / max_len as f64
}

/// Ranks candidates by similarity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suggester {
    threshold: f64,
    limit: usize,
}

impl Default for Suggester {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl Suggester {
    /// Suggester using the threshold and limit of `config`
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
            limit: config.max_suggestions,
        }
    }

    /// Candidates strictly above the threshold, best first, ties in input order
    #[must_use]
    pub fn suggest<'a>(&self, value: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<Suggestion> {
        let mut ranked: Vec<Suggestion> = candidates
            .into_iter()
            .filter(|candidate| *candidate != value)
            .map(|candidate| Suggestion {
                candidate: candidate.to_string(),
                similarity: similarity(value, candidate),
            })
            .filter(|s| s.similarity > self.threshold)
            .collect();

        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(self.limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_bounds() {
        assert!((similarity("task-001", "task-001") - 1.0).abs() < f64::EPSILON);
        assert!((similarity("", "") - 1.0).abs() < f64::EPSILON);
        assert!(similarity("abc", "xyz").abs() < f64::EPSILON);
        assert!((similarity("task-001", "task-002") - 0.875).abs() < 1e-9);
    }

    #[test]
    fn ranks_best_first_and_keeps_input_order_on_ties() {
        let suggester = Suggester::default();
        let found = suggester.suggest(
            "task-010",
            ["task-001", "task-011", "task-012", "plan-xyz", "task-013"],
        );

        let names: Vec<_> = found.iter().map(|s| s.candidate.as_str()).collect();
        assert_eq!(names, vec!["task-011", "task-012", "task-013"]);
        assert!((found[0].similarity - 0.875).abs() < 1e-9);
    }

    #[test]
    fn threshold_is_exclusive() {
        let suggester = Suggester::from_config(&EngineConfig::default().with_similarity_threshold(0.875));
        assert!(suggester.suggest("task-001", ["task-002"]).is_empty());
    }
}
