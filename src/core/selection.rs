//! Ranking validated candidates and picking the day's story.

use std::cmp::Ordering;

use crate::domain::{Candidate, ValidationResult};

/// A candidate together with its validation verdict
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub candidate: Candidate,
    pub validation: ValidationResult,
}

impl Scored {
    pub fn new(candidate: Candidate, validation: ValidationResult) -> Self {
        Self {
            candidate,
            validation,
        }
    }
}

/// Highest score first, then earliest discovery, then candidate id
fn rank_order(a: &Scored, b: &Scored) -> Ordering {
    b.validation
        .positivity_score
        .total_cmp(&a.validation.positivity_score)
        .then_with(|| a.candidate.discovered_at.cmp(&b.candidate.discovered_at))
        .then_with(|| a.candidate.id.cmp(&b.candidate.id))
}

/// Sort candidates into selection order
pub fn rank(mut scored: Vec<Scored>) -> Vec<Scored> {
    scored.sort_by(rank_order);
    scored
}

/// Appropriate candidates only, in selection order
pub fn eligible(scored: Vec<Scored>) -> Vec<Scored> {
    rank(scored)
        .into_iter()
        .filter(|s| s.validation.appropriate)
        .collect()
}

/// The best-ranked appropriate candidate, if any
pub fn select(scored: Vec<Scored>) -> Option<Scored> {
    eligible(scored).into_iter().next()
}
