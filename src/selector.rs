//! Picks one authored comment for a set of analysis results.
//!
//! Results are flattened into `type/key` identifiers, shuffled, and the first
//! identifier present in the corpus wins. Shuffling first gives every
//! detected identifier the same chance of being chosen, whatever order the
//! service listed them in.
//!
//! Selection is uniform over flattened occurrences: an identifier reported
//! twice is twice as likely to be picked, and identifiers without a comment
//! simply fall through to the next candidate.

use rand::Rng;

use crate::comments::CommentCorpus;
use crate::models::{AnalysisResult, Comment, SmellId};

/// The comment chosen for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<'a> {
    pub smell: &'a SmellId,
    pub comment: &'a Comment,
}

/// Flatten results into identifiers, preserving encounter order.
pub fn flatten(results: &[AnalysisResult]) -> Vec<SmellId> {
    results
        .iter()
        .flat_map(|result| result.keys.iter().map(|key| SmellId::new(&result.kind, key)))
        .collect()
}

/// Inside-out Fisher–Yates shuffle.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in 1..items.len() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Return the first identifier of `smells` that has a comment.
pub fn first_match<'a>(corpus: &'a CommentCorpus, smells: &[SmellId]) -> Option<Selection<'a>> {
    smells.iter().find_map(|smell| {
        corpus
            .get_key_value(smell)
            .map(|(smell, comment)| Selection { smell, comment })
    })
}

/// Flatten, shuffle and scan. `None` means no comment is available.
pub fn select<'a, R: Rng + ?Sized>(
    corpus: &'a CommentCorpus,
    results: &[AnalysisResult],
    rng: &mut R,
) -> Option<Selection<'a>> {
    let mut smells = flatten(results);
    shuffle(&mut smells, rng);
    first_match(corpus, &smells)
}
