//! Cosine similarity between a link vector and cached category vectors.

use crate::categories::Category;

/// Best-scoring category for a link vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub category_id: String,
    pub score: f32,
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity. The dot product runs over the common prefix, the
/// norms over the full vectors, so a dimension mismatch lowers the score.
///
/// A zero norm is replaced by 1, which makes the score of a degenerate
/// vector 0 instead of NaN.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| match l2_norm(v) {
        n if n == 0.0 => 1.0,
        n => n,
    };

    dot / (norm(a) * norm(b))
}

/// Scores every category that has a cached vector and returns the best one.
///
/// Ties keep the category seen first, so the result only depends on the
/// order of `categories`.
pub fn best_match(link_vector: &[f32], categories: &[Category]) -> Option<Match> {
    let mut best: Option<Match> = None;

    for category in categories {
        let Some(embedding) = category.embedding.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };

        let score = cosine(link_vector, embedding);
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(Match {
                category_id: category.id.clone(),
                score,
            });
        }
    }

    best
}
