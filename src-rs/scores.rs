use serde::{Deserialize, Serialize};

use crate::error::{ReviewError, ReviewResult};

/// One Kellgren-Lawrence grade and its probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: u32,
    pub prob: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedScores {
    pub predicted: u32,
    /// Sorted by ascending score, probabilities in percent.
    pub display: Vec<ScoreEntry>,
}

/// Picks the predicted grade and prepares the chart-ready distribution.
///
/// The prediction is taken from the input as given, before any rescaling or
/// reordering. Ties go to the earliest entry.
pub fn resolve_scores(distribution: &[ScoreEntry]) -> ReviewResult<ResolvedScores> {
    validate(distribution)?;

    let mut best = &distribution[0];
    for entry in &distribution[1..] {
        if entry.prob > best.prob {
            best = entry;
        }
    }

    Ok(ResolvedScores {
        predicted: best.score,
        display: display_distribution(distribution),
    })
}

pub fn display_distribution(distribution: &[ScoreEntry]) -> Vec<ScoreEntry> {
    let mut display: Vec<ScoreEntry> = distribution
        .iter()
        .map(|entry| ScoreEntry {
            score: entry.score,
            prob: entry.prob * 100.0,
        })
        .collect();
    display.sort_by_key(|entry| entry.score);
    display
}

fn validate(distribution: &[ScoreEntry]) -> ReviewResult<()> {
    if distribution.is_empty() {
        return Err(ReviewError::InvalidDistribution(
            "distribution is empty".to_string(),
        ));
    }
    if let Some(bad) = distribution
        .iter()
        .find(|entry| !(entry.prob.is_finite() && (0.0..=1.0).contains(&entry.prob)))
    {
        return Err(ReviewError::InvalidDistribution(format!(
            "probability {} for score {} is outside [0, 1]",
            bad.prob, bad.score
        )));
    }
    Ok(())
}
