//! Per-round evaluation history and best-checkpoint selection.

use std::collections::BTreeMap;

use bs_types::{BackendError, BsResult, FoldScore};
use tracing::{debug, warn};

/// Train and validation AUC after one boosting round (1-based).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundMetrics {
    pub round: usize,
    pub train: f64,
    pub valid: f64,
}

/// Evaluation history reported by a backend tool, ordered by round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalHistory {
    rounds: Vec<RoundMetrics>,
}

impl EvalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a history from separately reported train/valid values.
    ///
    /// Rounds missing either metric are dropped.
    pub fn from_partial(
        tool: &str,
        train: BTreeMap<usize, f64>,
        mut valid: BTreeMap<usize, f64>,
    ) -> BsResult<Self> {
        let rounds: Vec<RoundMetrics> = train
            .into_iter()
            .filter_map(|(round, t)| {
                valid.remove(&round).map(|v| RoundMetrics {
                    round,
                    train: t,
                    valid: v,
                })
            })
            .collect();

        if rounds.is_empty() {
            return Err(BackendError::MissingMetric {
                tool: tool.to_string(),
                metric: "auc".to_string(),
            }
            .into());
        }
        Ok(Self { rounds })
    }

    pub fn push(&mut self, metrics: RoundMetrics) {
        self.rounds.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn rounds(&self) -> &[RoundMetrics] {
        &self.rounds
    }

    pub fn last(&self) -> Option<&RoundMetrics> {
        self.rounds.last()
    }

    /// Best validation round under early stopping with `patience`.
    ///
    /// Scanning stops once `patience` consecutive rounds fail to strictly
    /// improve on the best validation AUC; ties keep the earlier round.
    pub fn best_round(&self, patience: usize) -> Option<&RoundMetrics> {
        let mut best = self.rounds.first()?;
        let mut stale = 0;
        for metrics in &self.rounds[1..] {
            if metrics.valid > best.valid {
                best = metrics;
                stale = 0;
            } else {
                stale += 1;
                if patience > 0 && stale >= patience {
                    break;
                }
            }
        }
        Some(best)
    }

    /// Fold score taken at the best validation checkpoint.
    pub fn best_score(
        &self,
        tool: &str,
        patience: usize,
        max_rounds: usize,
    ) -> BsResult<FoldScore> {
        let best = self
            .best_round(patience)
            .ok_or_else(|| BackendError::MissingMetric {
                tool: tool.to_string(),
                metric: "auc".to_string(),
            })?;

        if let Some(last) = self.last() {
            if last.round > max_rounds {
                warn!(
                    "{} reported {} rounds with a budget of {}",
                    tool, last.round, max_rounds
                );
            }
            if last.round != best.round {
                debug!(
                    "{}: truncating history at round {} (valid auc {:.5}), last round {} (valid auc {:.5})",
                    tool, best.round, best.valid, last.round, last.valid
                );
            }
        }

        Ok(FoldScore {
            rounds: best.round,
            train_auc: best.train,
            valid_auc: best.valid,
        })
    }
}

impl FromIterator<RoundMetrics> for EvalHistory {
    fn from_iter<I: IntoIterator<Item = RoundMetrics>>(iter: I) -> Self {
        Self {
            rounds: iter.into_iter().collect(),
        }
    }
}
