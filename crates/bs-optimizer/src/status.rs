//! Sweep lifecycle tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bs_types::{BackendKind, Encoding};

use crate::results::ResultRow;

/// Unique sweep run identifier.
pub type SweepId = Uuid;

/// Lifecycle state of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate status of a sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepStatus {
    pub id: SweepId,
    pub name: String,
    pub backend: BackendKind,
    pub encoding: Encoding,
    pub state: SweepState,
    pub total: usize,
    pub completed: usize,
    pub best: Option<ResultRow>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SweepStatus {
    pub fn new(
        name: impl Into<String>,
        backend: BackendKind,
        encoding: Encoding,
        total: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            backend,
            encoding,
            state: SweepState::Pending,
            total,
            completed: 0,
            best: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = SweepState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = SweepState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = SweepState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Count a finished iteration and keep it if it beats the best
    /// mean validation AUC so far.
    pub fn record(&mut self, row: &ResultRow) {
        self.completed += 1;
        let improves = match &self.best {
            None => !row.summary.valid_auc_mean.is_nan(),
            Some(best) => row.summary.valid_auc_mean > best.summary.valid_auc_mean,
        };
        if improves {
            self.best = Some(row.clone());
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bs_types::{CvSummary, FoldScore, ParamSet};

    fn row(iteration: usize, valid: f64) -> ResultRow {
        ResultRow {
            iteration,
            summary: CvSummary::from_scores(&[FoldScore {
                rounds: 50,
                train_auc: 0.9,
                valid_auc: valid,
            }]),
            params: ParamSet::new().with("depth", 6i64),
            elapsed_secs: 2.0,
        }
    }

    #[test]
    fn sweep_status_lifecycle() {
        let mut status =
            SweepStatus::new("lgbm-factorize", BackendKind::LightGbm, Encoding::Factorize, 6);
        assert_eq!(status.state, SweepState::Pending);
        assert!(status.started_at.is_none());

        status.mark_running();
        assert_eq!(status.state, SweepState::Running);
        assert!(status.started_at.is_some());

        status.mark_completed();
        assert_eq!(status.state, SweepState::Completed);
        assert!(status.duration().is_some());
    }

    #[test]
    fn best_row_tracking() {
        let mut status = SweepStatus::new("cb", BackendKind::CatBoost, Encoding::OneHot, 3);
        status.record(&row(0, 0.70));
        status.record(&row(1, 0.74));
        status.record(&row(2, 0.72));

        assert_eq!(status.completed, 3);
        assert_eq!(status.best.as_ref().unwrap().iteration, 1);
    }

    #[test]
    fn nan_never_becomes_best() {
        let mut status = SweepStatus::new("xgb", BackendKind::XgBoost, Encoding::Factorize, 2);
        status.record(&row(0, f64::NAN));
        assert!(status.best.is_none());
        status.record(&row(1, 0.6));
        assert_eq!(status.best.as_ref().unwrap().iteration, 1);
    }

    #[test]
    fn failure_keeps_error() {
        let mut status = SweepStatus::new("xgb", BackendKind::XgBoost, Encoding::Factorize, 2);
        status.mark_running();
        status.mark_failed("xgboost exited with exit status: 1".into());
        assert_eq!(status.state, SweepState::Failed);
        assert_eq!(status.error.as_deref(), Some("xgboost exited with exit status: 1"));
    }
}
