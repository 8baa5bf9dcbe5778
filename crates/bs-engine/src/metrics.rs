use bs_types::{BackendError, BsResult};

/// Area under the ROC curve for binary labels.
///
/// Computed from the Mann-Whitney U statistic with average ranks for tied
/// scores. Labels are treated as positive when `> 0.5`.
pub fn roc_auc(labels: &[f64], scores: &[f64]) -> BsResult<f64> {
    if labels.len() != scores.len() {
        return Err(bs_types::validation_error!(
            "roc_auc: {} labels but {} scores",
            labels.len(),
            scores.len()
        ));
    }

    let n_pos = labels.iter().filter(|&&y| y > 0.5).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(BackendError::SingleClass { rows: labels.len() }.into());
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Sum of 1-based ranks of the positives, ties sharing their mean rank.
    let mut pos_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && scores[order[j]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j + 1) as f64 / 2.0;
        pos_rank_sum += order[i..j]
            .iter()
            .filter(|&&idx| labels[idx] > 0.5)
            .count() as f64
            * avg_rank;
        i = j;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    let u = pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Ok(u / (n_pos * n_neg))
}
