//! Binary classification metrics

use serde::Serialize;

/// Confusion counts for binary labels.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[f64], y_pred: &[f64]) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t > 0.5, p > 0.5) {
                (true, true) => cm.true_positives += 1,
                (false, false) => cm.true_negatives += 1,
                (false, true) => cm.false_positives += 1,
                (true, false) => cm.false_negatives += 1,
            }
        }
        cm
    }

    pub fn accuracy(&self) -> f64 {
        let total =
            self.true_positives + self.true_negatives + self.false_positives + self.false_negatives;
        if total == 0 {
            return 0.0;
        }
        (self.true_positives + self.true_negatives) as f64 / total as f64
    }

    pub fn precision(&self) -> f64 {
        let denom = self.true_positives + self.false_positives;
        if denom == 0 {
            return 0.0;
        }
        self.true_positives as f64 / denom as f64
    }

    pub fn recall(&self) -> f64 {
        let denom = self.true_positives + self.false_negatives;
        if denom == 0 {
            return 0.0;
        }
        self.true_positives as f64 / denom as f64
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            return 0.0;
        }
        2.0 * p * r / (p + r)
    }
}

/// All scores for one (labels, predictions) pair.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
}

impl ClassificationMetrics {
    pub fn compute(y_true: &[f64], y_pred: &[f64], y_proba: &[f64]) -> Self {
        let confusion = ConfusionMatrix::from_labels(y_true, y_pred);
        Self {
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            roc_auc: roc_auc(y_true, y_proba),
            confusion,
        }
    }
}

/// ROC-AUC via the rank statistic (Mann-Whitney U). Ties share average rank.
/// 0.5 when either class is absent.
pub fn roc_auc(y_true: &[f64], y_proba: &[f64]) -> f64 {
    let n_pos = y_true.iter().filter(|&&y| y > 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..y_proba.len()).collect();
    order.sort_by(|&a, &b| {
        y_proba[a]
            .partial_cmp(&y_proba[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Average ranks over tied probability groups
    let mut ranks = vec![0.0; y_proba.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && y_proba[order[j + 1]] == y_proba[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let rank_sum_pos: f64 = y_true
        .iter()
        .zip(ranks.iter())
        .filter(|(&y, _)| y > 0.5)
        .map(|(_, &r)| r)
        .sum();
    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    u / (n_pos * n_neg) as f64
}
