//! Shared statistical helpers
//!
//! Small numeric building blocks used across feature extraction and the
//! models: safe division, moments, quantiles, percentile ranks, and the
//! rank-based quantile binning behind RFM scoring.

/// Division that never produces NaN/Inf; returns `fill` when the denominator
/// is zero or not finite.
pub fn safe_divide(numerator: f64, denominator: f64, fill: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        return fill;
    }
    let result = numerator / denominator;
    if result.is_finite() {
        result
    } else {
        fill
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than 2 values.
pub fn std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// Coefficient of variation, 0 when the mean is 0.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    safe_divide(std_dev(values), mean(values), 0.0)
}

/// Adjusted Fisher-Pearson sample skewness; 0 for fewer than 3 values or a
/// constant series.
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let m = mean(values);
    let s = std_dev(values);
    if s == 0.0 {
        return 0.0;
    }
    let nf = n as f64;
    let m3 = values.iter().map(|v| ((v - m) / s).powi(3)).sum::<f64>();
    m3 * nf / ((nf - 1.0) * (nf - 2.0))
}

/// Quantile with linear interpolation, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Percentile ranks in [0, 100] using average ranks for ties.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![100.0];
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        // Group ties and give each the average of their 1-based ranks.
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    ranks.iter().map(|r| r / n as f64 * 100.0).collect()
}

/// Rank-based quantile binning into scores `1..=bins`.
///
/// Ties are broken by original position (rank method "first"), so the binning
/// is deterministic for equal values. With `reverse`, lower raw values get
/// higher scores (used for recency). If the series has at most one distinct
/// value or fewer values than bins, every entry gets the mid-range fallback
/// score instead of an error.
pub fn quantile_scores(values: &[f64], bins: usize, reverse: bool) -> Vec<u8> {
    let n = values.len();
    let fallback = ((bins + 1) / 2).max(1) as u8;
    if n == 0 {
        return Vec::new();
    }

    let distinct = {
        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sorted.dedup();
        sorted.len()
    };
    if distinct <= 1 || n < bins {
        return vec![fallback; n];
    }

    // Stable sort by value keeps original order within ties.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut scores = vec![fallback; n];
    for (rank, &idx) in order.iter().enumerate() {
        let bin = (rank * bins / n).min(bins - 1);
        let score = if reverse { bins - bin } else { bin + 1 };
        scores[idx] = score as u8;
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_safe_divide() {
        assert_eq!(safe_divide(10.0, 2.0, 0.0), 5.0);
        assert_eq!(safe_divide(10.0, 0.0, 0.0), 0.0);
        assert_eq!(safe_divide(10.0, 0.0, 1.5), 1.5);
    }

    #[test]
    fn test_skewness_symmetric_vs_skewed() {
        let symmetric: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert!(skewness(&symmetric).abs() < 0.5);

        let skewed: Vec<f64> = (0..100).map(|i| (i as f64 / 10.0).exp()).collect();
        assert!(skewness(&skewed) > 2.0);
    }

    #[test]
    fn test_quantile_scores_even_split() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let scores = quantile_scores(&values, 5, false);
        assert_eq!(scores, vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
    }

    #[test]
    fn test_quantile_scores_reverse() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let scores = quantile_scores(&values, 5, true);
        assert_eq!(scores, vec![5, 5, 4, 4, 3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn test_quantile_scores_degenerate_mid_fallback() {
        let values = vec![7.0; 6];
        assert_eq!(quantile_scores(&values, 5, false), vec![3; 6]);

        let single = vec![1.0];
        assert_eq!(quantile_scores(&single, 5, false), vec![3]);
    }

    #[test]
    fn test_quantile_scores_tie_break_by_position() {
        // Equal values keep input order, so the earlier row lands in the
        // lower bin deterministically.
        let values = vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let scores = quantile_scores(&values, 3, false);
        assert_eq!(scores, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_percentile_ranks() {
        let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let ranks = percentile_ranks(&values);
        assert_relative_eq!(ranks[0], 20.0);
        assert_relative_eq!(ranks[4], 100.0);
    }

    #[test]
    fn test_quantile_interpolation() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile(&values, 0.5), 2.5);
        assert_relative_eq!(quantile(&values, 0.25), 1.75);
    }
}
