//! Rule-based customer segmentation
//!
//! An ordered list of score-bound rules is evaluated against each customer's
//! R/F/M quintile scores. The first matching rule names the segment; customers
//! matching no rule fall back to "Other".

use serde::{Deserialize, Serialize};

/// Segment applied when no rule matches.
pub const FALLBACK_SEGMENT: &str = "Other";

/// Inclusive score bounds on one RFM dimension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreRange {
    #[serde(default = "ScoreRange::default_min")]
    pub min: u8,
    #[serde(default = "ScoreRange::default_max")]
    pub max: u8,
}

impl ScoreRange {
    fn default_min() -> u8 {
        1
    }

    fn default_max() -> u8 {
        5
    }

    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    /// Unbounded range, matches any score.
    pub const fn any() -> Self {
        Self { min: 1, max: 5 }
    }

    /// Score >= min.
    pub const fn at_least(min: u8) -> Self {
        Self { min, max: 5 }
    }

    /// Score <= max.
    pub const fn at_most(max: u8) -> Self {
        Self { min: 1, max }
    }

    pub fn contains(&self, score: u8) -> bool {
        score >= self.min && score <= self.max
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::any()
    }
}

/// One named segmentation rule over R/F/M score bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRule {
    pub name: String,
    #[serde(default)]
    pub recency: ScoreRange,
    #[serde(default)]
    pub frequency: ScoreRange,
    #[serde(default)]
    pub monetary: ScoreRange,
}

impl SegmentRule {
    fn new(name: &str, recency: ScoreRange, frequency: ScoreRange, monetary: ScoreRange) -> Self {
        Self {
            name: name.to_string(),
            recency,
            frequency,
            monetary,
        }
    }

    pub fn matches(&self, r: u8, f: u8, m: u8) -> bool {
        self.recency.contains(r) && self.frequency.contains(f) && self.monetary.contains(m)
    }

    /// The canonical ordered rule table. Order matters: Champions is a
    /// subset of Loyal Customers, so it must be tested first.
    pub fn default_rules() -> Vec<SegmentRule> {
        use ScoreRange as R;
        vec![
            SegmentRule::new("Champions", R::at_least(4), R::at_least(4), R::at_least(4)),
            SegmentRule::new(
                "Loyal Customers",
                R::at_least(3),
                R::at_least(3),
                R::at_least(3),
            ),
            SegmentRule::new(
                "Potential Loyalist",
                R::at_least(4),
                R::at_least(2),
                R::at_least(2),
            ),
            SegmentRule::new(
                "Recent Customers",
                R::at_least(4),
                R::at_most(2),
                R::at_most(2),
            ),
            SegmentRule::new("Promising", R::at_least(3), R::new(1, 2), R::at_least(1)),
            SegmentRule::new(
                "Need Attention",
                R::new(2, 3),
                R::at_least(2),
                R::at_least(2),
            ),
            SegmentRule::new("About To Sleep", R::new(2, 3), R::at_most(2), R::at_most(2)),
            SegmentRule::new("At Risk", R::at_most(2), R::at_least(3), R::at_least(3)),
            SegmentRule::new(
                "Cannot Lose Them",
                R::at_most(2),
                R::at_least(4),
                R::at_least(4),
            ),
            SegmentRule::new("Hibernating", R::at_most(2), R::at_most(2), R::at_most(2)),
        ]
    }
}

/// Assign a segment name by scanning rules in order.
pub fn assign_segment(rules: &[SegmentRule], r: u8, f: u8, m: u8) -> String {
    rules
        .iter()
        .find(|rule| rule.matches(r, f, m))
        .map(|rule| rule.name.clone())
        .unwrap_or_else(|| FALLBACK_SEGMENT.to_string())
}

/// Aggregate statistics for one segment across a scored batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub segment: String,
    pub customer_count: usize,
    /// Fraction of all customers in this segment.
    pub customer_share: f64,
    /// Fraction of total monetary value held by this segment.
    pub revenue_share: f64,
    pub avg_recency_days: f64,
    pub avg_frequency: f64,
    pub avg_monetary: f64,
    pub avg_rfm_score: f64,
}

/// Per-segment summaries from parallel per-customer slices, ordered by
/// customer count descending.
pub fn segment_summaries(
    segments: &[String],
    recency: &[f64],
    frequency: &[f64],
    monetary: &[f64],
    rfm_scores: &[f64],
) -> Vec<SegmentSummary> {
    let n = segments.len();
    if n == 0 {
        return Vec::new();
    }
    let total_revenue: f64 = monetary.iter().sum();

    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<&str, Vec<usize>> =
        std::collections::HashMap::new();
    for (i, seg) in segments.iter().enumerate() {
        let entry = groups.entry(seg.as_str()).or_default();
        if entry.is_empty() {
            order.push(seg.clone());
        }
        entry.push(i);
    }

    let mut summaries: Vec<SegmentSummary> = order
        .iter()
        .map(|seg| {
            let idx = &groups[seg.as_str()];
            let count = idx.len();
            let avg = |values: &[f64]| {
                idx.iter().map(|&i| values[i]).sum::<f64>() / count as f64
            };
            let segment_revenue: f64 = idx.iter().map(|&i| monetary[i]).sum();
            SegmentSummary {
                segment: seg.clone(),
                customer_count: count,
                customer_share: count as f64 / n as f64,
                revenue_share: crate::stats::safe_divide(segment_revenue, total_revenue, 0.0),
                avg_recency_days: avg(recency),
                avg_frequency: avg(frequency),
                avg_monetary: avg(monetary),
                avg_rfm_score: avg(rfm_scores),
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.customer_count.cmp(&a.customer_count));
    summaries
}
