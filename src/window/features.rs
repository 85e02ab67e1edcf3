// Rolling per-window features and lookahead labels

use serde::Serialize;

/// Features of one completed window `w`, built from the H windows before it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRecord {
    /// count(w)
    pub faults_current: u64,
    /// Σ count(w-i), i = 1..=H
    pub total_faults_history: u64,
    pub max_faults_history: u64,
    pub min_faults_history: u64,
    /// Linearly weighted average of the prior H windows
    pub trend: f64,
    pub window_id: u64,
}

impl FeatureRecord {
    /// Compute the record for `window_id`, reading counts through `count`
    ///
    /// Returns `None` while `window_id <= history_length`: there are not yet
    /// H real windows behind it. `count` must return 0 for absent windows.
    pub fn compute(
        window_id: u64,
        history_length: usize,
        count: impl Fn(u64) -> u64,
    ) -> Option<Self> {
        let h = history_length as u64;
        if h == 0 || window_id <= h {
            return None;
        }

        let mut total = 0u64;
        let mut max = 0u64;
        let mut min = u64::MAX;
        let mut weighted = 0f64;
        for i in 1..=h {
            let c = count(window_id - i);
            total = total.saturating_add(c);
            max = max.max(c);
            min = min.min(c);
            // weight H on w-1 down to 1 on w-H
            weighted += (h - i + 1) as f64 * c as f64;
        }
        let weight_sum = (h * (h + 1) / 2) as f64;

        Some(Self {
            faults_current: count(window_id),
            total_faults_history: total,
            max_faults_history: max,
            min_faults_history: min,
            trend: weighted / weight_sum,
            window_id,
        })
    }
}

/// Lookahead label for window `w`: did window `w+1` see any fault?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowLabel {
    pub next_window_has_fault: bool,
    /// Resolved at stream stop before window `w+1` was ever reached
    ///
    /// Such labels can undercount future faults and are kept flagged.
    #[serde(rename = "partial_window")]
    pub partial: bool,
}

impl WindowLabel {
    pub fn from_next_count(next_count: u64, partial: bool) -> Self {
        Self {
            next_window_has_fault: next_count > 0,
            partial,
        }
    }

    /// 0/1 encoding used in the persisted dataset
    pub fn as_u8(&self) -> u8 {
        u8::from(self.next_window_has_fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn counts(pairs: &[(u64, u64)]) -> impl Fn(u64) -> u64 {
        let map: HashMap<u64, u64> = pairs.iter().copied().collect();
        move |id| map.get(&id).copied().unwrap_or(0)
    }

    #[test]
    fn test_no_feature_at_or_below_history() {
        let c = counts(&[(5, 3)]);
        assert!(FeatureRecord::compute(0, 5, &c).is_none());
        assert!(FeatureRecord::compute(5, 5, &c).is_none());
        assert!(FeatureRecord::compute(6, 5, &c).is_some());
    }

    #[test]
    fn test_constant_history_trend_equals_constant() {
        let c = counts(&[(1, 4), (2, 4), (3, 4), (4, 4), (5, 4), (6, 9)]);
        let f = FeatureRecord::compute(6, 5, c).unwrap();
        assert_eq!(f.trend, 4.0);
        assert_eq!(f.total_faults_history, 20);
        assert_eq!(f.max_faults_history, 4);
        assert_eq!(f.min_faults_history, 4);
        assert_eq!(f.faults_current, 9);
    }

    #[test]
    fn test_trend_weights_recent_window_most() {
        let recent = FeatureRecord::compute(6, 5, counts(&[(5, 10)])).unwrap();
        let old = FeatureRecord::compute(6, 5, counts(&[(1, 10)])).unwrap();
        assert!(recent.trend > old.trend);
        assert_eq!(recent.trend, 50.0 / 15.0);
        assert_eq!(old.trend, 10.0 / 15.0);
    }

    #[test]
    fn test_missing_windows_read_as_zero() {
        let f = FeatureRecord::compute(100, 3, counts(&[(99, 2)])).unwrap();
        assert_eq!(f.faults_current, 0);
        assert_eq!(f.total_faults_history, 2);
        assert_eq!(f.min_faults_history, 0);
        assert_eq!(f.max_faults_history, 2);
    }

    #[test]
    fn test_label_from_next_count() {
        assert!(!WindowLabel::from_next_count(0, false).next_window_has_fault);
        assert_eq!(WindowLabel::from_next_count(3, false).as_u8(), 1);
        assert!(WindowLabel::from_next_count(0, true).partial);
    }
}
