//! Final, read-only labeled dataset
//!
//! Features and labels are accumulated side by side. [`reconcile`] pairs them
//! up, truncating both to their common length: a shutdown race can leave one
//! sequence a row longer than the other, and the extra row is dropped with a
//! warning instead of failing the run.

use crate::window::{FeatureRecord, WindowLabel};
use serde::Serialize;

/// One row of the windowed-prediction dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabeledExample {
    #[serde(flatten)]
    pub features: FeatureRecord,
    #[serde(flatten)]
    pub label: WindowLabel,
}

/// Aggregate counts over a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub windows: usize,
    pub windows_with_faults: usize,
    pub positive_labels: usize,
    pub partial_labels: usize,
}

/// Immutable snapshot of labeled examples
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    examples: Vec<LabeledExample>,
    /// Rows discarded to bring features and labels to equal length
    alignment_dropped: usize,
}

impl Dataset {
    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    pub fn features(&self) -> impl Iterator<Item = &FeatureRecord> + '_ {
        self.examples.iter().map(|e| &e.features)
    }

    pub fn labels(&self) -> impl Iterator<Item = &WindowLabel> + '_ {
        self.examples.iter().map(|e| &e.label)
    }

    /// Example for a specific window, if one was emitted
    pub fn example_for(&self, window_id: u64) -> Option<&LabeledExample> {
        self.examples
            .binary_search_by_key(&window_id, |e| e.features.window_id)
            .ok()
            .map(|i| &self.examples[i])
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn alignment_dropped(&self) -> usize {
        self.alignment_dropped
    }

    pub fn summary(&self) -> DatasetSummary {
        let mut summary = DatasetSummary {
            windows: self.examples.len(),
            ..DatasetSummary::default()
        };
        for e in &self.examples {
            if e.features.faults_current > 0 {
                summary.windows_with_faults += 1;
            }
            if e.label.next_window_has_fault {
                summary.positive_labels += 1;
            }
            if e.label.partial {
                summary.partial_labels += 1;
            }
        }
        summary
    }
}

/// Pair features with labels, truncating to the shorter sequence
pub fn reconcile(features: &[FeatureRecord], labels: &[WindowLabel]) -> Dataset {
    let len = features.len().min(labels.len());
    let dropped = features.len().max(labels.len()) - len;
    if dropped > 0 {
        tracing::warn!(
            features = features.len(),
            labels = labels.len(),
            "feature/label length mismatch, truncating to {}",
            len
        );
    }

    let examples = features
        .iter()
        .zip(labels)
        .map(|(features, label)| LabeledExample {
            features: *features,
            label: *label,
        })
        .collect();

    Dataset {
        examples,
        alignment_dropped: dropped,
    }
}
