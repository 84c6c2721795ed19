//! Word-level change estimation between two versions of a domain's
//! primary document. A coarse textual heuristic, not a structural diff:
//! the percentage of diffed word tokens that were added or removed.

use serde::Serialize;
use similar::{Algorithm, DiffOp, capture_diff_slices};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChangeEstimate {
    /// In [0, 100].
    pub percent_difference: f64,
    /// Strictly-greater-than-zero difference.
    pub changed: bool,
}

impl ChangeEstimate {
    /// No baseline to compare against: zero signal, not "no change".
    pub const NONE: ChangeEstimate = ChangeEstimate {
        percent_difference: 0.0,
        changed: false,
    };
}

/// Estimate how much `newer` differs from `older`. Either side missing
/// means there is no baseline, which reports zero rather than an error.
pub fn estimate(older: Option<&str>, newer: Option<&str>) -> ChangeEstimate {
    let (Some(older), Some(newer)) = (older, newer) else {
        return ChangeEstimate::NONE;
    };
    let percent = percent_difference(older, newer);
    ChangeEstimate {
        percent_difference: percent,
        changed: percent > 0.0,
    }
}

/// `100 * changed_tokens / total_tokens` over a Myers word diff, where
/// changed tokens are those inside inserted or deleted segments and the
/// total counts every segment. Zero when there are no tokens at all.
pub fn percent_difference(older: &str, newer: &str) -> f64 {
    let older_words: Vec<&str> = older.split_whitespace().collect();
    let newer_words: Vec<&str> = newer.split_whitespace().collect();

    let mut changed = 0usize;
    let mut total = 0usize;
    for op in capture_diff_slices(Algorithm::Myers, &older_words, &newer_words) {
        match op {
            DiffOp::Equal { len, .. } => total += len,
            DiffOp::Delete { old_len, .. } => {
                changed += old_len;
                total += old_len;
            }
            DiffOp::Insert { new_len, .. } => {
                changed += new_len;
                total += new_len;
            }
            DiffOp::Replace {
                old_len, new_len, ..
            } => {
                changed += old_len + new_len;
                total += old_len + new_len;
            }
        }
    }

    if total == 0 {
        0.0
    } else {
        100.0 * changed as f64 / total as f64
    }
}
