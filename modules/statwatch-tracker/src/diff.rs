//! Category-keyed deltas between Known State and a fresh snapshot.
//!
//! Legitimate deltas are never negative. A drop to the floor value is a
//! silent drop (the entity fell off a ranked listing); any other drop is an
//! anomaly that the caller counts as a strike.

use std::collections::BTreeMap;

use thiserror::Error;

use statwatch_common::Category;

/// Value an unranked entry reappears at after falling off the listing.
pub const SILENT_DROP_FLOOR: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("negative delta for {category}: {before} -> {after}")]
    NegativeDelta {
        category: Category,
        before: u64,
        after: u64,
    },

    /// `before` held a category that `after` does not report.
    #[error("category {category} present in known state but missing from snapshot")]
    MissingCategory { category: Category },
}

/// A drop to the floor value, excluded from the delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilentDrop {
    pub category: Category,
    pub before: u64,
}

/// Validated result of one group's diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Strictly positive changes, keyed by category.
    pub deltas: BTreeMap<Category, u64>,
    pub silent_drops: Vec<SilentDrop>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Compute the positive delta from `before` to `after`.
///
/// Categories absent from `before` are compared against `baseline`.
/// Every key of `before` must be present in `after`.
pub fn compute_diff(
    before: &BTreeMap<Category, u64>,
    after: &BTreeMap<Category, u64>,
    baseline: u64,
) -> Result<Diff, DiffError> {
    if let Some(category) = before.keys().find(|c| !after.contains_key(c)) {
        return Err(DiffError::MissingCategory {
            category: *category,
        });
    }

    let mut diff = Diff::default();
    for (&category, &after_value) in after {
        let effective_before = before.get(&category).copied().unwrap_or(baseline);
        if after_value == effective_before {
            continue;
        }

        if after_value < effective_before {
            if after_value == SILENT_DROP_FLOOR {
                diff.silent_drops.push(SilentDrop {
                    category,
                    before: effective_before,
                });
                continue;
            }
            return Err(DiffError::NegativeDelta {
                category,
                before: effective_before,
                after: after_value,
            });
        }

        diff.deltas.insert(category, after_value - effective_before);
    }

    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use statwatch_common::{Boss, Skill};

    const FISHING: Category = Category::Skill(Skill::Fishing);
    const COOKING: Category = Category::Skill(Skill::Cooking);
    const ZULRAH: Category = Category::Boss(Boss::Zulrah);

    fn values(pairs: &[(Category, u64)]) -> BTreeMap<Category, u64> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn positive_changes_are_reported_as_deltas() {
        let before = values(&[(FISHING, 10), (COOKING, 30)]);
        let after = values(&[(FISHING, 12), (COOKING, 30)]);

        let diff = compute_diff(&before, &after, 1).unwrap();
        assert_eq!(diff.deltas, values(&[(FISHING, 2)]));
        assert!(diff.silent_drops.is_empty());
    }

    #[test]
    fn identical_snapshots_produce_empty_diff() {
        let before = values(&[(FISHING, 10), (COOKING, 30)]);
        let diff = compute_diff(&before, &before, 1).unwrap();
        assert!(diff.is_empty());
        assert!(diff.silent_drops.is_empty());
    }

    #[test]
    fn new_categories_compare_against_baseline() {
        let before = BTreeMap::new();
        let after = values(&[(ZULRAH, 3)]);
        let diff = compute_diff(&before, &after, 0).unwrap();
        assert_eq!(diff.deltas, values(&[(ZULRAH, 3)]));
    }

    #[test]
    fn new_category_at_baseline_is_not_a_change() {
        let diff = compute_diff(&BTreeMap::new(), &values(&[(FISHING, 1)]), 1).unwrap();
        assert!(diff.is_empty());
        assert!(diff.silent_drops.is_empty());
    }

    #[test]
    fn drop_to_floor_is_silent_not_anomalous() {
        let before = values(&[(FISHING, 50), (COOKING, 10)]);
        let after = values(&[(FISHING, 1), (COOKING, 11)]);

        let diff = compute_diff(&before, &after, 1).unwrap();
        assert_eq!(diff.deltas, values(&[(COOKING, 1)]));
        assert_eq!(
            diff.silent_drops,
            vec![SilentDrop {
                category: FISHING,
                before: 50
            }]
        );
    }

    #[test]
    fn other_drops_raise_negative_delta() {
        let before = values(&[(ZULRAH, 40)]);
        let after = values(&[(ZULRAH, 39)]);

        let err = compute_diff(&before, &after, 0).unwrap_err();
        assert_eq!(
            err,
            DiffError::NegativeDelta {
                category: ZULRAH,
                before: 40,
                after: 39
            }
        );
    }

    #[test]
    fn drop_to_zero_is_an_anomaly() {
        let err = compute_diff(&values(&[(ZULRAH, 5)]), &values(&[(ZULRAH, 0)]), 0).unwrap_err();
        assert!(matches!(err, DiffError::NegativeDelta { after: 0, .. }));
    }

    #[test]
    fn before_keys_must_be_present_in_after() {
        let before = values(&[(FISHING, 10), (COOKING, 30)]);
        let after = values(&[(FISHING, 10)]);

        let err = compute_diff(&before, &after, 1).unwrap_err();
        assert_eq!(err, DiffError::MissingCategory { category: COOKING });
    }

    #[test]
    fn before_is_not_mutated() {
        let before = values(&[(FISHING, 10)]);
        let snapshot = before.clone();
        let _ = compute_diff(&before, &values(&[(FISHING, 99)]), 1);
        assert_eq!(before, snapshot);
    }
}
