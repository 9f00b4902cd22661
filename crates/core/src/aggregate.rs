use serde::{Deserialize, Serialize};

use crate::model::ItemRecord;

/// Completion figures derived from a list's items. Never stored; recompute
/// whenever the item set may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListAggregate {
    pub total_count: usize,
    pub checked_count: usize,
    pub unchecked_count: usize,
    /// Percentage of checked items, rounded to one decimal place.
    pub completion_percentage: f64,
    pub can_be_completed: bool,
}

impl ListAggregate {
    pub fn compute<'a>(items: impl IntoIterator<Item = &'a ItemRecord>) -> Self {
        let (total, checked) = items.into_iter().fold((0usize, 0usize), |(t, c), item| {
            (t + 1, c + usize::from(item.checked))
        });
        Self::from_counts(checked, total)
    }

    pub fn from_counts(checked: usize, total: usize) -> Self {
        let completion_percentage = if total == 0 {
            0.0
        } else {
            (checked as f64 / total as f64 * 1000.0).round() / 10.0
        };
        let unchecked = total - checked.min(total);
        Self {
            total_count: total,
            checked_count: checked.min(total),
            unchecked_count: unchecked,
            completion_percentage,
            can_be_completed: total > 0 && unchecked == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_not_completable() {
        let agg = ListAggregate::from_counts(0, 0);
        assert_eq!(agg.completion_percentage, 0.0);
        assert!(!agg.can_be_completed);
    }

    #[test]
    fn two_of_three_rounds_to_one_decimal() {
        let agg = ListAggregate::from_counts(2, 3);
        assert_eq!(agg.completion_percentage, 66.7);
        assert_eq!(agg.unchecked_count, 1);
        assert!(!agg.can_be_completed);
    }

    #[test]
    fn one_of_three_rounds_down() {
        assert_eq!(ListAggregate::from_counts(1, 3).completion_percentage, 33.3);
    }

    #[test]
    fn all_checked_is_completable() {
        let agg = ListAggregate::from_counts(4, 4);
        assert_eq!(agg.completion_percentage, 100.0);
        assert!(agg.can_be_completed);
    }

    #[test]
    fn recomputing_is_stable() {
        assert_eq!(ListAggregate::from_counts(5, 7), ListAggregate::from_counts(5, 7));
    }
}
