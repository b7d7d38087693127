//! FILENAME: core/cubing-engine/src/grouping_sets.rs
//! Grouping-set enumeration for CUBE and ROLLUP.
//!
//! Grouping columns are addressed by their position in the canonical list
//! `normal_cols ++ cube_cols ++ rollup_cols`. A grouping set records which of
//! those positions are active; every other position is folded.

use serde::{Deserialize, Serialize};

/// One grouping set: the active positions out of `width` grouping columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingSet {
    /// Active grouping column positions, ascending.
    pub active: Vec<usize>,

    /// Total number of grouping columns.
    pub width: usize,
}

impl GroupingSet {
    pub fn new(mut active: Vec<usize>, width: usize) -> Self {
        active.sort_unstable();
        GroupingSet { active, width }
    }

    /// The empty set: every column folded, one row over the whole table.
    pub fn is_grand_total(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_active(&self, position: usize) -> bool {
        self.active.binary_search(&position).is_ok()
    }

    /// Folded grouping column positions, ascending.
    pub fn folded(&self) -> Vec<usize> {
        (0..self.width).filter(|&p| !self.is_active(p)).collect()
    }

    /// SQL `GROUPING_ID`: bit set for each folded column, the first grouping
    /// column being the most significant bit. `None` when a folded column
    /// does not fit in 64 bits.
    pub fn grouping_id(&self) -> Option<u64> {
        self.folded().into_iter().try_fold(0u64, |id, p| {
            1u64.checked_shl((self.width - 1 - p) as u32)
                .map(|bit| id | bit)
        })
    }
}

/// All 2^n subsets, by size ascending, lexicographic within a size.
pub fn cube_combinations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    let n = items.len();
    let mut result = Vec::with_capacity(1usize << n.min(20));
    for k in 0..=n {
        for indices in combinations_of_size(n, k) {
            result.push(indices.iter().map(|&i| items[i].clone()).collect());
        }
    }
    result
}

/// The n+1 prefixes, shortest first.
pub fn rollup_combinations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    (0..=items.len()).map(|i| items[..i].to_vec()).collect()
}

/// Index combinations of size `k` out of `n`, in lexicographic order.
fn combinations_of_size(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k > n {
        return Vec::new();
    }

    let mut indices: Vec<usize> = (0..k).collect();
    let mut result = vec![indices.clone()];
    loop {
        // Rightmost index that can still move right
        let Some(i) = (0..k).rev().find(|&i| indices[i] != i + n - k) else {
            return result;
        };
        indices[i] += 1;
        for j in i + 1..k {
            indices[j] = indices[j - 1] + 1;
        }
        result.push(indices.clone());
    }
}

/// Cross product of CUBE subsets (outer) and ROLLUP prefixes (inner), each
/// extended with every normal column.
pub fn grouping_sets(normal: usize, cube: usize, rollup: usize) -> Vec<GroupingSet> {
    let width = normal + cube + rollup;
    let normal_positions: Vec<usize> = (0..normal).collect();
    let cube_positions: Vec<usize> = (normal..normal + cube).collect();
    let rollup_positions: Vec<usize> = (normal + cube..width).collect();

    let rollup_combs = rollup_combinations(&rollup_positions);

    let mut sets = Vec::new();
    for cube_comb in cube_combinations(&cube_positions) {
        for rollup_comb in &rollup_combs {
            let active = normal_positions
                .iter()
                .chain(cube_comb.iter())
                .chain(rollup_comb.iter())
                .copied()
                .collect();
            sets.push(GroupingSet::new(active, width));
        }
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_combinations() {
        assert_eq!(cube_combinations::<u8>(&[]), vec![Vec::<u8>::new()]);
        assert_eq!(cube_combinations(&[1]), vec![vec![], vec![1]]);
        assert_eq!(
            cube_combinations(&[1, 2, 3, 4]),
            vec![
                vec![],
                vec![1], vec![2], vec![3], vec![4],
                vec![1, 2], vec![1, 3], vec![1, 4], vec![2, 3], vec![2, 4], vec![3, 4],
                vec![1, 2, 3], vec![1, 2, 4], vec![1, 3, 4], vec![2, 3, 4],
                vec![1, 2, 3, 4],
            ]
        );
    }

    #[test]
    fn test_rollup_combinations() {
        assert_eq!(rollup_combinations::<u8>(&[]), vec![Vec::<u8>::new()]);
        assert_eq!(rollup_combinations(&[1]), vec![vec![], vec![1]]);
        assert_eq!(
            rollup_combinations(&[1, 2, 3, 4]),
            vec![vec![], vec![1], vec![1, 2], vec![1, 2, 3], vec![1, 2, 3, 4]]
        );
    }

    #[test]
    fn test_grouping_set_counts() {
        assert_eq!(grouping_sets(0, 3, 0).len(), 8);
        assert_eq!(grouping_sets(0, 0, 3).len(), 4);
        assert_eq!(grouping_sets(1, 2, 1).len(), 8);
        assert_eq!(grouping_sets(0, 0, 0), vec![GroupingSet::new(vec![], 0)]);
    }

    #[test]
    fn test_normal_columns_never_fold() {
        let sets = grouping_sets(1, 1, 1);
        assert_eq!(
            sets.iter().map(|s| s.active.clone()).collect::<Vec<_>>(),
            vec![vec![0], vec![0, 2], vec![0, 1], vec![0, 1, 2]]
        );
        assert!(sets.iter().all(|s| s.is_active(0)));
    }

    #[test]
    fn test_grouping_id() {
        let set = GroupingSet::new(vec![1], 3);
        assert_eq!(set.folded(), vec![0, 2]);
        assert_eq!(set.grouping_id(), Some(0b101));
        assert_eq!(GroupingSet::new(vec![], 3).grouping_id(), Some(0b111));
        assert_eq!(GroupingSet::new(vec![0, 1, 2], 3).grouping_id(), Some(0));
        assert!(GroupingSet::new(vec![], 2).is_grand_total());
    }

    #[test]
    fn test_grouping_id_wider_than_64_columns() {
        // Only the trailing 64 columns folded: still representable
        let set = GroupingSet::new(vec![0], 65);
        assert_eq!(set.grouping_id(), Some(u64::MAX));

        assert_eq!(GroupingSet::new(vec![], 65).grouping_id(), None);
        assert_eq!(GroupingSet::new((0..65).collect(), 65).grouping_id(), Some(0));
    }
}
