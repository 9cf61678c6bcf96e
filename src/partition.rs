use std::collections::BTreeSet;

use itertools::Itertools;
use log::warn;

/// Above this many levels the `2^(L-1) - 1` enumeration gets expensive; it
/// still runs, but the configuration is flagged.
pub const MAX_DISCRETE_LEVELS: usize = 12;

/// A split of discrete levels into two disjoint, non-empty sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntegerPartition {
    left: BTreeSet<i64>,
    right: BTreeSet<i64>,
}

impl IntegerPartition {
    pub fn new(left: BTreeSet<i64>, right: BTreeSet<i64>) -> Self {
        Self { left, right }
    }

    pub fn left(&self) -> &BTreeSet<i64> {
        &self.left
    }

    pub fn right(&self) -> &BTreeSet<i64> {
        &self.right
    }

    /// Levels not seen during enumeration are sent right.
    pub fn is_left(&self, level: i64) -> bool {
        self.left.contains(&level)
    }

    /// Same partition with sides swapped compares equal under this key.
    fn canonical_key(&self) -> (Vec<i64>, Vec<i64>) {
        let l: Vec<i64> = self.left.iter().copied().collect();
        let r: Vec<i64> = self.right.iter().copied().collect();
        if l <= r {
            (l, r)
        } else {
            (r, l)
        }
    }

    pub fn is_mirror_of(&self, other: &IntegerPartition) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

/// Enumerates every essentially distinct 2-partition of `levels`.
///
/// The smallest level is pinned to the left set, which removes left/right
/// mirror images; the all-left mask is skipped because it leaves the right
/// set empty. For `L` distinct levels this yields `2^(L-1) - 1` partitions.
pub fn enumerate_partitions(levels: &[i64]) -> Vec<IntegerPartition> {
    let levels: Vec<i64> = levels.iter().copied().sorted_unstable().dedup().collect();
    let l = levels.len();
    if l < 2 {
        return Vec::new();
    }
    if l > 63 {
        warn!("discrete variable with {} levels cannot be enumerated; skipped", l);
        return Vec::new();
    }
    if l > MAX_DISCRETE_LEVELS {
        warn!(
            "discrete variable with {} levels: enumerating {} partitions",
            l,
            (1u64 << (l - 1)) - 1
        );
    }

    let (pinned, rest) = (levels[0], &levels[1..]);
    let n_masks: u64 = 1 << rest.len();
    (1..n_masks)
        .map(|mask| {
            let mut left = BTreeSet::from([pinned]);
            let mut right = BTreeSet::new();
            for (bit, &level) in rest.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    right.insert(level);
                } else {
                    left.insert(level);
                }
            }
            IntegerPartition::new(left, right)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_partition_count() {
        for l in 1..=8usize {
            let levels: Vec<i64> = (0..l as i64).collect();
            let partitions = enumerate_partitions(&levels);
            let expected = if l < 2 { 0 } else { (1 << (l - 1)) - 1 };
            assert_eq!(partitions.len(), expected, "L = {}", l);
        }
    }

    #[test]
    fn test_no_duplicates_or_mirrors() {
        let partitions = enumerate_partitions(&[3, 1, 4, 1, 5, 9]);
        assert_eq!(partitions.len(), 15);
        let keys: HashSet<_> = partitions.iter().map(|p| p.canonical_key()).collect();
        assert_eq!(keys.len(), partitions.len());
        for p in &partitions {
            assert!(!p.left().is_empty());
            assert!(!p.right().is_empty());
            assert!(p.left().is_disjoint(p.right()));
            assert_eq!(p.left().len() + p.right().len(), 5);
        }
    }

    #[test]
    fn test_mirror() {
        let a = IntegerPartition::new(BTreeSet::from([1]), BTreeSet::from([2, 3]));
        let b = IntegerPartition::new(BTreeSet::from([2, 3]), BTreeSet::from([1]));
        assert!(a.is_mirror_of(&b));
        assert!(a.is_left(1));
        assert!(!a.is_left(7));
    }
}
