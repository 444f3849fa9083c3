// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::Tipset;
use tracing::trace;

/// Two tipsets belong to the same chain when they are equal or directly
/// connected by the parent/child relation.
pub(in crate::chain_sync) fn same_chain_as(a: &Tipset, b: &Tipset) -> bool {
    a == b || a.parents() == b.key() || b.parents() == a.key()
}

/// A cluster of tipsets believed to belong to the same chain lineage,
/// in insertion order, with a count of how often the lineage was observed.
#[derive(Clone, Debug, Default)]
pub struct SyncBucket {
    tips: Vec<Arc<Tipset>>,
    count: usize,
}

impl SyncBucket {
    fn new(tipset: Arc<Tipset>) -> Self {
        Self {
            tips: vec![tipset],
            count: 1,
        }
    }

    /// Whether `ts` is connected to any member of this bucket.
    pub fn is_same_chain_as(&self, ts: &Tipset) -> bool {
        self.tips.iter().any(|t| same_chain_as(t, ts))
    }

    /// Records an observation of `ts`. The tipset is appended unless an equal
    /// one is already present, in which case only the observation count grows.
    pub fn add(&mut self, ts: Arc<Tipset>) {
        self.count += 1;
        if !self.tips.iter().any(|t| t.key() == ts.key()) {
            self.tips.push(ts);
        }
    }

    /// The member with the greatest weight. Among members of exactly equal
    /// weight the earliest inserted stands; callers must not rely on which.
    pub fn heaviest_tipset(&self) -> Option<Arc<Tipset>> {
        let mut best: Option<&Arc<Tipset>> = None;
        for ts in &self.tips {
            match best {
                Some(b) if ts.weight() <= b.weight() => {}
                _ => best = Some(ts),
            }
        }
        best.cloned()
    }

    /// How many times a tipset of this lineage was observed.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn tipsets(&self) -> &[Arc<Tipset>] {
        &self.tips
    }

    pub fn len(&self) -> usize {
        self.tips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tips.is_empty()
    }
}

/// An unordered collection of [`SyncBucket`]s partitioning every inserted
/// tipset into disjoint lineage clusters.
#[derive(Debug, Default)]
pub struct SyncBucketSet {
    buckets: Vec<SyncBucket>,
}

impl SyncBucketSet {
    /// Adds `ts` to the bucket it is related to, or opens a new singleton
    /// bucket. Relation partitions the set, so the first match is the only
    /// match.
    pub fn insert(&mut self, ts: Arc<Tipset>) {
        if let Some(b) = self.buckets.iter_mut().find(|b| b.is_same_chain_as(&ts)) {
            b.add(ts);
        } else {
            trace!(epoch = ts.epoch(), "new sync bucket");
            self.buckets.push(SyncBucket::new(ts));
        }
    }

    /// Removes and returns the bucket whose heaviest member has the greatest
    /// weight. An exact weight tie between buckets is broken deterministically
    /// towards the smaller tipset key.
    pub fn pop(&mut self) -> Option<SyncBucket> {
        let mut best: Option<(usize, Arc<Tipset>)> = None;
        for (idx, bucket) in self.buckets.iter().enumerate() {
            // Buckets are non-empty by construction.
            let Some(heaviest) = bucket.heaviest_tipset() else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((_, best_ts)) => match heaviest.weight().cmp(best_ts.weight()) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Equal => heaviest.key() < best_ts.key(),
                    std::cmp::Ordering::Less => false,
                },
            };
            if better {
                best = Some((idx, heaviest));
            }
        }
        best.map(|(idx, _)| self.buckets.remove(idx))
    }

    /// Removes and returns the bucket related to `ts`, if any.
    pub fn pop_related(&mut self, ts: &Tipset) -> Option<SyncBucket> {
        let idx = self.buckets.iter().position(|b| b.is_same_chain_as(ts))?;
        Some(self.buckets.remove(idx))
    }

    /// Whether any bucket in the set is related to `ts`.
    pub fn related_to_any(&self, ts: &Tipset) -> bool {
        self.buckets.iter().any(|b| b.is_same_chain_as(ts))
    }

    /// The heaviest tipset across all buckets, without mutating the set.
    /// Ties are broken the same way as in [`SyncBucketSet::pop`].
    pub fn heaviest(&self) -> Option<Arc<Tipset>> {
        self.buckets
            .iter()
            .filter_map(SyncBucket::heaviest_tipset)
            .max_by(|a, b| {
                a.weight()
                    .cmp(b.weight())
                    .then_with(|| b.key().cmp(a.key()))
            })
    }

    /// Re-inserts a bucket popped earlier, e.g. overflow work that became
    /// schedulable again. The caller guarantees it is unrelated to every
    /// bucket already in the set.
    pub fn append_bucket(&mut self, bucket: SyncBucket) {
        self.buckets.push(bucket);
    }

    pub fn buckets(&self) -> &[SyncBucket] {
        &self.buckets
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{key_of, mock_tipset, mock_tipset_with_parents};
    use quickcheck_macros::quickcheck;

    #[test]
    fn insert_joins_related_bucket() {
        let mut set = SyncBucketSet::default();
        let t1 = mock_tipset(1, 5, 100);
        let t2 = mock_tipset_with_parents(2, 6, 200, t1.key().clone());
        let unrelated = mock_tipset(3, 5, 150);

        set.insert(t1.clone());
        set.insert(t2.clone());
        set.insert(unrelated.clone());

        assert_eq!(set.buckets().len(), 2);
        assert!(set.related_to_any(&t2));
        assert!(set.related_to_any(&unrelated));
    }

    #[test]
    fn add_deduplicates_but_counts() {
        let mut set = SyncBucketSet::default();
        let t1 = mock_tipset(1, 5, 100);
        set.insert(t1.clone());
        set.insert(t1.clone());
        assert_eq!(set.buckets().len(), 1);
        assert_eq!(set.buckets()[0].len(), 1);
        assert_eq!(set.buckets()[0].count(), 2);
    }

    #[test]
    fn pop_returns_heaviest_bucket() {
        let mut set = SyncBucketSet::default();
        let light = mock_tipset(1, 5, 100);
        let heavy = mock_tipset(2, 5, 300);
        let middle = mock_tipset(3, 5, 200);
        set.insert(light.clone());
        set.insert(heavy.clone());
        set.insert(middle.clone());

        let popped = set.pop().unwrap();
        assert_eq!(popped.heaviest_tipset().unwrap(), heavy);
        assert_eq!(set.buckets().len(), 2);
        assert_eq!(set.heaviest().unwrap(), middle);
    }

    #[test]
    fn pop_breaks_exact_weight_ties_by_key() {
        let mut a = SyncBucketSet::default();
        let x = mock_tipset(1, 5, 100);
        let y = mock_tipset(2, 5, 100);
        a.insert(x.clone());
        a.insert(y.clone());

        let mut b = SyncBucketSet::default();
        b.insert(y.clone());
        b.insert(x.clone());

        // Same winner regardless of insertion order: the smaller key.
        let expected = x.key().min(y.key());
        let first_a = a.pop().unwrap().heaviest_tipset().unwrap();
        let first_b = b.pop().unwrap().heaviest_tipset().unwrap();
        assert_eq!(first_a, first_b);
        assert_eq!(first_a.key(), expected);
    }

    #[test]
    fn heaviest_member_prefers_weight_over_height() {
        let parent = mock_tipset(1, 5, 400);
        let mut bucket = SyncBucket::new(parent.clone());
        bucket.add(mock_tipset_with_parents(2, 6, 300, parent.key().clone()));
        // The child is taller but lighter; weight decides.
        assert_eq!(bucket.heaviest_tipset().unwrap(), parent);
    }

    #[test]
    fn pop_related_removes_matching_bucket() {
        let mut set = SyncBucketSet::default();
        let t1 = mock_tipset(1, 5, 100);
        let child = mock_tipset_with_parents(2, 6, 200, t1.key().clone());
        let unrelated = mock_tipset(3, 5, 150);
        set.insert(t1.clone());
        set.insert(unrelated.clone());

        let bucket = set.pop_related(&child).unwrap();
        assert!(bucket.is_same_chain_as(&t1));
        assert_eq!(set.buckets().len(), 1);
        assert!(set.pop_related(&child).is_none());
    }

    /// Inserting lineage roots and their children in any order keeps the
    /// buckets pairwise unrelated and clustered one bucket per lineage.
    #[quickcheck]
    fn partition_invariant(picks: Vec<(u8, u64)>) -> bool {
        let roots: Vec<_> = (0..4u64)
            .map(|l| mock_tipset_with_parents(l, 1, 50, key_of(&[l])))
            .collect();
        let mut seen = std::collections::BTreeSet::new();
        let mut set = SyncBucketSet::default();
        for (lineage, salt) in picks {
            let lineage = usize::from(lineage) % roots.len();
            if seen.insert(lineage) {
                set.insert(roots[lineage].clone());
            }
            set.insert(mock_tipset_with_parents(
                salt,
                2,
                salt,
                roots[lineage].key().clone(),
            ));
        }
        let one_bucket_per_lineage = set.buckets().len() == seen.len();
        let pairwise_unrelated = set.buckets().iter().enumerate().all(|(i, a)| {
            set.buckets().iter().skip(i + 1).all(|b| {
                a.tipsets().iter().all(|ts| !b.is_same_chain_as(ts))
            })
        });
        one_bucket_per_lineage && pairwise_unrelated
    }
}
