//! Keep-one-per-group selection.
//!
//! Every "sort, then take the first row of each group" step goes through
//! here so the choice never depends on how a sort orders ties. On a tie the
//! earliest item in input order is kept.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Keeps, per group, the item that compares greatest under `cmp`.
pub fn pick_per_group<T, K, G, C>(items: impl IntoIterator<Item = T>, group: G, cmp: C) -> BTreeMap<K, T>
where
    K: Ord,
    G: Fn(&T) -> K,
    C: Fn(&T, &T) -> Ordering,
{
    let mut ret: BTreeMap<K, T> = BTreeMap::new();
    for item in items {
        let key = group(&item);
        let replace = match ret.get(&key) {
            Some(best) => cmp(&item, best) == Ordering::Greater,
            None => true,
        };
        if replace {
            ret.insert(key, item);
        }
    }
    ret
}

pub fn max_per_group<T, K, G, C>(items: impl IntoIterator<Item = T>, group: G, cmp: C) -> BTreeMap<K, T>
where
    K: Ord,
    G: Fn(&T) -> K,
    C: Fn(&T, &T) -> Ordering,
{
    pick_per_group(items, group, cmp)
}

pub fn min_per_group<T, K, G, C>(items: impl IntoIterator<Item = T>, group: G, cmp: C) -> BTreeMap<K, T>
where
    K: Ord,
    G: Fn(&T) -> K,
    C: Fn(&T, &T) -> Ordering,
{
    pick_per_group(items, group, |a, b| cmp(b, a))
}
