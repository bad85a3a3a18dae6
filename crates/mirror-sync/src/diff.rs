//! Structural change detection shared by every sync task.
//!
//! All per-iteration "did anything change" decisions go through these two
//! checks (or plain scalar/slot-wise equality), so Backoff and the render
//! signal see change uniformly across tasks.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Unordered key-value mirror equality: same key set, same value per key.
/// Short-circuits on size mismatch before comparing elements.
pub fn maps_equal<K, V>(a: &HashMap<K, V>, b: &HashMap<K, V>) -> bool
where
    K: Eq + Hash,
    V: PartialEq,
{
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(k, v)| b.get(k) == Some(v))
}

/// Identity-set equality: same membership, order irrelevant. Short-circuits
/// on size mismatch.
pub fn sets_equal<T>(a: &HashSet<T>, b: &HashSet<T>) -> bool
where
    T: Eq + Hash,
{
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|t| b.contains(t))
}
