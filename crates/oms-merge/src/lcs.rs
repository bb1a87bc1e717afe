//! LCS-based ordered-list merge (§4.6 "Ordered-list merge (LCS)").
//!
//! Keys kept in the longest common subsequence of `source`/`target`
//! act as stable anchors; everything else is interleaved around them,
//! preferring `source`'s placement when both sides moved the same key
//! away from its `base` position to different new neighbors (§4.6:
//! "both sides REORDER same item to different positions... rule:
//! source wins").

use std::collections::HashSet;

/// Longest common subsequence of two key sequences, standard DP.
pub fn lcs(a: &[String], b: &[String]) -> Vec<String> {
    let n = a.len();
    let m = b.len();
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if a[i] == b[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }
    let mut i = 0;
    let mut j = 0;
    let mut out = Vec::new();
    while i < n && j < m {
        if a[i] == b[j] {
            out.push(a[i].clone());
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

fn predecessor(list: &[String], key: &str) -> Option<String> {
    let pos = list.iter().position(|k| k == key)?;
    if pos == 0 {
        None
    } else {
        Some(list[pos - 1].clone())
    }
}

/// Merge three key orderings into one final order plus the set of
/// keys whose reorder is a genuine conflict (both sides moved it to
/// different neighbors). Keys present in `source`/`target` but absent
/// from `base` (pure adds) or vice versa (pure deletes) are handled by
/// the content-level diff before this runs; this function only
/// resolves *position* among whatever keys both lists agree exist.
pub fn merge_key_order(base: &[String], source: &[String], target: &[String]) -> (Vec<String>, Vec<String>) {
    let anchors = lcs(source, target);
    let anchor_set: HashSet<&String> = anchors.iter().collect();

    let mut placed: HashSet<String> = HashSet::new();
    let mut result = Vec::new();

    let mut src_idx = 0usize;
    let mut tgt_idx = 0usize;

    let mut push = |result: &mut Vec<String>, placed: &mut HashSet<String>, key: &String| {
        if placed.insert(key.clone()) {
            result.push(key.clone());
        }
    };

    for anchor in &anchors {
        while src_idx < source.len() && &source[src_idx] != anchor {
            push(&mut result, &mut placed, &source[src_idx]);
            src_idx += 1;
        }
        src_idx += 1;
        while tgt_idx < target.len() && &target[tgt_idx] != anchor {
            push(&mut result, &mut placed, &target[tgt_idx]);
            tgt_idx += 1;
        }
        tgt_idx += 1;
        push(&mut result, &mut placed, anchor);
    }
    while src_idx < source.len() {
        push(&mut result, &mut placed, &source[src_idx]);
        src_idx += 1;
    }
    while tgt_idx < target.len() {
        push(&mut result, &mut placed, &target[tgt_idx]);
        tgt_idx += 1;
    }
    for key in base {
        if !placed.contains(key) && (source.contains(key) || target.contains(key)) {
            push(&mut result, &mut placed, key);
        }
    }

    let mut reorder_conflicts = Vec::new();
    for key in base {
        if anchor_set.contains(key) {
            continue;
        }
        if !(source.contains(key) && target.contains(key)) {
            continue;
        }
        let base_pred = predecessor(base, key);
        let source_pred = predecessor(source, key);
        let target_pred = predecessor(target, key);
        if source_pred != base_pred && target_pred != base_pred && source_pred != target_pred {
            reorder_conflicts.push(key.clone());
        }
    }

    (result, reorder_conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lcs_finds_common_subsequence() {
        let a = v(&["a", "b", "c", "d"]);
        let b = v(&["b", "d", "a", "c"]);
        let result = lcs(&a, &b);
        // "b", "c" is one valid LCS of length 2 here; "a","c" also
        // length 2. Either is acceptable; only length matters for the
        // anchor-stability property.
        assert!(result.len() >= 2);
    }

    #[test]
    fn non_overlapping_reorders_preserve_all_items() {
        // §8 item 8: merging only non-overlapping reorders preserves
        // every item and matches the union of position intents.
        let base = v(&["a", "b", "c", "d"]);
        let source = v(&["b", "a", "c", "d"]); // swaps a/b
        let target = v(&["a", "b", "d", "c"]); // swaps c/d
        let (order, conflicts) = merge_key_order(&base, &source, &target);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, v(&["a", "b", "c", "d"]));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn both_sides_reordering_the_same_item_differently_is_a_conflict() {
        let base = v(&["a", "b", "c"]);
        let source = v(&["b", "c", "a"]);
        let target = v(&["c", "a", "b"]);
        let (_, conflicts) = merge_key_order(&base, &source, &target);
        assert!(!conflicts.is_empty());
    }

    #[test]
    fn identical_order_has_no_conflicts() {
        let base = v(&["a", "b", "c"]);
        let (order, conflicts) = merge_key_order(&base, &base, &base);
        assert_eq!(order, base);
        assert!(conflicts.is_empty());
    }
}
