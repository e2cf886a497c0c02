//! Ordered prefix trie over token sequences.
//!
//! Stores per-node counts; derives branching entropy, entropy variation and
//! the autonomy z-score lazily, in a single depth-first pass triggered by
//! the first read after a mutation (the "dirty" policy).
//! Child maps use a small-map optimization: a node with few children keeps
//! them inline, promoting to an `FxHashMap` past [`INLINE_CHILD_CAP`].

use std::cell::{Cell, RefCell};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{EleveError, EleveResult};
use crate::stats::{shannon_entropy, OnlineMoments};
use crate::token::Token;

const INLINE_CHILD_CAP: usize = 8;

#[derive(Debug)]
enum ChildMap {
    Inline(SmallVec<[(Token, Box<TrieNode>); INLINE_CHILD_CAP]>),
    Map(FxHashMap<Token, Box<TrieNode>>),
}

impl Default for ChildMap {
    fn default() -> Self {
        ChildMap::Inline(SmallVec::new())
    }
}

impl ChildMap {
    fn len(&self) -> usize {
        match self {
            ChildMap::Inline(v) => v.len(),
            ChildMap::Map(m) => m.len(),
        }
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, tok: &Token) -> Option<&TrieNode> {
        match self {
            ChildMap::Inline(v) => v.iter().find(|(k, _)| k == tok).map(|(_, n)| n.as_ref()),
            ChildMap::Map(m) => m.get(tok).map(|n| n.as_ref()),
        }
    }

    /// Returns the child for `tok`, creating an empty one if absent. Promotes
    /// from the inline layout to a hash map once the inline capacity is
    /// exceeded, preserving every existing entry (no data is lost).
    fn get_or_insert(&mut self, tok: Token) -> &mut TrieNode {
        if let ChildMap::Inline(v) = self {
            if let Some(pos) = v.iter().position(|(k, _)| *k == tok) {
                return v[pos].1.as_mut();
            }
            if v.len() < INLINE_CHILD_CAP {
                v.push((tok, Box::new(TrieNode::default())));
                let idx = v.len() - 1;
                return v[idx].1.as_mut();
            }
            let mut map = FxHashMap::with_capacity_and_hasher(v.len() + 1, Default::default());
            for (k, node) in v.drain(..) {
                map.insert(k, node);
            }
            *self = ChildMap::Map(map);
        }
        match self {
            ChildMap::Map(m) => m.entry(tok).or_insert_with(|| Box::new(TrieNode::default())).as_mut(),
            ChildMap::Inline(_) => unreachable!("just promoted to Map"),
        }
    }

    fn iter(&self) -> ChildIter<'_> {
        match self {
            ChildMap::Inline(v) => ChildIter::Inline(v.iter()),
            ChildMap::Map(m) => ChildIter::Map(m.iter()),
        }
    }
}

enum ChildIter<'a> {
    Inline(std::slice::Iter<'a, (Token, Box<TrieNode>)>),
    Map(std::collections::hash_map::Iter<'a, Token, Box<TrieNode>>),
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = (&'a Token, &'a TrieNode);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ChildIter::Inline(it) => it.next().map(|(k, v)| (k, v.as_ref())),
            ChildIter::Map(it) => it.next().map(|(k, v)| (k, v.as_ref())),
        }
    }
}

#[derive(Debug)]
struct TrieNode {
    count: u64,
    /// NaN until the first `update_stats` pass touches this node.
    entropy: Cell<f64>,
    children: ChildMap,
}

impl Default for TrieNode {
    fn default() -> Self {
        TrieNode {
            count: 0,
            entropy: Cell::new(f64::NAN),
            children: ChildMap::default(),
        }
    }
}

impl TrieNode {
    /// Branching entropy of this node under the terminals rule: each
    /// sentinel child of count `k` is treated as `k` distinct children of
    /// count 1.
    fn compute_entropy(&self, is_root: bool) -> f64 {
        if self.children.is_empty() {
            return if is_root && self.count == 0 {
                f64::NAN // a wholly untrained trie
            } else if is_root {
                0.0 // non-empty root with no branching (unreachable via add_ngram, defined for completeness)
            } else {
                f64::NAN // ordinary leaf: entropy is undefined
            };
        }
        let mut counts: Vec<u64> = Vec::with_capacity(self.children.len());
        for (tok, child) in self.children.iter() {
            if tok.is_sentinel() {
                counts.extend(std::iter::repeat(1u64).take(child.count as usize));
            } else {
                counts.push(child.count);
            }
        }
        shannon_entropy(counts)
    }
}

/// Prefix trie over token n-grams, with lazily-refreshed branching entropy
/// and per-depth entropy-variation normalization.
#[derive(Debug)]
pub struct Trie {
    root: TrieNode,
    config_depth: usize,
    observed_max_depth: usize,
    normalization: RefCell<Vec<(f64, f64)>>,
    dirty: Cell<bool>,
}

impl Trie {
    /// `config_depth` bounds the per-depth normalization vector; it is
    /// normally `Storage`'s `default_ngram_length`.
    pub fn new(config_depth: usize) -> Self {
        Trie {
            root: TrieNode::default(),
            config_depth,
            observed_max_depth: 0,
            normalization: RefCell::new(vec![(0.0, 0.0); config_depth]),
            dirty: Cell::new(false),
        }
    }

    pub fn config_depth(&self) -> usize {
        self.config_depth
    }

    pub fn clear(&mut self) {
        self.root = TrieNode::default();
        self.observed_max_depth = 0;
        *self.normalization.borrow_mut() = vec![(0.0, 0.0); self.config_depth];
        self.dirty.set(false);
    }

    pub fn add_ngram(&mut self, ngram: &[Token], freq: i64) -> EleveResult<()> {
        if freq <= 0 {
            return Err(EleveError::InvalidArgument(format!(
                "freq must be a positive integer, got {freq}"
            )));
        }
        if ngram.is_empty() {
            log::warn!("add_ngram called with an empty ngram; ignoring");
            return Ok(());
        }
        let freq = freq as u64;
        self.root.count += freq;
        let mut node = &mut self.root;
        for tok in ngram {
            node = node.children.get_or_insert(tok.clone());
            node.count += freq;
        }
        self.observed_max_depth = self.observed_max_depth.max(ngram.len());
        self.dirty.set(true);
        Ok(())
    }

    /// Maximum n-gram length ever passed to `add_ngram`.
    pub fn max_depth(&self) -> usize {
        self.ensure_stats();
        self.observed_max_depth
    }

    pub fn query_count(&self, ngram: &[Token]) -> u64 {
        self.ensure_stats();
        self.find_node(ngram).map(|n| n.count).unwrap_or(0)
    }

    pub fn query_entropy(&self, ngram: &[Token]) -> f64 {
        self.ensure_stats();
        self.find_node(ngram).map(|n| n.entropy.get()).unwrap_or(f64::NAN)
    }

    pub fn query_ev(&self, ngram: &[Token]) -> f64 {
        self.ensure_stats();
        if ngram.is_empty() {
            return f64::NAN;
        }
        match self.find_node_with_parent(ngram) {
            Some((node, parent)) => {
                let (ne, pe) = (node.entropy.get(), parent.entropy.get());
                if ne.is_finite() && pe.is_finite() && !(ne == 0.0 && pe == 0.0) {
                    ne - pe
                } else {
                    f64::NAN
                }
            }
            None => f64::NAN,
        }
    }

    pub fn query_autonomy(&self, ngram: &[Token], z_score: bool) -> f64 {
        self.ensure_stats();
        if ngram.is_empty() {
            return f64::NAN;
        }
        let depth = ngram.len();
        let (mean, stdev) = {
            let normalization = self.normalization.borrow();
            match normalization.get(depth - 1) {
                Some(&pair) => pair,
                None => return f64::NAN,
            }
        };
        let ev = self.query_ev(ngram);
        if ev.is_nan() {
            return f64::NAN;
        }
        if z_score {
            if stdev == 0.0 {
                f64::NAN
            } else {
                (ev - mean) / stdev
            }
        } else {
            ev - mean
        }
    }

    /// Iterate every ngram stored in the trie, depth-first, with its count.
    /// Used by `Storage::dump_csv`.
    pub fn iter_ngrams(&self) -> Vec<(Vec<Token>, u64)> {
        let mut out = Vec::new();
        Self::collect(&self.root, &mut Vec::new(), &mut out);
        out
    }

    fn collect(node: &TrieNode, prefix: &mut Vec<Token>, out: &mut Vec<(Vec<Token>, u64)>) {
        for (tok, child) in node.children.iter() {
            prefix.push(tok.clone());
            out.push((prefix.clone(), child.count));
            Self::collect(child, prefix, out);
            prefix.pop();
        }
    }

    fn find_node(&self, ngram: &[Token]) -> Option<&TrieNode> {
        let mut node = &self.root;
        for tok in ngram {
            node = node.children.get(tok)?;
        }
        Some(node)
    }

    fn find_node_with_parent(&self, ngram: &[Token]) -> Option<(&TrieNode, &TrieNode)> {
        if ngram.is_empty() {
            return None;
        }
        let parent = self.find_node(&ngram[..ngram.len() - 1])?;
        let node = parent.children.get(&ngram[ngram.len() - 1])?;
        Some((node, parent))
    }

    fn ensure_stats(&self) {
        if !self.dirty.get() {
            return;
        }
        let mut moments: Vec<OnlineMoments> = vec![OnlineMoments::new(); self.config_depth];
        Self::refresh_node(&self.root, 0, &mut moments);
        *self.normalization.borrow_mut() = moments.iter().map(|m| m.mean_stdev()).collect();
        self.dirty.set(false);
    }

    fn refresh_node(node: &TrieNode, depth: usize, moments: &mut [OnlineMoments]) {
        node.entropy.set(node.compute_entropy(depth == 0));
        for (_, child) in node.children.iter() {
            Self::refresh_node(child, depth + 1, moments);
            let (ce, pe) = (child.entropy.get(), node.entropy.get());
            if ce.is_finite() && pe.is_finite() && !(ce == 0.0 && pe == 0.0) {
                if let Some(acc) = moments.get_mut(depth) {
                    acc.push(ce - pe);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::ngram;

    fn insert(trie: &mut Trie, words: &[&str]) {
        trie.add_ngram(&ngram(words), 1).unwrap();
    }

    /// Count, entropy, and z-score autonomy at a branching node after four
    /// sentences share a two-word prefix.
    #[test]
    fn minimal_trie_invariants() {
        let mut t = Trie::new(5);
        insert(&mut t, &["LE", "PETIT", "CHAT"]);
        insert(&mut t, &["LE", "PETIT", "CHIEN"]);
        insert(&mut t, &["LE", "PETIT", "RAT"]);
        insert(&mut t, &["LE", "GROS", "RAT"]);

        assert_eq!(t.query_count(&ngram(&["LE", "PETIT"])), 3);
        let h = t.query_entropy(&ngram(&["LE", "PETIT"]));
        assert!((h - 3f64.log2()).abs() < 1e-9, "got {h}");
        let a = t.query_autonomy(&ngram(&["LE", "PETIT"]), true);
        assert!((a - 1.0).abs() < 1e-6, "got {a}");
        assert_eq!(t.query_count(&[]), 4);
    }

    /// Clearing resets all state and leaves the trie usable again.
    #[test]
    fn clear_resets_completely() {
        let mut t = Trie::new(5);
        insert(&mut t, &["a", "b"]);
        t.clear();
        assert_eq!(t.query_count(&ngram(&["a", "b"])), 0);
        assert!(t.query_entropy(&[]).is_nan());
        insert(&mut t, &["c", "d"]);
        assert_eq!(t.query_count(&ngram(&["c", "d"])), 1);
    }

    /// Inserting a longer ngram through an existing leaf must not disturb
    /// the leaf's own count.
    #[test]
    fn leaf_to_internal_promotion_preserves_count() {
        let mut t = Trie::new(5);
        insert(&mut t, &["LE", "PETIT"]);
        insert(&mut t, &["LE", "PETIT", "CHAT"]);
        assert_eq!(t.query_count(&ngram(&["LE", "PETIT"])), 2);
        assert_eq!(t.query_count(&ngram(&["LE", "PETIT", "CHAT"])), 1);
    }

    #[test]
    fn count_consistency_holds_after_many_inserts() {
        let mut t = Trie::new(5);
        insert(&mut t, &["a", "b", "c"]);
        insert(&mut t, &["a", "b", "d"]);
        insert(&mut t, &["a", "e"]);
        // root count equals the sum of its direct children's counts.
        let root_count = t.query_count(&[]);
        let ab = t.query_count(&ngram(&["a", "b"]));
        let ae = t.query_count(&ngram(&["a", "e"]));
        assert_eq!(ab + ae, root_count);
    }

    #[test]
    fn monotonicity_freq_split_equals_summed_freq() {
        let mut a = Trie::new(5);
        a.add_ngram(&ngram(&["x", "y"]), 2).unwrap();
        a.add_ngram(&ngram(&["x", "y"]), 3).unwrap();

        let mut b = Trie::new(5);
        b.add_ngram(&ngram(&["x", "y"]), 5).unwrap();

        assert_eq!(a.query_count(&ngram(&["x", "y"])), b.query_count(&ngram(&["x", "y"])));
        assert_eq!(a.query_entropy(&ngram(&["x", "y"])), b.query_entropy(&ngram(&["x", "y"])));
    }

    #[test]
    fn idempotent_update_stats() {
        let mut t = Trie::new(5);
        insert(&mut t, &["a", "b"]);
        let first = t.query_autonomy(&ngram(&["a", "b"]), true);
        let second = t.query_autonomy(&ngram(&["a", "b"]), true);
        assert!(first.is_nan() && second.is_nan() || first == second);
    }

    #[test]
    fn zero_or_negative_freq_is_rejected() {
        let mut t = Trie::new(5);
        assert!(t.add_ngram(&ngram(&["a"]), 0).is_err());
        assert!(t.add_ngram(&ngram(&["a"]), -3).is_err());
    }

    #[test]
    fn empty_ngram_add_is_a_silent_noop() {
        let mut t = Trie::new(5);
        assert!(t.add_ngram(&[], 1).is_ok());
        assert_eq!(t.query_count(&[]), 0);
    }
}
