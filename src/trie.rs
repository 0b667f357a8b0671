//! Candidate index over cluster templates.
//!
//! Templates are bucketed by length and then walked along their first
//! `anchor_depth` positions. A wildcard position gets its own key, so a lookup
//! follows both the literal child and the wildcard child at every step. Leaves
//! hold cluster ids only; the registry owns the clusters.

use crate::registry::ClusterId;
use crate::template::{Template, Token};
use std::collections::BTreeMap;

/// Default number of leading positions used as trie anchors.
pub const DEFAULT_ANCHOR_DEPTH: usize = 1;

/// Upper bound on anchor depth; keeps traversal and snapshot records bounded.
pub const MAX_ANCHOR_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrieKey {
    Literal(String),
    Wildcard,
}

impl From<&Token> for TrieKey {
    fn from(token: &Token) -> Self {
        match token {
            Token::Literal(s) => TrieKey::Literal(s.clone()),
            Token::Wildcard => TrieKey::Wildcard,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TrieNode {
    children: BTreeMap<TrieKey, TrieNode>,
    clusters: Vec<ClusterId>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.clusters.is_empty()
    }
}

/// One non-empty leaf bucket, flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriePath {
    pub length: usize,
    pub keys: Vec<TrieKey>,
    pub clusters: Vec<ClusterId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieIndex {
    anchor_depth: usize,
    buckets: BTreeMap<usize, TrieNode>,
}

impl Default for TrieIndex {
    fn default() -> Self {
        Self::new(DEFAULT_ANCHOR_DEPTH)
    }
}

impl TrieIndex {
    pub fn new(anchor_depth: usize) -> Self {
        Self {
            anchor_depth: anchor_depth.min(MAX_ANCHOR_DEPTH),
            buckets: BTreeMap::new(),
        }
    }

    /// Rebuilds the index from templates in cluster-id order.
    pub fn from_templates<'a, I>(anchor_depth: usize, templates: I) -> Self
    where
        I: IntoIterator<Item = (ClusterId, &'a Template)>,
    {
        let mut trie = Self::new(anchor_depth);
        for (id, template) in templates {
            trie.insert(id, template);
        }
        trie
    }

    pub fn anchor_depth(&self) -> usize {
        self.anchor_depth
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn anchor_keys(&self, template: &Template) -> Vec<TrieKey> {
        template.tokens().iter().take(self.anchor_depth).map(TrieKey::from).collect()
    }

    pub fn insert(&mut self, id: ClusterId, template: &Template) {
        let keys = self.anchor_keys(template);
        let mut node = self.buckets.entry(template.len()).or_default();
        for key in keys {
            node = node.children.entry(key).or_default();
        }
        // Buckets stay sorted so the trie is canonical for a given set of templates.
        if let Err(pos) = node.clusters.binary_search(&id) {
            node.clusters.insert(pos, id);
        }
    }

    /// Removes `id` from the bucket for `template` and prunes emptied nodes.
    /// Returns false when the id was not indexed under that template.
    pub fn remove(&mut self, id: ClusterId, template: &Template) -> bool {
        let keys = self.anchor_keys(template);
        let len = template.len();

        let Some(root) = self.buckets.get_mut(&len) else { return false };
        let mut node = root;
        for key in &keys {
            match node.children.get_mut(key) {
                Some(child) => node = child,
                None => return false,
            }
        }
        let Some(pos) = node.clusters.iter().position(|c| *c == id) else { return false };
        node.clusters.remove(pos);

        // Prune bottom-up; each pass re-walks from the bucket root, depth is bounded.
        for depth in (0..keys.len()).rev() {
            let Some(mut parent) = self.buckets.get_mut(&len) else { break };
            for key in &keys[..depth] {
                match parent.children.get_mut(key) {
                    Some(child) => parent = child,
                    None => return true,
                }
            }
            let child_empty = parent.children.get(&keys[depth]).is_some_and(TrieNode::is_empty);
            if !child_empty {
                break;
            }
            parent.children.remove(&keys[depth]);
        }
        if self.buckets.get(&len).is_some_and(TrieNode::is_empty) {
            self.buckets.remove(&len);
        }
        true
    }

    /// Moves `id` from the path of `old` to the path of `new`.
    pub fn relocate(&mut self, id: ClusterId, old: &Template, new: &Template) {
        self.remove(id, old);
        self.insert(id, new);
    }

    /// Cluster ids whose anchors are compatible with `seq`, ascending.
    pub fn lookup(&self, seq: &[String]) -> Vec<ClusterId> {
        let Some(root) = self.buckets.get(&seq.len()) else { return Vec::new() };
        let depth = seq.len().min(self.anchor_depth);

        let mut found = Vec::new();
        let mut stack: Vec<(&TrieNode, usize)> = vec![(root, 0)];
        while let Some((node, level)) = stack.pop() {
            if level == depth {
                found.extend_from_slice(&node.clusters);
                continue;
            }
            if let Some(child) = node.children.get(&TrieKey::Literal(seq[level].clone())) {
                stack.push((child, level + 1));
            }
            if let Some(child) = node.children.get(&TrieKey::Wildcard) {
                stack.push((child, level + 1));
            }
        }
        found.sort_unstable();
        found
    }

    /// Every non-empty bucket with its full key path, in key order.
    pub fn paths(&self) -> Vec<TriePath> {
        let mut out = Vec::new();
        for (length, root) in &self.buckets {
            let mut stack: Vec<(&TrieNode, Vec<TrieKey>)> = vec![(root, Vec::new())];
            while let Some((node, keys)) = stack.pop() {
                if !node.clusters.is_empty() {
                    out.push(TriePath {
                        length: *length,
                        keys: keys.clone(),
                        clusters: node.clusters.clone(),
                    });
                }
                // Reverse push so children pop in ascending key order.
                for (key, child) in node.children.iter().rev() {
                    let mut next = keys.clone();
                    next.push(key.clone());
                    stack.push((child, next));
                }
            }
        }
        out
    }

    /// Rebuilds an index from flattened paths. Used when restoring a snapshot.
    pub fn from_paths(anchor_depth: usize, paths: &[TriePath]) -> Self {
        let mut trie = Self::new(anchor_depth);
        for path in paths {
            let mut node = trie.buckets.entry(path.length).or_default();
            for key in &path.keys {
                node = node.children.entry(key.clone()).or_default();
            }
            for id in &path.clusters {
                if let Err(pos) = node.clusters.binary_search(id) {
                    node.clusters.insert(pos, *id);
                }
            }
        }
        trie
    }

    /// Number of indexed cluster entries across all buckets.
    pub fn entry_count(&self) -> usize {
        self.paths().iter().map(|p| p.clusters.len()).sum()
    }
}
