//! Normalized instrument trees.
//!
//! A [`NormalizedTree`] is an ordered mapping from disambiguated tag names
//! to either leaf text or a nested tree. Insertion order is preserved and a
//! repeated key replaces the earlier entry in place.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Entry of a normalized tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TreeNode {
    /// Element text; `None` for an element without text.
    Leaf(Option<String>),
    /// Nested mapping.
    Branch(NormalizedTree),
}

impl TreeNode {
    #[must_use]
    pub fn as_branch(&self) -> Option<&NormalizedTree> {
        match self {
            Self::Branch(tree) => Some(tree),
            Self::Leaf(_) => None,
        }
    }
}

/// Ordered, possibly nested mapping of string keys.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalizedTree {
    entries: Vec<(String, TreeNode)>,
}

impl NormalizedTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry; an existing key is replaced in place (last wins).
    pub fn insert(&mut self, key: impl Into<String>, node: TreeNode) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = node;
        } else {
            self.entries.push((key, node));
        }
    }

    /// Number of direct entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TreeNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Text of a direct leaf entry.
    #[must_use]
    pub fn leaf(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(TreeNode::Leaf(text)) => text.as_deref(),
            _ => None,
        }
    }

    /// Iterates over direct entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TreeNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over direct leaf entries that carry text.
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(k, v)| match v {
            TreeNode::Leaf(Some(text)) => Some((k.as_str(), text.as_str())),
            _ => None,
        })
    }

    /// Whether any direct entry is a leaf, with or without text.
    #[must_use]
    pub fn has_leaf_fields(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, node)| matches!(node, TreeNode::Leaf(_)))
    }

    /// All nested mappings in depth-first pre-order, with their keys.
    #[must_use]
    pub fn branches(&self) -> Vec<(&str, &NormalizedTree)> {
        let mut out = Vec::new();
        self.collect_branches(&mut out);
        out
    }

    fn collect_branches<'a>(&'a self, out: &mut Vec<(&'a str, &'a NormalizedTree)>) {
        for (key, node) in &self.entries {
            if let TreeNode::Branch(tree) = node {
                out.push((key.as_str(), tree));
                tree.collect_branches(out);
            }
        }
    }

    /// First nested mapping named `key`, searching depth-first.
    #[must_use]
    pub fn find_branch(&self, key: &str) -> Option<&NormalizedTree> {
        self.branches()
            .into_iter()
            .find_map(|(k, tree)| (k == key).then_some(tree))
    }
}
