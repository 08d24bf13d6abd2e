//! XML-to-tree normalization.
//!
//! Each element child of a node becomes one entry of the node's mapping:
//! childless elements contribute their text under their raw tag, elements
//! with children recurse into a nested mapping under a disambiguated key.

use crate::Result;
use roxmltree::Node;
use std::collections::BTreeSet;
use wafermap_core::{Error as CoreError, NormalizedTree, TreeNode};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `Type` of the class instances describing a periodic-table element.
pub const ELEMENT_TYPE: &str = "TRTPSEElement";

const DEFAULT_IGNORED: [&str; 6] = [
    "DetLayers",
    "ShiftData",
    "PPRTData",
    "ResponseFunction",
    "Channels",
    "WindowLayers",
];

/// Normalization settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalizeConfig {
    /// Tags skipped entirely, together with their subtrees.
    pub ignore: BTreeSet<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            ignore: DEFAULT_IGNORED.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl NormalizeConfig {
    /// Creates the default configuration for Bruker spectrum exports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag to the ignore set.
    pub fn with_ignored(mut self, tag: impl Into<String>) -> Self {
        self.ignore.insert(tag.into());
        self
    }

    /// Creates a configuration that keeps every tag.
    pub fn keep_all() -> Self {
        Self {
            ignore: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn ignores(&self, tag: &str) -> bool {
        self.ignore.contains(tag)
    }
}

/// Normalizes the element children of `node` into a fresh tree.
///
/// # Errors
/// Returns an error if a `Result`/`ExtResults` node has no `Atom`
/// descendant or an element class instance has no `Name`.
pub fn normalize(node: Node<'_, '_>, config: &NormalizeConfig) -> Result<NormalizedTree> {
    let mut tree = NormalizedTree::new();
    for child in node.children().filter(Node::is_element) {
        let tag = child.tag_name().name();
        if config.ignores(tag) {
            continue;
        }
        if child.children().any(|c| c.is_element()) {
            let key = node_key(child)?;
            tree.insert(key, TreeNode::Branch(normalize(child, config)?));
        } else {
            tree.insert(tag, TreeNode::Leaf(child.text().map(str::to_string)));
        }
    }
    Ok(tree)
}

/// Disambiguated key of an element with children.
///
/// - `<ClassInstance Type="TRTPSEElement" Name="Fe">` → `TRTPSEElement Fe`
/// - `<Result>` / `<ExtResults>` → `Result <Atom>` using the `Atom` descendant
/// - `<ClassInstance Type="T">` → `T`
/// - anything else → its tag
///
/// # Errors
/// See [`normalize`].
pub fn node_key(node: Node<'_, '_>) -> Result<String> {
    let tag = node.tag_name().name();
    match tag {
        "ClassInstance" => match node.attribute("Type") {
            Some(ty) if ty == ELEMENT_TYPE => {
                let name = node
                    .attribute("Name")
                    .ok_or_else(|| CoreError::missing(ELEMENT_TYPE, "Name"))?;
                Ok(format!("{ty} {name}"))
            }
            Some(ty) => Ok(ty.to_string()),
            None => Ok(tag.to_string()),
        },
        "Result" | "ExtResults" => {
            let atom = node
                .descendants()
                .filter(|d| d.has_tag_name("Atom"))
                .filter_map(|d| d.text())
                .last()
                .ok_or_else(|| CoreError::missing(tag, "Atom"))?;
            Ok(format!("{tag} {}", atom.trim()))
        }
        _ => Ok(tag.to_string()),
    }
}
