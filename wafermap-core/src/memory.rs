//! In-memory hierarchical store.

use crate::store::{components, split_parent, DataValue, HierarchicalStore};
use crate::{Error, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct GroupNode {
    members: BTreeMap<String, Node>,
    attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct DatasetNode {
    value: DataValue,
    attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
enum Node {
    Group(GroupNode),
    Dataset(DatasetNode),
}

impl Node {
    fn attrs(&self) -> &BTreeMap<String, String> {
        match self {
            Node::Group(g) => &g.attrs,
            Node::Dataset(d) => &d.attrs,
        }
    }

    fn attrs_mut(&mut self) -> &mut BTreeMap<String, String> {
        match self {
            Node::Group(g) => &mut g.attrs,
            Node::Dataset(d) => &mut d.attrs,
        }
    }
}

/// Ordered in-memory store, mirroring the layout an HDF5 file would have.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    root: Node,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            root: Node::Group(GroupNode::default()),
        }
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, path: &str) -> Option<&Node> {
        components(path).try_fold(&self.root, |node, name| match node {
            Node::Group(g) => g.members.get(name),
            Node::Dataset(_) => None,
        })
    }

    fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
        components(path).try_fold(&mut self.root, |node, name| match node {
            Node::Group(g) => g.members.get_mut(name),
            Node::Dataset(_) => None,
        })
    }

    fn group_mut(&mut self, path: &str) -> Result<&mut GroupNode> {
        match self.node_mut(path) {
            Some(Node::Group(g)) => Ok(g),
            _ => Err(Error::Lookup(format!("group {path}"))),
        }
    }
}

impl HierarchicalStore for MemoryStore {
    fn contains(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    fn is_group(&self, path: &str) -> bool {
        matches!(self.node(path), Some(Node::Group(_)))
    }

    fn create_group(&mut self, path: &str) -> Result<()> {
        let mut node = &mut self.root;
        for name in components(path) {
            let Node::Group(group) = node else {
                return Err(Error::InvalidFormat(format!(
                    "cannot create group {path}: a dataset is in the way"
                )));
            };
            node = group
                .members
                .entry(name.to_string())
                .or_insert_with(|| Node::Group(GroupNode::default()));
        }
        match node {
            Node::Group(_) => Ok(()),
            Node::Dataset(_) => Err(Error::InvalidFormat(format!(
                "cannot create group {path}: a dataset exists there"
            ))),
        }
    }

    fn members(&self, path: &str) -> Result<Vec<String>> {
        match self.node(path) {
            Some(Node::Group(g)) => Ok(g.members.keys().cloned().collect()),
            _ => Err(Error::Lookup(format!("group {path}"))),
        }
    }

    fn write(&mut self, path: &str, value: DataValue) -> Result<()> {
        let (parent, name) = split_parent(path);
        let group = self.group_mut(parent)?;
        if let Some(Node::Group(_)) = group.members.get(name) {
            return Err(Error::InvalidFormat(format!(
                "cannot write dataset {path}: a group exists there"
            )));
        }
        group.members.insert(
            name.to_string(),
            Node::Dataset(DatasetNode {
                value,
                attrs: BTreeMap::new(),
            }),
        );
        Ok(())
    }

    fn read(&self, path: &str) -> Result<DataValue> {
        match self.node(path) {
            Some(Node::Dataset(d)) => Ok(d.value.clone()),
            _ => Err(Error::Lookup(format!("dataset {path}"))),
        }
    }

    fn set_attr(&mut self, path: &str, name: &str, value: &str) -> Result<()> {
        let node = self
            .node_mut(path)
            .ok_or_else(|| Error::Lookup(path.to_string()))?;
        node.attrs_mut().insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn attr(&self, path: &str, name: &str) -> Result<Option<String>> {
        let node = self
            .node(path)
            .ok_or_else(|| Error::Lookup(path.to_string()))?;
        Ok(node.attrs().get(name).cloned())
    }

    fn move_node(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.contains(from) {
            return Err(Error::Lookup(from.to_string()));
        }
        if self.contains(to) {
            return Err(Error::InvalidFormat(format!(
                "cannot move {from} to {to}: destination exists"
            )));
        }
        let (to_parent, to_name) = split_parent(to);
        if !self.is_group(to_parent) {
            return Err(Error::Lookup(format!("group {to_parent}")));
        }
        if to.starts_with(&format!("{}/", from.trim_end_matches('/'))) {
            return Err(Error::InvalidFormat(format!(
                "cannot move {from} into itself"
            )));
        }

        let (from_parent, from_name) = split_parent(from);
        let node = self
            .group_mut(from_parent)?
            .members
            .remove(from_name)
            .ok_or_else(|| Error::Lookup(from.to_string()))?;
        self.group_mut(to_parent)?
            .members
            .insert(to_name.to_string(), node);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_parent(path);
        self.group_mut(parent)?
            .members
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::Lookup(path.to_string()))
    }
}
