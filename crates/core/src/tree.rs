//! Tree projection of a flat entry sequence for presentation.
//!
//! [`DiffTree::project`] groups changed entries by dataset type under a root
//! node. Nodes are stored in an arena and refer to each other by
//! [`NodeId`]; leaves refer back to their entry by index into the slice they
//! were projected from and never own diff state. The tree is a snapshot:
//! after resolving entries, project again.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{Classification, DiffEntry};

/// Index of a node inside a [`DiffTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(usize);

/// What a node stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NodeContent {
    Root,
    /// Grouping node for one dataset type.
    Group(String),
    /// Leaf for the entry at this index of the projected slice.
    Entry(usize),
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffNode {
    pub content: NodeContent,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Icon overlay describing what will happen to a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlay {
    AddToLocal,
    AddToRemote,
    ModifyInLocal,
    ModifyInRemote,
    DeleteFromLocal,
    DeleteFromRemote,
    Conflict,
    Merged,
}

impl std::fmt::Display for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddToLocal => write!(f, "add to local"),
            Self::AddToRemote => write!(f, "add to remote"),
            Self::ModifyInLocal => write!(f, "modify in local"),
            Self::ModifyInRemote => write!(f, "modify in remote"),
            Self::DeleteFromLocal => write!(f, "delete from local"),
            Self::DeleteFromRemote => write!(f, "delete from remote"),
            Self::Conflict => write!(f, "conflict"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// Display text and overlay for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeLabel {
    pub text: String,
    pub overlay: Option<Overlay>,
}

/// Two-level tree: root -> type groups -> entries.
#[derive(Debug, Clone, Serialize)]
pub struct DiffTree {
    nodes: Vec<DiffNode>,
    #[serde(skip)]
    by_dataset: HashMap<String, NodeId>,
}

impl DiffTree {
    /// Group the changed entries of `entries` by dataset type.
    ///
    /// Groups follow `type_order`; types not listed there come afterwards in
    /// order of first appearance. Within a group, entries keep their order in
    /// `entries`. `Unchanged` entries are left out.
    pub fn project(entries: &[DiffEntry], type_order: &[String]) -> Self {
        let mut tree = Self {
            nodes: vec![DiffNode {
                content: NodeContent::Root,
                parent: None,
                children: Vec::new(),
            }],
            by_dataset: HashMap::new(),
        };

        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            if entry.classification() == Classification::Unchanged {
                continue;
            }
            match groups.iter_mut().find(|(t, _)| *t == entry.dataset_type()) {
                Some((_, members)) => members.push(index),
                None => groups.push((entry.dataset_type(), vec![index])),
            }
        }

        // Stable sort keeps first-appearance order among unlisted types.
        groups.sort_by_key(|(t, _)| {
            type_order
                .iter()
                .position(|o| o == t)
                .unwrap_or(type_order.len())
        });

        for (dataset_type, members) in groups {
            let group = tree.push(NodeContent::Group(dataset_type.to_string()), tree.root());
            for index in members {
                let leaf = tree.push(NodeContent::Entry(index), group);
                tree.by_dataset
                    .insert(entries[index].dataset_id().to_string(), leaf);
            }
        }

        tree
    }

    fn push(&mut self, content: NodeContent, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(DiffNode {
            content,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> Option<&DiffNode> {
        self.nodes.get(id.0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.children(id).is_empty()
    }

    /// Leaf node for a dataset, if it is part of the projection.
    pub fn find_entry(&self, dataset_id: &str) -> Option<NodeId> {
        self.by_dataset.get(dataset_id).copied()
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Resolve a leaf back to its entry in the slice the tree was projected
    /// from.
    pub fn entry<'a>(&self, id: NodeId, entries: &'a [DiffEntry]) -> Option<&'a DiffEntry> {
        match self.node(id)?.content {
            NodeContent::Entry(index) => entries.get(index),
            _ => None,
        }
    }

    /// Display text and overlay for a node.
    pub fn label(&self, id: NodeId, entries: &[DiffEntry]) -> Option<NodeLabel> {
        let label = match &self.node(id)?.content {
            NodeContent::Root => NodeLabel {
                text: String::new(),
                overlay: None,
            },
            NodeContent::Group(dataset_type) => NodeLabel {
                text: type_label(dataset_type),
                overlay: None,
            },
            NodeContent::Entry(index) => {
                let entry = entries.get(*index)?;
                NodeLabel {
                    text: entry.display_name().to_string(),
                    overlay: overlay(entry),
                }
            }
        };
        Some(label)
    }
}

/// A change on one side is shown as what it will do to the other side.
pub fn overlay(entry: &DiffEntry) -> Option<Overlay> {
    match entry.classification() {
        Classification::AddedRemote => Some(Overlay::AddToLocal),
        Classification::AddedLocal => Some(Overlay::AddToRemote),
        Classification::ModifiedRemote => Some(Overlay::ModifyInLocal),
        Classification::ModifiedLocal => Some(Overlay::ModifyInRemote),
        Classification::DeletedRemote => Some(Overlay::DeleteFromLocal),
        Classification::DeletedLocal => Some(Overlay::DeleteFromRemote),
        Classification::Conflict if entry.is_resolved() => Some(Overlay::Merged),
        Classification::Conflict => Some(Overlay::Conflict),
        Classification::Unchanged => None,
    }
}

/// `product_system` -> `Product systems`, `category` -> `Categories`
fn type_label(dataset_type: &str) -> String {
    let words = dataset_type.replace('_', " ");
    let mut chars = words.chars();
    let mut label = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => return String::new(),
    };
    if label.ends_with('s') {
        label.push_str("es");
    } else if label.ends_with('y') {
        label.pop();
        label.push_str("ies");
    } else {
        label.push('s');
    }
    label
}
