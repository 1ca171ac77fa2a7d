//! Arena-backed tuple tree.
//!
//! Nodes are stored in model definition order and refer to each other by
//! [`NodeId`]. The tree is immutable once built; per-run `curr`/`top` state
//! lives beside it in the translator.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{MigrateError, Result};

use super::Tuple;

/// Index of a node in its [`TupleTree`].
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub tuple: Tuple,
    pub parent: Option<NodeId>,
    /// Child nodes in definition order.
    pub children: Vec<NodeId>,
    /// Distance from the root.
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct TupleTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
}

impl TupleTree {
    /// Assemble the tree from the model's tuples.
    ///
    /// Each tuple names its parent by id. Exactly one tuple has no parent,
    /// and every tuple must be reachable from it.
    pub fn build(tuples: Vec<Tuple>) -> Result<Self> {
        let mut index: HashMap<u32, NodeId> = HashMap::with_capacity(tuples.len());
        for (i, tuple) in tuples.iter().enumerate() {
            if index.insert(tuple.id, i).is_some() {
                return Err(MigrateError::model(format!(
                    "Duplicate tuple id {}",
                    tuple.id
                )));
            }
        }

        let mut root = None;
        let mut parents = Vec::with_capacity(tuples.len());
        for tuple in &tuples {
            let parent = match tuple.parent {
                None => {
                    if let Some(existing) = root {
                        let existing: &Tuple = &tuples[existing];
                        return Err(MigrateError::model(format!(
                            "Tuples {} and {} both have no parent; exactly one root tuple is allowed",
                            existing.id, tuple.id
                        )));
                    }
                    root = index.get(&tuple.id).copied();
                    None
                }
                Some(parent_id) => Some(*index.get(&parent_id).ok_or_else(|| {
                    MigrateError::model(format!(
                        "Tuple {} names unknown parent tuple {}",
                        tuple.id, parent_id
                    ))
                })?),
            };
            parents.push(parent);
        }
        let root = root.ok_or_else(|| MigrateError::model("The matching model has no root tuple"))?;

        let mut nodes: Vec<TreeNode> = tuples
            .into_iter()
            .zip(&parents)
            .map(|(tuple, parent)| TreeNode {
                tuple,
                parent: *parent,
                children: Vec::new(),
                depth: 0,
            })
            .collect();
        for (id, parent) in parents.iter().enumerate() {
            if let Some(parent) = parent {
                nodes[*parent].children.push(id);
            }
        }

        // Assign depths from the root; anything left unvisited sits on a cycle.
        let mut visited = vec![false; nodes.len()];
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            visited[id] = true;
            nodes[id].depth = depth;
            stack.extend(nodes[id].children.iter().map(|c| (*c, depth + 1)));
        }
        if let Some(orphan) = visited.iter().position(|v| !v) {
            return Err(MigrateError::model(format!(
                "Tuple {} is not reachable from root tuple {} (parent cycle)",
                nodes[orphan].tuple.id, nodes[root].tuple.id
            )));
        }

        Ok(Self { nodes, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn tuple(&self, id: NodeId) -> &Tuple {
        &self.nodes[id].tuple
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// The node `levels` steps up from `id`; `ancestor(id, 0)` is `id`.
    pub fn ancestor(&self, id: NodeId, levels: usize) -> Option<NodeId> {
        let mut current = id;
        for _ in 0..levels {
            current = self.nodes[current].parent?;
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in pre-order (parent before children, siblings in definition order).
    pub fn pre_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Indented outline of the tree, one tuple per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for id in self.pre_order() {
            let node = &self.nodes[id];
            let _ = writeln!(
                out,
                "{}[{}] {} -> {} ({} matches)",
                "  ".repeat(node.depth),
                node.tuple.id,
                if node.tuple.desc.is_empty() {
                    &node.tuple.terminology
                } else {
                    &node.tuple.desc
                },
                node.tuple.table,
                node.tuple.matches.len()
            );
        }
        out
    }
}
