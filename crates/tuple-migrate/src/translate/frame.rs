//! Per-run traversal state kept beside the static tuple tree.

use crate::core::SqlValue;
use crate::model::{NodeId, Tuple, TupleTree};

/// Runtime slots of one tree node.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Source value driving the row being translated.
    pub curr: Option<SqlValue>,
    /// Target PK generated by the node's latest insert.
    pub top: Option<SqlValue>,
}

/// One [`Frame`] per node of a [`TupleTree`], indexed by [`NodeId`].
#[derive(Debug, Clone, Default)]
pub struct Frames {
    slots: Vec<Frame>,
}

impl Frames {
    pub fn new(tree: &TupleTree) -> Self {
        Self {
            slots: vec![Frame::default(); tree.len()],
        }
    }

    pub fn get(&self, node: NodeId) -> &Frame {
        &self.slots[node]
    }

    pub fn set_curr(&mut self, node: NodeId, curr: Option<SqlValue>) {
        self.slots[node].curr = curr;
    }

    pub fn set_top(&mut self, node: NodeId, top: Option<SqlValue>) {
        self.slots[node].top = top;
    }
}

/// Read-only view of one node together with the state of its ancestors.
#[derive(Debug, Clone, Copy)]
pub struct FrameRef<'a> {
    pub tree: &'a TupleTree,
    pub frames: &'a Frames,
    pub node: NodeId,
}

impl<'a> FrameRef<'a> {
    pub fn new(tree: &'a TupleTree, frames: &'a Frames, node: NodeId) -> Self {
        Self { tree, frames, node }
    }

    pub fn tuple(&self) -> &'a Tuple {
        self.tree.tuple(self.node)
    }

    /// The frame `levels` steps up; `ancestor(0)` is this frame.
    pub fn ancestor(&self, levels: usize) -> Option<FrameRef<'a>> {
        self.tree
            .ancestor(self.node, levels)
            .map(|node| FrameRef { node, ..*self })
    }

    pub fn parent(&self) -> Option<FrameRef<'a>> {
        self.ancestor(1)
    }

    pub fn curr(&self) -> Option<&'a SqlValue> {
        self.frames.get(self.node).curr.as_ref()
    }

    pub fn top(&self) -> Option<&'a SqlValue> {
        self.frames.get(self.node).top.as_ref()
    }
}
