//! Immutable, versioned syntax trees
//!
//! Trees are produced by the host's parser and only borrowed by this crate
//! for the duration of one analysis pass. Nodes live in an arena indexed by
//! [`NodeId`]; tokens are leaf nodes. The arena is laid out in preorder, so
//! iterating node ids visits the tree exactly once in source order.

use crate::span::{LineIndex, Span};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Index of a node within its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: String,
    span: Span,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// One parsed source file at one version.
#[derive(Debug, Clone)]
pub struct SourceTree {
    path: PathBuf,
    text: String,
    version: u32,
    nodes: Vec<NodeData>,
    line_index: LineIndex,
}

impl SourceTree {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Monotonically increasing version; bumped by the host on each
    /// rewrite. Spans computed against one version are invalid against any
    /// other.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeId(0))
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn kind(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    /// The text covered by a node's span.
    pub fn node_text(&self, id: NodeId) -> &str {
        self.span(id).slice(&self.text).unwrap_or("")
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Tokens are leaves.
    pub fn is_token(&self, id: NodeId) -> bool {
        self.nodes[id.index()].children.is_empty()
    }

    /// 1-based (line, column) for a byte offset.
    pub fn line_col(&self, offset: u32) -> (usize, usize) {
        self.line_index.line_col(offset)
    }

    /// All node ids in preorder (source order).
    pub fn preorder(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Innermost node whose span contains the offset.
    pub fn node_at(&self, offset: u32) -> Option<NodeId> {
        let mut found = None;
        for id in self.preorder() {
            if self.span(id).contains(offset) {
                found = Some(id);
            }
        }
        found
    }
}

/// Incremental builder used by hosts (and tests) to assemble a tree in
/// source order.
#[derive(Debug)]
pub struct TreeBuilder {
    path: PathBuf,
    text: String,
    version: u32,
    nodes: Vec<NodeData>,
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            version: 1,
            nodes: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    fn push(&mut self, kind: &str, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let parent = self.stack.last().copied();
        self.nodes.push(NodeData {
            kind: kind.to_string(),
            span,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p.index()].children.push(id);
        }
        id
    }

    /// Open an interior node; subsequent nodes become its children until
    /// [`close`](Self::close).
    pub fn open(&mut self, kind: &str, span: Span) -> NodeId {
        let id = self.push(kind, span);
        self.stack.push(id);
        id
    }

    pub fn close(&mut self) {
        self.stack.pop();
    }

    /// Add a leaf token under the currently open node.
    pub fn token(&mut self, kind: &str, span: Span) -> NodeId {
        self.push(kind, span)
    }

    pub fn finish(mut self) -> SourceTree {
        self.stack.clear();
        let line_index = LineIndex::new(&self.text);
        SourceTree {
            path: self.path,
            text: self.text,
            version: self.version,
            nodes: self.nodes,
            line_index,
        }
    }
}
