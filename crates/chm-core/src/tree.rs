//! Rooted phylogenetic tree with branch lengths and node ages.
//!
//! Nodes are addressed by their position in the parent-index vector used to
//! build the tree. The branch of node `i` is the edge between `i` and its
//! parent; the root's branch is the optional "tail" above the root.

use serde::{Deserialize, Serialize};

use crate::errors::{ChmError, ErrorInfo};

/// Rooted tree addressed by integer node indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    branch_lengths: Vec<f64>,
    depths: Vec<f64>,
    ages: Vec<f64>,
    root: usize,
}

impl Tree {
    /// Builds a tree from parent indices (`-1` marks the root) and branch lengths.
    pub fn from_parent_indices(
        parent_indices: &[i64],
        branch_lengths: &[f64],
    ) -> Result<Self, ChmError> {
        let n = parent_indices.len();
        if n == 0 {
            return Err(ChmError::Tree(ErrorInfo::new(
                "empty-tree",
                "tree must contain at least one node",
            )));
        }
        if branch_lengths.len() != n {
            return Err(ChmError::Tree(
                ErrorInfo::new(
                    "length-mismatch",
                    "parent indices and branch lengths differ in length",
                )
                .with_context("nodes", n.to_string())
                .with_context("branch_lengths", branch_lengths.len().to_string()),
            ));
        }

        let mut parents = Vec::with_capacity(n);
        let mut root = None;
        for (node, &raw) in parent_indices.iter().enumerate() {
            if raw < 0 {
                if root.is_some() {
                    return Err(ChmError::Tree(
                        ErrorInfo::new("multiple-roots", "more than one node has no parent")
                            .with_context("node", node.to_string()),
                    ));
                }
                root = Some(node);
                parents.push(None);
            } else {
                let parent = raw as usize;
                if parent >= n || parent == node {
                    return Err(ChmError::Tree(
                        ErrorInfo::new("invalid-parent", "parent index out of range")
                            .with_context("node", node.to_string())
                            .with_context("parent", raw.to_string()),
                    ));
                }
                parents.push(Some(parent));
            }
        }
        let root = root.ok_or_else(|| {
            ChmError::Tree(
                ErrorInfo::new("missing-root", "no node has parent index -1")
                    .with_hint("mark the root with a parent index of -1"),
            )
        })?;

        for (node, &length) in branch_lengths.iter().enumerate() {
            if !length.is_finite() || length < 0.0 {
                return Err(ChmError::Tree(
                    ErrorInfo::new("invalid-branch-length", "branch lengths must be finite and >= 0")
                        .with_context("node", node.to_string())
                        .with_context("length", length.to_string()),
                ));
            }
        }

        let mut children = vec![Vec::new(); n];
        for (node, parent) in parents.iter().enumerate() {
            if let Some(parent) = parent {
                children[*parent].push(node);
            }
        }

        let mut tree = Self {
            parents,
            children,
            branch_lengths: branch_lengths.to_vec(),
            depths: vec![0.0; n],
            ages: vec![0.0; n],
            root,
        };

        let order = tree.pre_order();
        if order.len() != n {
            return Err(ChmError::Tree(
                ErrorInfo::new("disconnected", "some nodes are not reachable from the root")
                    .with_context("reachable", order.len().to_string())
                    .with_context("nodes", n.to_string()),
            ));
        }
        for &node in &order {
            if let Some(parent) = tree.parents[node] {
                tree.depths[node] = tree.depths[parent] + tree.branch_lengths[node];
            }
        }
        let height = tree.depths.iter().copied().fold(0.0, f64::max);
        tree.ages = tree.depths.iter().map(|depth| height - depth).collect();
        Ok(tree)
    }

    /// Number of nodes (tips and internal nodes).
    pub fn num_nodes(&self) -> usize {
        self.parents.len()
    }

    /// Index of the root node.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Parent of `node`, or `None` for the root.
    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parents[node]
    }

    /// Children of `node` in insertion order.
    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    /// Returns `true` when `node` has no children.
    pub fn is_tip(&self, node: usize) -> bool {
        self.children[node].is_empty()
    }

    /// Tip indices in ascending order.
    pub fn tips(&self) -> Vec<usize> {
        (0..self.num_nodes()).filter(|&node| self.is_tip(node)).collect()
    }

    /// Length of the branch above `node`.
    pub fn branch_length(&self, node: usize) -> f64 {
        self.branch_lengths[node]
    }

    /// Age of `node` measured back from the youngest tip.
    pub fn age(&self, node: usize) -> f64 {
        self.ages[node]
    }

    /// Age of the parent end of the branch above `node`.
    pub fn branch_start_age(&self, node: usize) -> f64 {
        self.ages[node] + self.branch_lengths[node]
    }

    /// Distance from the root to the deepest node.
    pub fn height(&self) -> f64 {
        self.ages[self.root]
    }

    /// Nodes ordered parents before children.
    pub fn pre_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.num_nodes());
        let mut stack = vec![self.root];
        let mut visited = vec![false; self.num_nodes()];
        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            order.push(node);
            for &child in self.children[node].iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Nodes ordered children before parents; the root is last.
    pub fn post_order(&self) -> Vec<usize> {
        let mut order = self.pre_order();
        order.reverse();
        order
    }

    /// Sum of branch lengths on the path between `a` and `b`.
    pub fn patristic_distance(&self, a: usize, b: usize) -> f64 {
        let mut ancestors = vec![false; self.num_nodes()];
        let mut cursor = Some(a);
        while let Some(node) = cursor {
            ancestors[node] = true;
            cursor = self.parents[node];
        }
        let mut lca = b;
        while !ancestors[lca] {
            match self.parents[lca] {
                Some(parent) => lca = parent,
                None => break,
            }
        }
        (self.depths[a] - self.depths[lca]) + (self.depths[b] - self.depths[lca])
    }

    /// Pairwise patristic distances between the listed nodes.
    pub fn patristic_matrix(&self, nodes: &[usize]) -> Vec<Vec<f64>> {
        nodes
            .iter()
            .map(|&a| {
                nodes
                    .iter()
                    .map(|&b| self.patristic_distance(a, b))
                    .collect()
            })
            .collect()
    }
}
