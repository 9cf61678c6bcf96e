//! Single moment tree.
//!
//! Nodes live in an arena (`Vec<Node>`) and refer to each other by
//! [`NodeId`]. A tree goes through two phases: growth, where the
//! [`grower`] owns the data lens of every node, and serving, where only the
//! frozen rules and estimates remain.
use std::fmt;

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;

use crate::error::Result;
use crate::lens::DataLens;
use crate::moment::{ContainerMoment, MomentSpecification};
use crate::split::SplitRule;

mod grower;
mod honest;
pub mod options;
#[cfg(test)]
mod tests;

pub use options::{TreeOptions, TreeOptionsBuilder};

pub type NodeId = usize;

pub const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Internal,
    Terminal,
    /// Was internal, turned terminal because a child had no honest estimate.
    Pruned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafEstimate {
    pub beta: Array1<f64>,
    pub variance: Option<Array2<f64>>,
}

impl LeafEstimate {
    pub fn from_container<C: ContainerMoment>(container: &C) -> Option<Self> {
        if !container.goodness_of_fit().is_finite() {
            return None;
        }
        container.beta().map(|beta| LeafEstimate {
            beta: beta.clone(),
            variance: container.variance().cloned(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub depth: usize,
    pub parent: Option<NodeId>,
    pub children: Option<(NodeId, NodeId)>,
    pub rule: Option<SplitRule>,
    pub kind: NodeKind,
    pub estimate: Option<LeafEstimate>,
    /// Observations of the structure sample that reached this node.
    pub num_obs: usize,
    pub num_honest_obs: usize,
    /// Goodness of fit of the node's structure sample as a single region.
    pub fit: f64,
    /// Total side fit of the chosen split (internal nodes only).
    pub split_fit: Option<f64>,
}

impl Node {
    fn terminal(depth: usize, parent: Option<NodeId>, num_obs: usize, fit: f64, estimate: Option<LeafEstimate>) -> Self {
        Self {
            depth,
            parent,
            children: None,
            rule: None,
            kind: NodeKind::Terminal,
            estimate,
            num_obs,
            num_honest_obs: 0,
            fit,
            split_fit: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.children.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct TreeMoment {
    nodes: Vec<Node>,
    honest: bool,
}

impl TreeMoment {
    /// Grows a tree on `lens`. Estimates are the in-sample fits until
    /// [`TreeMoment::estimate_honest_tree`] replaces them.
    pub fn grow<S, R>(spec: &S, lens: &DataLens, options: &TreeOptions, rng: &mut R) -> Result<Self>
    where
        S: MomentSpecification,
        R: Rng + ?Sized,
    {
        options.validate()?;
        let nodes = grower::TreeGrower::new(spec, options, rng).grow(lens.clone());
        Ok(Self {
            nodes,
            honest: false,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn root(&self) -> &Node {
        &self.nodes[ROOT]
    }

    pub fn is_honest(&self) -> bool {
        self.honest
    }

    /// Walks the split rules from the root to the leaf `z` falls in.
    pub fn leaf_for(&self, z: ArrayView1<f64>) -> NodeId {
        let mut id = ROOT;
        while let (Some((left, right)), Some(rule)) = (self.nodes[id].children, &self.nodes[id].rule) {
            id = if rule.goes_left(z) { left } else { right };
        }
        id
    }

    pub fn estimated_beta(&self, z: ArrayView1<f64>) -> Option<&Array1<f64>> {
        self.nodes[self.leaf_for(z)].estimate.as_ref().map(|e| &e.beta)
    }

    pub fn estimated_variance(&self, z: ArrayView1<f64>) -> Option<&Array2<f64>> {
        self.nodes[self.leaf_for(z)]
            .estimate
            .as_ref()
            .and_then(|e| e.variance.as_ref())
    }

    pub fn predicted_y<S: MomentSpecification>(&self, spec: &S, x: ArrayView1<f64>, z: ArrayView1<f64>) -> Option<f64> {
        self.estimated_beta(z).map(|beta| spec.predicted_y(x, beta.view()))
    }

    /// Terminal nodes reachable from the root, left to right.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            match self.nodes[id].children {
                Some((left, right)) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => leaves.push(id),
            }
        }
        leaves
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves().len()
    }

    pub fn depth(&self) -> usize {
        self.leaves()
            .iter()
            .map(|&id| self.nodes[id].depth)
            .max()
            .unwrap_or(0)
    }

    /// Splits `lens` by leaf; entries follow [`TreeMoment::leaves`] order and
    /// empty leaves are kept.
    pub fn partition_lens(&self, lens: &DataLens) -> Vec<(NodeId, DataLens)> {
        let leaves = self.leaves();
        let mut positions: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for i in 0..lens.num_obs() {
            positions[self.leaf_for(lens.z_row(i))].push(i);
        }
        leaves
            .into_iter()
            .map(|id| (id, lens.subset(&positions[id])))
            .collect()
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId) -> fmt::Result {
        let node = &self.nodes[id];
        let indent = "  ".repeat(node.depth);
        match (&node.rule, node.children) {
            (Some(rule), Some((left, right))) => {
                match rule {
                    SplitRule::Continuous {
                        variable,
                        threshold,
                    } => writeln!(f, "{}z[{}] < {:.4} (n = {})", indent, variable, threshold, node.num_obs)?,
                    SplitRule::Discrete {
                        variable,
                        partition,
                    } => writeln!(
                        f,
                        "{}z[{}] in {:?} (n = {})",
                        indent,
                        variable,
                        partition.left(),
                        node.num_obs
                    )?,
                }
                self.fmt_node(f, left)?;
                self.fmt_node(f, right)
            }
            _ => match &node.estimate {
                Some(estimate) => writeln!(
                    f,
                    "{}leaf {:?} (n = {}, honest n = {}): {}",
                    indent, node.kind, node.num_obs, node.num_honest_obs, estimate.beta
                ),
                None => writeln!(f, "{}leaf {:?}: no estimate", indent, node.kind),
            },
        }
    }
}

impl fmt::Display for TreeMoment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, ROOT)
    }
}
