use log::debug;

use crate::lens::DataLens;
use crate::moment::MomentSpecification;

use super::{LeafEstimate, NodeId, NodeKind, TreeMoment, ROOT};

impl TreeMoment {
    /// Replaces the estimates of the frozen tree by fits on `honest`, a
    /// sample disjoint from the one the structure was grown on.
    ///
    /// Each honest observation is routed to its leaf. Leaves without honest
    /// observations (or whose fit fails) get no estimate; a split with such a
    /// child is collapsed into a [`NodeKind::Pruned`] leaf and refit on all the
    /// honest data that reached it. A null root estimate is possible when the
    /// honest sample is empty or unusable.
    pub fn estimate_honest_tree<S: MomentSpecification>(&mut self, spec: &S, honest: &DataLens) {
        let mut positions: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for i in 0..honest.num_obs() {
            let z = honest.z_row(i);
            let mut id = ROOT;
            loop {
                positions[id].push(i);
                match (self.nodes[id].children, &self.nodes[id].rule) {
                    (Some((left, right)), Some(rule)) => {
                        id = if rule.goes_left(z) { left } else { right };
                    }
                    _ => break,
                }
            }
        }
        self.estimate_node(ROOT, spec, honest, &positions);
        self.honest = true;
    }

    fn estimate_node<S: MomentSpecification>(
        &mut self,
        id: NodeId,
        spec: &S,
        honest: &DataLens,
        positions: &[Vec<usize>],
    ) {
        if let Some((left, right)) = self.nodes[id].children {
            self.estimate_node(left, spec, honest, positions);
            self.estimate_node(right, spec, honest, positions);
            if self.nodes[left].estimate.is_none() || self.nodes[right].estimate.is_none() {
                debug!(
                    "pruning node {} at depth {}: child without honest estimate",
                    id, self.nodes[id].depth
                );
                let node = &mut self.nodes[id];
                node.children = None;
                node.rule = None;
                node.kind = NodeKind::Pruned;
            }
        }

        let lens = honest.subset(&positions[id]);
        let node = &mut self.nodes[id];
        node.num_honest_obs = lens.num_obs();
        node.estimate = if lens.is_empty() {
            None
        } else {
            LeafEstimate::from_container(&spec.compute_optimal_beta(&lens, false))
        };
    }
}
