use std::collections::HashMap;

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};

use crate::error::OptResult;
use crate::planner::PlannerInfo;
use crate::relids::{Relids, RtIndex};

type JoinGraphInner = UnGraph<RtIndex, ()>;

/// Base relations linked wherever some join clause references both.
pub struct JoinGraph {
    graph: JoinGraphInner,
    nodes: HashMap<RtIndex, NodeIndex>,
}

impl JoinGraph {
    pub fn build(root: &PlannerInfo) -> OptResult<Self> {
        let mut graph = JoinGraphInner::default();
        let mut nodes = HashMap::new();

        for id in root.base_rel_ids() {
            if let Some(relid) = root.rel(id)?.relid() {
                nodes.insert(relid, graph.add_node(relid));
            }
        }

        for id in root.base_rel_ids() {
            let rel = root.rel(id)?;
            let from = match rel.relid().and_then(|relid| nodes.get(&relid)) {
                Some(node) => *node,
                None => continue,
            };
            for info in &rel.joininfo {
                for other in info.unjoined_relids.iter() {
                    if let Some(to) = nodes.get(&other) {
                        if from < *to && graph.find_edge(from, *to).is_none() {
                            graph.add_edge(from, *to, ());
                        }
                    }
                }
            }
        }

        Ok(Self { graph, nodes })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of groups of relations no join clause connects to each other.
    pub fn components(&self) -> usize {
        connected_components(&self.graph)
    }

    fn neighbors(&self, relid: RtIndex) -> impl Iterator<Item = RtIndex> + '_ {
        self.nodes
            .get(&relid)
            .into_iter()
            .flat_map(move |node| self.graph.neighbors(*node))
            .map(move |node| self.graph[node])
    }

    /// Some join clause links a member of `a` with a member of `b`.
    pub fn linked(&self, a: &Relids, b: &Relids) -> bool {
        a.iter()
            .any(|relid| self.neighbors(relid).any(|other| b.contains(other)))
    }

    /// Some join clause links a member of `relids` with a relation outside it.
    pub fn has_outside_links(&self, relids: &Relids) -> bool {
        relids
            .iter()
            .any(|relid| self.neighbors(relid).any(|other| !relids.contains(other)))
    }
}
