//! Gatekeeper selection: the most central members of each community.

use petgraph::graph::NodeIndex;
use tracing::warn;

use crate::centrality::{self, CentralityError};
use crate::community::Partition;
use crate::config::CentralityKind;
use crate::error::{Error, Result};
use crate::graph::InteractionGraph;

/// Per-community gatekeeper lists, used as walk-termination labels.
#[derive(Debug, Clone, PartialEq)]
pub struct GatekeeperSet {
    lists: Vec<Vec<NodeIndex>>,
    side: Vec<Option<usize>>,
    degraded: Vec<usize>,
}

impl GatekeeperSet {
    /// Build from explicit lists. A node may guard at most one community.
    pub fn from_lists(node_count: usize, lists: Vec<Vec<NodeIndex>>) -> Result<Self> {
        let mut side = vec![None; node_count];
        for (community, list) in lists.iter().enumerate() {
            for node in list {
                match side.get_mut(node.index()) {
                    Some(slot @ None) => *slot = Some(community),
                    Some(Some(_)) => {
                        return Err(Error::invalid(
                            "gatekeepers",
                            format!("node {} guards two communities", node.index()),
                        ));
                    }
                    None => {
                        return Err(Error::invalid(
                            "gatekeepers",
                            format!("node {} out of range", node.index()),
                        ));
                    }
                }
            }
        }
        Ok(Self {
            lists,
            side,
            degraded: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn community(&self, id: usize) -> &[NodeIndex] {
        &self.lists[id]
    }

    pub fn lists(&self) -> &[Vec<NodeIndex>] {
        &self.lists
    }

    /// Community whose gatekeeper list contains `node`.
    pub fn side_of(&self, node: NodeIndex) -> Option<usize> {
        self.side.get(node.index()).copied().flatten()
    }

    /// Communities whose centrality failed and that have no gatekeepers.
    pub fn degraded(&self) -> &[usize] {
        &self.degraded
    }

    pub fn named(&self, graph: &InteractionGraph) -> Vec<Vec<String>> {
        self.lists
            .iter()
            .map(|list| list.iter().map(|&n| graph.node_id(n).to_string()).collect())
            .collect()
    }
}

/// Number of gatekeepers kept for a community of `size` members.
pub fn gatekeeper_count(k_pct: f64, size: usize) -> usize {
    ((k_pct * size as f64) / 100.0).ceil() as usize
}

#[derive(Debug, Clone)]
pub struct GatekeeperSelector {
    kind: CentralityKind,
    k_pct: f64,
}

impl Default for GatekeeperSelector {
    fn default() -> Self {
        Self::new(CentralityKind::Degree, 10.0)
    }
}

impl GatekeeperSelector {
    pub fn new(kind: CentralityKind, k_pct: f64) -> Self {
        Self { kind, k_pct }
    }

    /// Rank one community's members, most central first (ties keep node
    /// order).
    pub fn rank(
        &self,
        graph: &InteractionGraph,
        members: &[NodeIndex],
    ) -> std::result::Result<Vec<NodeIndex>, CentralityError> {
        let sub = graph.induced_subgraph(members);
        let scores = centrality::compute(self.kind, &sub)?;
        let mut order: Vec<usize> = (0..sub.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        Ok(order.into_iter().map(|i| sub.nodes[i]).collect())
    }

    /// Keep the top `ceil(k_pct * |community| / 100)` members of every
    /// community. A community whose centrality fails gets no gatekeepers.
    pub fn select(&self, graph: &InteractionGraph, partition: &Partition) -> GatekeeperSet {
        let mut lists = Vec::with_capacity(partition.len());
        let mut side = vec![None; graph.node_count()];
        let mut degraded = Vec::new();

        for (community, members) in partition.communities().iter().enumerate() {
            match self.rank(graph, members) {
                Ok(mut ranked) => {
                    ranked.truncate(gatekeeper_count(self.k_pct, members.len()));
                    for node in &ranked {
                        side[node.index()] = Some(community);
                    }
                    lists.push(ranked);
                }
                Err(err) => {
                    warn!(
                        community,
                        size = members.len(),
                        centrality = ?self.kind,
                        error = %err,
                        "centrality failed, community has no gatekeepers"
                    );
                    degraded.push(community);
                    lists.push(Vec::new());
                }
            }
        }

        GatekeeperSet {
            lists,
            side,
            degraded,
        }
    }
}
