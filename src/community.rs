//! Community partitioning by greedy modularity maximization.
//!
//! Clauset-Newman-Moore agglomeration on the undirected projection of the
//! interaction graph: every node starts alone, and the pair of adjacent
//! communities with the largest modularity gain is merged until no merge
//! improves modularity.
//!
//! By default every adjacent pair counts as one edge whatever its interaction
//! count; [`GreedyModularity::weighted`] partitions on the summed weights.
//!
//! ## Tie-breaking
//!
//! Candidate pairs `(i, j)` with `i < j` are scanned in ascending `i`, then
//! ascending `j`, where community ids are the first-seen node order. The first
//! pair reaching the maximal gain is merged, so a fixed edge list always
//! yields the same partition.

use std::collections::BTreeMap;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::InteractionGraph;

/// Disjoint communities covering every node of a graph.
///
/// Communities are ordered by size (largest first), ties by their earliest
/// node; members are listed in node order.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    communities: Vec<Vec<NodeIndex>>,
    labels: Vec<usize>,
}

impl Partition {
    /// Build from a per-node label vector (any label values).
    pub fn from_labels(labels: &[usize]) -> Self {
        let mut groups: BTreeMap<usize, Vec<NodeIndex>> = BTreeMap::new();
        for (node, &label) in labels.iter().enumerate() {
            groups.entry(label).or_default().push(NodeIndex::new(node));
        }
        let mut communities: Vec<Vec<NodeIndex>> = groups.into_values().collect();
        communities.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));

        let mut dense = vec![0; labels.len()];
        for (id, members) in communities.iter().enumerate() {
            for node in members {
                dense[node.index()] = id;
            }
        }
        Self {
            communities,
            labels: dense,
        }
    }

    /// Build from explicit community member lists. Every node in
    /// `0..node_count` must appear exactly once.
    pub fn from_communities(node_count: usize, communities: Vec<Vec<NodeIndex>>) -> Result<Self> {
        let mut labels = vec![usize::MAX; node_count];
        for (id, members) in communities.iter().enumerate() {
            if members.is_empty() {
                return Err(Error::invalid("communities", format!("community {id} is empty")));
            }
            for node in members {
                let slot = labels.get_mut(node.index()).ok_or_else(|| {
                    Error::invalid("communities", format!("node {} out of range", node.index()))
                })?;
                if *slot != usize::MAX {
                    return Err(Error::invalid(
                        "communities",
                        format!("node {} assigned twice", node.index()),
                    ));
                }
                *slot = id;
            }
        }
        if let Some(node) = labels.iter().position(|&l| l == usize::MAX) {
            return Err(Error::invalid(
                "communities",
                format!("node {node} not assigned"),
            ));
        }
        Ok(Self {
            communities,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.communities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }

    pub fn communities(&self) -> &[Vec<NodeIndex>] {
        &self.communities
    }

    pub fn community(&self, id: usize) -> &[NodeIndex] {
        &self.communities[id]
    }

    pub fn community_of(&self, node: NodeIndex) -> Option<usize> {
        self.labels.get(node.index()).copied()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn named(&self, graph: &InteractionGraph) -> Vec<Vec<String>> {
        self.communities
            .iter()
            .map(|members| members.iter().map(|&n| graph.node_id(n).to_string()).collect())
            .collect()
    }
}

/// A partition together with its modularity.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionResult {
    #[serde(skip)]
    pub partition: Partition,
    pub modularity: f64,
}

/// Algorithms that split an interaction graph into communities.
pub trait CommunityDetection {
    fn detect(&self, graph: &InteractionGraph) -> Result<PartitionResult>;

    fn resolution(&self) -> f64 {
        1.0
    }
}

/// Greedy (CNM) modularity maximization.
#[derive(Debug, Clone)]
pub struct GreedyModularity {
    resolution: f64,
    weighted: bool,
}

impl Default for GreedyModularity {
    fn default() -> Self {
        Self::new()
    }
}

impl GreedyModularity {
    pub fn new() -> Self {
        Self {
            resolution: 1.0,
            weighted: false,
        }
    }

    pub fn weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    /// Higher values produce smaller communities.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    fn agglomerate(&self, n: usize, edges: &[(usize, usize, f64)]) -> Vec<usize> {
        let m: f64 = edges.iter().map(|&(_, _, w)| w).sum();
        let mut labels: Vec<usize> = (0..n).collect();
        if m == 0.0 {
            return labels;
        }

        // e[i][j]: half the fraction of edge weight between communities i and
        // j (stored symmetrically); a[i]: fraction of edge ends in i.
        let mut e: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
        let mut a = vec![0.0; n];
        for &(u, v, w) in edges {
            let half = w / (2.0 * m);
            *e[u].entry(v).or_insert(0.0) += half;
            *e[v].entry(u).or_insert(0.0) += half;
            a[u] += half;
            a[v] += half;
        }

        let mut alive = vec![true; n];
        let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        let mut merges = 0usize;

        loop {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in 0..n {
                if !alive[i] {
                    continue;
                }
                for (&j, &e_ij) in e[i].range(i + 1..) {
                    let gain = 2.0 * (e_ij - self.resolution * a[i] * a[j]);
                    if best.is_none_or(|(_, _, g)| gain > g) {
                        best = Some((i, j, gain));
                    }
                }
            }

            let Some((i, j, gain)) = best else { break };
            if gain <= 0.0 {
                break;
            }

            // Merge j into i.
            let row_j = std::mem::take(&mut e[j]);
            for (k, e_jk) in row_j {
                if k == i {
                    continue;
                }
                *e[i].entry(k).or_insert(0.0) += e_jk;
                e[k].remove(&j);
                *e[k].entry(i).or_insert(0.0) += e_jk;
            }
            e[i].remove(&j);
            a[i] += a[j];
            a[j] = 0.0;
            alive[j] = false;
            let moved = std::mem::take(&mut members[j]);
            members[i].extend(moved);
            merges += 1;
        }

        for (id, group) in members.iter().enumerate() {
            for &node in group {
                labels[node] = id;
            }
        }
        debug!(merges, "greedy modularity finished");
        labels
    }
}

impl CommunityDetection for GreedyModularity {
    fn detect(&self, graph: &InteractionGraph) -> Result<PartitionResult> {
        if graph.is_empty() {
            return Err(Error::EmptyGraph);
        }
        let mut edges = graph.undirected_edges();
        if !self.weighted {
            for edge in edges.iter_mut() {
                edge.2 = 1.0;
            }
        }
        let labels = self.agglomerate(graph.node_count(), &edges);
        let partition = Partition::from_labels(&labels);
        let modularity = modularity(
            graph.node_count(),
            &edges,
            partition.labels(),
            self.resolution,
        );
        debug!(communities = partition.len(), modularity, "partitioned graph");
        Ok(PartitionResult {
            partition,
            modularity,
        })
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }
}

/// Modularity of `labels` over an undirected weighted edge list:
/// `Q = sum_c [ L_c / m - gamma * (d_c / 2m)^2 ]`.
pub fn modularity(
    n: usize,
    edges: &[(usize, usize, f64)],
    labels: &[usize],
    resolution: f64,
) -> f64 {
    let m: f64 = edges.iter().map(|&(_, _, w)| w).sum();
    if m == 0.0 {
        return 0.0;
    }
    let k = labels.iter().copied().max().map_or(0, |max| max + 1);
    let mut internal = vec![0.0; k];
    let mut degree = vec![0.0; k];
    for &(u, v, w) in edges {
        debug_assert!(u < n && v < n);
        degree[labels[u]] += w;
        degree[labels[v]] += w;
        if labels[u] == labels[v] {
            internal[labels[u]] += w;
        }
    }
    internal
        .iter()
        .zip(&degree)
        .map(|(l, d)| l / m - resolution * (d / (2.0 * m)).powi(2))
        .sum()
}
