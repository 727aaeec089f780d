use std::collections::{HashMap, HashSet};
use std::path::Path;

use csv::{ReaderBuilder, Writer};
use petgraph::algo::tarjan_scc;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::community::Partition;
use crate::config::{ComponentFilter, GraphConfig};
use crate::error::{Error, Result};
use crate::gatekeeper::GatekeeperSet;

/// One aggregated interaction: `source` retweeted or replied to `target`
/// `weight` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    #[serde(rename = "a")]
    pub source: String,
    #[serde(rename = "b")]
    pub target: String,
    #[serde(rename = "w")]
    pub weight: f64,
}

impl EdgeRecord {
    pub fn new(source: impl Into<String>, target: impl Into<String>, weight: f64) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight,
        }
    }
}

const HEADER_COLUMNS: [(&str, &str); 4] =
    [("a", "b"), ("source", "target"), ("src", "dst"), ("from", "to")];

fn is_header(record: &csv::StringRecord) -> bool {
    if record.get(2).is_some_and(|w| w.parse::<f64>().is_err()) {
        return true;
    }
    let (a, b) = (record[0].to_ascii_lowercase(), record[1].to_ascii_lowercase());
    HEADER_COLUMNS.iter().any(|&(x, y)| a == x && b == y)
}

/// Read `a,b[,w]` rows. The first row is a header when its weight is not a
/// number or its columns are named like `source,target`. A missing or
/// unparsable weight counts as one interaction.
pub fn read_edges_csv(path: impl AsRef<Path>) -> Result<Vec<EdgeRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut edges = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < 2 {
            warn!(row, "skipping edge row with fewer than two columns");
            continue;
        }
        if row == 0 && is_header(&record) {
            continue;
        }
        let weight = record.get(2).and_then(|w| w.parse::<f64>().ok());
        edges.push(EdgeRecord::new(&record[0], &record[1], weight.unwrap_or(1.0)));
    }
    Ok(edges)
}

/// Directed weighted interaction graph with a precomputed walk adjacency.
///
/// Node indices follow first-seen order in the edge list, which makes every
/// downstream stage deterministic for a given input.
#[derive(Debug, Clone)]
pub struct InteractionGraph {
    graph: DiGraph<String, f64>,
    index: HashMap<String, NodeIndex>,
    neighbors: Vec<Vec<NodeIndex>>,
    directed: bool,
}

impl InteractionGraph {
    fn from_parts(graph: DiGraph<String, f64>, directed: bool) -> Self {
        let index = graph
            .node_indices()
            .map(|idx| (graph[idx].clone(), idx))
            .collect();

        let mut neighbors: Vec<Vec<NodeIndex>> = vec![Vec::new(); graph.node_count()];
        let mut seen: Vec<HashSet<NodeIndex>> = vec![HashSet::new(); graph.node_count()];
        for edge in graph.edge_references() {
            let (a, b) = (edge.source(), edge.target());
            if seen[a.index()].insert(b) {
                neighbors[a.index()].push(b);
            }
            if !directed && seen[b.index()].insert(a) {
                neighbors[b.index()].push(a);
            }
        }

        Self {
            graph,
            index,
            neighbors,
            directed,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn inner(&self) -> &DiGraph<String, f64> {
        &self.graph
    }

    pub fn node_id(&self, node: NodeIndex) -> &str {
        &self.graph[node]
    }

    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Nodes a random walk may move to from `node`: out-neighbours in
    /// directed mode, all neighbours otherwise.
    pub fn walk_neighbors(&self, node: NodeIndex) -> &[NodeIndex] {
        &self.neighbors[node.index()]
    }

    /// Undirected projection: one `(u, v, w)` per unordered node pair with
    /// `u < v`, reciprocal edges summed.
    pub fn undirected_edges(&self) -> Vec<(usize, usize, f64)> {
        let mut merged: HashMap<(usize, usize), usize> = HashMap::new();
        let mut edges: Vec<(usize, usize, f64)> = Vec::new();
        for edge in self.graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            let key = (a.min(b), a.max(b));
            match merged.get(&key) {
                Some(&pos) => edges[pos].2 += *edge.weight(),
                None => {
                    merged.insert(key, edges.len());
                    edges.push((key.0, key.1, *edge.weight()));
                }
            }
        }
        edges
    }

    /// Node-induced subgraph over `members`, re-indexed `0..members.len()`.
    pub fn induced_subgraph(&self, members: &[NodeIndex]) -> InducedSubgraph {
        let local: HashMap<NodeIndex, usize> = members
            .iter()
            .enumerate()
            .map(|(i, &node)| (node, i))
            .collect();

        let mut out = vec![Vec::new(); members.len()];
        let mut inc = vec![Vec::new(); members.len()];
        for (i, &node) in members.iter().enumerate() {
            for next in self.walk_neighbors(node) {
                if let Some(&j) = local.get(next) {
                    out[i].push(j);
                    inc[j].push(i);
                }
            }
        }

        InducedSubgraph {
            nodes: members.to_vec(),
            out,
            inc,
            directed: self.directed,
        }
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeRecord> + '_ {
        self.graph.edge_references().map(|edge| {
            EdgeRecord::new(
                self.graph[edge.source()].clone(),
                self.graph[edge.target()].clone(),
                *edge.weight(),
            )
        })
    }

    pub fn save_edge_list(&self, filename: impl AsRef<Path>) -> Result<()> {
        let mut writer = Writer::from_path(filename)?;
        for edge in self.edges() {
            writer.serialize(edge)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Graphviz rendering with one hue per community; gatekeepers are drawn
    /// as double circles.
    pub fn to_dot(&self, partition: &Partition, gatekeepers: &GatekeeperSet) -> String {
        let node_attributes = |_: &DiGraph<String, f64>, (node, username): (NodeIndex, &String)| {
            let hue = partition
                .community_of(node)
                .map(|comm_id| (comm_id * 60) % 360)
                .unwrap_or(0);
            let shape = if gatekeepers.side_of(node).is_some() {
                "doublecircle"
            } else {
                "ellipse"
            };
            format!(
                "label=\"{}\", shape={}, style=filled, fillcolor=\"{:.3} 0.5 0.7\"",
                username.replace('"', "\\\""),
                shape,
                hue as f32 / 360.0
            )
        };
        let dot = Dot::with_attr_getters(
            &self.graph,
            &[Config::EdgeNoLabel, Config::NodeNoLabel],
            &|_, edge| format!("label=\"{}\"", edge.weight()),
            &node_attributes,
        );
        format!("{:?}", dot)
    }

    pub fn save_dot(
        &self,
        filename: impl AsRef<Path>,
        partition: &Partition,
        gatekeepers: &GatekeeperSet,
    ) -> Result<()> {
        std::fs::write(filename, self.to_dot(partition, gatekeepers))?;
        Ok(())
    }
}

/// Local view of a community used by the centrality measures.
#[derive(Debug, Clone)]
pub struct InducedSubgraph {
    pub nodes: Vec<NodeIndex>,
    pub out: Vec<Vec<usize>>,
    // Equal to `out` for undirected graphs.
    pub inc: Vec<Vec<usize>>,
    pub directed: bool,
}

impl InducedSubgraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    pub fn from_csv(&self, filename: impl AsRef<Path>) -> Result<InteractionGraph> {
        self.build(read_edges_csv(filename)?)
    }

    /// Add every edge, drop self-loops and isolated nodes, keep the requested
    /// component. Fails with [`Error::EmptyGraph`] when nothing remains.
    pub fn build<I>(&self, edges: I) -> Result<InteractionGraph>
    where
        I: IntoIterator<Item = EdgeRecord>,
    {
        let mut graph: DiGraph<String, f64> = DiGraph::new();
        let mut node_indices: HashMap<String, NodeIndex> = HashMap::new();
        let mut dropped = 0usize;

        for EdgeRecord {
            source,
            target,
            weight,
        } in edges
        {
            let node1 = *node_indices
                .entry(source.clone())
                .or_insert_with(|| graph.add_node(source));
            let node2 = *node_indices
                .entry(target.clone())
                .or_insert_with(|| graph.add_node(target));

            if node1 == node2 || !(weight > 0.0) || !weight.is_finite() {
                dropped += 1;
                continue;
            }

            if let Some(edge) = graph.find_edge(node1, node2) {
                graph[edge] += weight;
            } else {
                graph.add_edge(node1, node2, weight);
            }
        }
        if dropped > 0 {
            debug!(dropped, "dropped self-loops and non-positive edges");
        }

        let keep = self.retained_nodes(&graph);
        let filtered = retain_nodes(&graph, &keep);
        if filtered.node_count() == 0 {
            return Err(Error::EmptyGraph);
        }

        debug!(
            nodes = filtered.node_count(),
            edges = filtered.edge_count(),
            discarded = graph.node_count() - filtered.node_count(),
            "built interaction graph"
        );
        Ok(InteractionGraph::from_parts(filtered, self.config.directed))
    }

    fn retained_nodes(&self, graph: &DiGraph<String, f64>) -> Vec<bool> {
        let mut keep: Vec<bool> = graph
            .node_indices()
            .map(|node| {
                !self.config.remove_isolated || graph.neighbors_undirected(node).next().is_some()
            })
            .collect();

        let components: Vec<Vec<usize>> = match self.config.component {
            ComponentFilter::None => return keep,
            ComponentFilter::LargestStrong if self.config.directed => tarjan_scc(graph)
                .into_iter()
                .map(|component| component.into_iter().map(NodeIndex::index).collect())
                .collect(),
            _ => weak_components(graph),
        };

        // Ties go to the component holding the earliest-seen node.
        let largest = components
            .into_iter()
            .map(|mut members: Vec<usize>| {
                members.retain(|&i| keep[i]);
                members.sort_unstable();
                members
            })
            .filter(|members| !members.is_empty())
            .max_by(|a, b| a.len().cmp(&b.len()).then(b[0].cmp(&a[0])));

        let mut in_largest = vec![false; keep.len()];
        for i in largest.unwrap_or_default() {
            in_largest[i] = true;
        }
        for (flag, inside) in keep.iter_mut().zip(in_largest) {
            *flag &= inside;
        }
        keep
    }
}

fn weak_components(graph: &DiGraph<String, f64>) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(graph.node_count());
    for edge in graph.edge_references() {
        uf.union(edge.source().index(), edge.target().index());
    }
    let mut by_root: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<usize>> = Vec::new();
    for node in 0..graph.node_count() {
        let root = uf.find(node);
        let slot = *by_root.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[slot].push(node);
    }
    components
}

fn retain_nodes(graph: &DiGraph<String, f64>, keep: &[bool]) -> DiGraph<String, f64> {
    let mut filtered = DiGraph::with_capacity(keep.len(), graph.edge_count());
    let mut mapping: Vec<Option<NodeIndex>> = vec![None; keep.len()];
    for node in graph.node_indices() {
        if keep[node.index()] {
            mapping[node.index()] = Some(filtered.add_node(graph[node].clone()));
        }
    }
    for edge in graph.edge_references() {
        let (source, target) = (edge.source().index(), edge.target().index());
        if let (Some(a), Some(b)) = (mapping[source], mapping[target]) {
            filtered.add_edge(a, b, *edge.weight());
        }
    }
    filtered
}
