//! Engine configuration.
//!
//! Every field has a default, so a JSON file only needs to name the values it
//! changes:
//!
//! ```json
//! { "iterations": 500, "centrality": "betweenness", "graph": { "directed": true } }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which connected component(s) survive graph construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentFilter {
    None,
    /// Keep the largest weakly connected component.
    #[default]
    Largest,
    /// Keep the largest strongly connected component. Same as `Largest` for
    /// undirected graphs.
    LargestStrong,
}

/// Centrality used to rank gatekeepers inside a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityKind {
    #[default]
    Degree,
    Betweenness,
    Closeness,
    Eigenvector,
}

impl std::str::FromStr for CentralityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().trim_end_matches("_centrality") {
            "degree" => Ok(Self::Degree),
            "betweenness" => Ok(Self::Betweenness),
            "closeness" => Ok(Self::Closeness),
            "eigenvector" => Ok(Self::Eigenvector),
            other => Err(Error::invalid(
                "centrality",
                format!("unknown centrality '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Walk along out-edges only instead of all incident edges.
    pub directed: bool,
    /// Drop nodes whose total degree is zero.
    pub remove_isolated: bool,
    pub component: ComponentFilter,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            directed: false,
            remove_isolated: true,
            component: ComponentFilter::Largest,
        }
    }
}

/// Full engine configuration for one `(date, topic)` unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub graph: GraphConfig,
    pub centrality: CentralityKind,
    /// Percentage of each community kept as gatekeepers.
    pub k_pct: f64,
    pub iterations: usize,
    pub max_steps: usize,
    /// Master seed. A fresh one is drawn when absent.
    pub seed: Option<u64>,
    /// Worker threads for the simulator. Defaults to the rayon pool size.
    pub workers: Option<usize>,
    /// Wall-clock budget of the simulation in milliseconds.
    pub deadline_ms: Option<u64>,
    /// Modularity resolution (gamma).
    pub resolution: f64,
    /// Partition on interaction counts instead of treating every adjacent
    /// pair as one edge.
    pub weighted_communities: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            centrality: CentralityKind::Degree,
            k_pct: 10.0,
            iterations: 100,
            max_steps: 10_000,
            seed: None,
            workers: None,
            deadline_ms: None,
            resolution: 1.0,
            weighted_communities: false,
        }
    }
}

impl EngineConfig {
    /// Read a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::invalid("iterations", "must be at least 1"));
        }
        if self.max_steps == 0 {
            return Err(Error::invalid("max_steps", "must be at least 1"));
        }
        if !(self.k_pct > 0.0 && self.k_pct <= 100.0) {
            return Err(Error::invalid(
                "k_pct",
                format!("must be in (0, 100], got {}", self.k_pct),
            ));
        }
        if !(self.resolution > 0.0) || !self.resolution.is_finite() {
            return Err(Error::invalid(
                "resolution",
                format!("must be positive, got {}", self.resolution),
            ));
        }
        if self.workers == Some(0) {
            return Err(Error::invalid("workers", "must be at least 1"));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}
