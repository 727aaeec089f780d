//! Per `(date, topic)` orchestration: graph -> partition -> gatekeepers ->
//! simulation -> score, plus campaign-level aggregation.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::community::{CommunityDetection, GreedyModularity, Partition};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::gatekeeper::{GatekeeperSelector, GatekeeperSet};
use crate::graph::{EdgeRecord, GraphBuilder, InteractionGraph};
use crate::matrix::SquareMatrix;
use crate::score::polarization_score;
use crate::sentiment::{ReplyRecord, ReplySentimentTable, SentimentLookup};
use crate::simulator::{ControversySimulator, SimulationConfig, WalkStats};

#[derive(Debug, Clone, Serialize)]
pub struct PolarizationRecord {
    pub topic_words: Vec<String>,
    pub pscore: f64,
    pub num_communities: usize,
    pub modularity: f64,
    pub crossing_matrix: SquareMatrix,
    pub sentiment_matrix: SquareMatrix,
    pub gatekeepers: Vec<Vec<String>>,
    /// Completed walks per starting community.
    pub effective_samples: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub walk_stats: Option<WalkStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl PolarizationRecord {
    /// The "no signal" record used for empty or failed units.
    pub fn empty(topic_words: Vec<String>) -> Self {
        Self {
            topic_words,
            pscore: 0.0,
            num_communities: 0,
            modularity: 0.0,
            crossing_matrix: SquareMatrix::zeros(0),
            sentiment_matrix: SquareMatrix::zeros(0),
            gatekeepers: Vec::new(),
            effective_samples: Vec::new(),
            walk_stats: None,
            seed: None,
        }
    }
}

/// Every intermediate of one analysis, for dumps and inspection.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub graph: InteractionGraph,
    pub partition: Partition,
    pub gatekeepers: GatekeeperSet,
    pub record: PolarizationRecord,
}

/// Input of one `(date, topic)` unit of a campaign.
#[derive(Debug, Clone, Default)]
pub struct CampaignUnit {
    pub date: String,
    pub topic_index: usize,
    pub topic_words: Vec<String>,
    pub edges: Vec<EdgeRecord>,
    pub replies: Vec<ReplyRecord>,
}

#[derive(Debug, Clone)]
pub struct PolarityEngine {
    config: EngineConfig,
}

impl PolarityEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline. `lookup_for` builds the sentiment lookup once
    /// the partition is known. Fails with [`Error::EmptyGraph`] when no node
    /// survives filtering.
    pub fn analyze_with<F, S>(
        &self,
        topic_words: Vec<String>,
        edges: Vec<EdgeRecord>,
        lookup_for: F,
    ) -> Result<Analysis>
    where
        F: FnOnce(&InteractionGraph, &Partition) -> S,
        S: SentimentLookup,
    {
        let graph = GraphBuilder::new(self.config.graph.clone()).build(edges)?;
        let detected = GreedyModularity::new()
            .with_resolution(self.config.resolution)
            .weighted(self.config.weighted_communities)
            .detect(&graph)?;
        let partition = detected.partition;
        let n = partition.len();

        if n <= 1 {
            info!(nodes = graph.node_count(), "single community, controversy undefined");
            let gatekeepers = GatekeeperSet::from_lists(graph.node_count(), vec![Vec::new(); n])?;
            let record = PolarizationRecord {
                num_communities: n,
                modularity: detected.modularity,
                ..PolarizationRecord::empty(topic_words)
            };
            return Ok(Analysis {
                graph,
                partition,
                gatekeepers,
                record,
            });
        }

        let gatekeepers = GatekeeperSelector::new(self.config.centrality, self.config.k_pct)
            .select(&graph, &partition);
        let lookup = lookup_for(&graph, &partition);

        let seed = self.config.seed.unwrap_or_else(rand::random);
        let mut sim_config = SimulationConfig::new(self.config.iterations, seed)
            .with_max_steps(self.config.max_steps);
        if let Some(workers) = self.config.workers {
            sim_config = sim_config.with_workers(workers);
        }
        if let Some(deadline) = self.config.deadline() {
            sim_config = sim_config.with_deadline(deadline);
        }

        let simulation =
            ControversySimulator::new(&graph, &partition, &gatekeepers, &lookup, sim_config).run()?;
        let pscore = polarization_score(&simulation.crossing, &simulation.sentiment)?;

        info!(
            nodes = graph.node_count(),
            communities = n,
            modularity = detected.modularity,
            pscore,
            "scored polarization"
        );

        let record = PolarizationRecord {
            topic_words,
            pscore,
            num_communities: n,
            modularity: detected.modularity,
            effective_samples: simulation.stats.completed.clone(),
            gatekeepers: gatekeepers.named(&graph),
            crossing_matrix: simulation.crossing,
            sentiment_matrix: simulation.sentiment,
            walk_stats: Some(simulation.stats),
            seed: Some(simulation.seed),
        };
        Ok(Analysis {
            graph,
            partition,
            gatekeepers,
            record,
        })
    }

    /// Full pipeline with sentiment aggregated from scored replies. An empty
    /// graph yields the zero record.
    pub fn analyze(
        &self,
        topic_words: Vec<String>,
        edges: Vec<EdgeRecord>,
        replies: Vec<ReplyRecord>,
    ) -> Result<PolarizationRecord> {
        match self.analyze_replies(topic_words.clone(), edges, replies) {
            Ok(analysis) => Ok(analysis.record),
            Err(Error::EmptyGraph) => {
                info!("empty graph, no polarization signal");
                Ok(PolarizationRecord::empty(topic_words))
            }
            Err(err) => Err(err),
        }
    }

    fn analyze_replies(
        &self,
        topic_words: Vec<String>,
        edges: Vec<EdgeRecord>,
        replies: Vec<ReplyRecord>,
    ) -> Result<Analysis> {
        self.analyze_with(topic_words, edges, |graph, partition| {
            ReplySentimentTable::aggregate(graph, partition, replies)
        })
    }

    /// Analyze every unit. A failing unit is logged and reported with the
    /// zero record; the others proceed.
    pub fn analyze_campaign(&self, units: Vec<CampaignUnit>) -> CampaignReport {
        self.analyze_campaign_with(units, |_, _, _| Ok(()))
    }

    /// Like [`analyze_campaign`](Self::analyze_campaign), handing every unit
    /// that produced a graph to `on_analysis` (e.g. to dump its edge list).
    /// A failing callback is logged and does not change the record.
    pub fn analyze_campaign_with<F>(
        &self,
        units: Vec<CampaignUnit>,
        mut on_analysis: F,
    ) -> CampaignReport
    where
        F: FnMut(&str, usize, &Analysis) -> Result<()>,
    {
        let mut report = CampaignReport::default();
        for unit in units {
            let CampaignUnit {
                date,
                topic_index,
                topic_words,
                edges,
                replies,
            } = unit;
            let record = match self.analyze_replies(topic_words.clone(), edges, replies) {
                Ok(analysis) => {
                    if let Err(err) = on_analysis(&date, topic_index, &analysis) {
                        warn!(%date, topic_index, error = %err, "unit callback failed");
                    }
                    analysis.record
                }
                Err(Error::EmptyGraph) => {
                    info!(%date, topic_index, "empty graph, no polarization signal");
                    PolarizationRecord::empty(topic_words)
                }
                Err(err) => {
                    warn!(%date, topic_index, error = %err, "unit failed, reporting zero record");
                    PolarizationRecord::empty(topic_words)
                }
            };
            report.insert(date, topic_index, record);
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: String,
    pub topic_index: usize,
    pub pscore: f64,
    pub modularity: f64,
}

/// `{date: {topic_index: record}}`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CampaignReport {
    dates: BTreeMap<String, BTreeMap<usize, PolarizationRecord>>,
}

impl CampaignReport {
    pub fn insert(
        &mut self,
        date: impl Into<String>,
        topic_index: usize,
        record: PolarizationRecord,
    ) {
        self.dates
            .entry(date.into())
            .or_default()
            .insert(topic_index, record);
    }

    pub fn get(&self, date: &str, topic_index: usize) -> Option<&PolarizationRecord> {
        self.dates.get(date).and_then(|topics| topics.get(&topic_index))
    }

    pub fn len(&self) -> usize {
        self.dates.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Points ordered by date, then topic.
    pub fn time_series(&self) -> Vec<SeriesPoint> {
        self.dates
            .iter()
            .flat_map(|(date, topics)| {
                topics.iter().map(move |(&topic_index, record)| SeriesPoint {
                    date: date.clone(),
                    topic_index,
                    pscore: record.pscore,
                    modularity: record.modularity,
                })
            })
            .collect()
    }

    pub fn write_json(&self, filename: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(filename)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_time_series(&self, filename: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(filename)?;
        for point in self.time_series() {
            writer.serialize(point)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::PlantedCommunities;

    fn engine(seed: u64) -> PolarityEngine {
        PolarityEngine::new(EngineConfig {
            seed: Some(seed),
            iterations: 200,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn empty_edges_give_zero_record() {
        let record = engine(1)
            .analyze(vec!["#topic".into()], Vec::new(), Vec::new())
            .unwrap();
        assert_eq!(record.pscore, 0.0);
        assert_eq!(record.num_communities, 0);
        assert!(record.gatekeepers.is_empty());
    }

    #[test]
    fn single_community_short_circuits() {
        let edges = vec![EdgeRecord::new("a", "b", 1.0)];
        let analysis = engine(1)
            .analyze_with(Vec::new(), edges, |_, _| -> ReplySentimentTable {
                panic!("simulator must not run for one community")
            })
            .unwrap();
        assert_eq!(analysis.record.num_communities, 1);
        assert_eq!(analysis.record.pscore, 0.0);
        assert!(analysis.record.walk_stats.is_none());
    }

    #[test]
    fn echo_chamber_scores_high() {
        let edges = PlantedCommunities::new(2, 12)
            .with_intra_probability(1.0)
            .with_inter_edges(1)
            .generate(5);
        let record = engine(11).analyze(vec!["#x".into()], edges, Vec::new()).unwrap();
        assert_eq!(record.num_communities, 2);
        assert!(record.crossing_matrix.get(0, 0) > 0.8, "{:?}", record.crossing_matrix);
        assert!(record.crossing_matrix.get(1, 1) > 0.8);
        assert!(record.pscore > 0.3);
        assert_eq!(record.effective_samples, vec![200, 200]);
    }

    #[test]
    fn campaign_hands_out_each_graph() {
        let units = vec![
            CampaignUnit {
                date: "2024-05-01".into(),
                topic_index: 2,
                edges: PlantedCommunities::new(2, 6)
                    .with_intra_probability(1.0)
                    .with_inter_edges(1)
                    .generate(8),
                ..CampaignUnit::default()
            },
            CampaignUnit {
                date: "2024-05-02".into(),
                topic_index: 0,
                ..CampaignUnit::default()
            },
        ];
        let dir = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        let report = engine(3).analyze_campaign_with(units, |date, topic_index, analysis| {
            seen.push((date.to_string(), topic_index));
            analysis.graph.save_edge_list(dir.path().join(format!("{date}_{topic_index}.csv")))
        });

        assert_eq!(report.len(), 2);
        assert_eq!(seen, vec![("2024-05-01".to_string(), 2)]);
        let dumped = crate::graph::read_edges_csv(dir.path().join("2024-05-01_2.csv")).unwrap();
        assert_eq!(dumped.len(), 2 * 15 + 1);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = EngineConfig {
            iterations: 0,
            ..EngineConfig::default()
        };
        assert!(PolarityEngine::new(config).is_err());
    }

    #[test]
    fn campaign_keeps_going_past_empty_units() {
        let units = vec![
            CampaignUnit {
                date: "2024-03-02".into(),
                topic_index: 0,
                edges: PlantedCommunities::new(2, 8)
                    .with_intra_probability(1.0)
                    .with_inter_edges(1)
                    .generate(2),
                ..CampaignUnit::default()
            },
            CampaignUnit {
                date: "2024-03-01".into(),
                topic_index: 0,
                ..CampaignUnit::default()
            },
        ];
        let report = engine(4).analyze_campaign(units);
        assert_eq!(report.len(), 2);
        assert_eq!(report.get("2024-03-01", 0).unwrap().pscore, 0.0);

        let series = report.time_series();
        assert_eq!(series[0].date, "2024-03-01");
        assert!(series[1].pscore > 0.0);

        let dir = tempfile::tempdir().unwrap();
        report.write_json(dir.path().join("report.json")).unwrap();
        let file = File::open(dir.path().join("report.json")).unwrap();
        let json: serde_json::Value = serde_json::from_reader(file).unwrap();
        assert!(json["2024-03-02"]["0"]["pscore"].as_f64().unwrap() > 0.0);
        assert_eq!(json["2024-03-01"]["0"]["crossing_matrix"], serde_json::json!([]));

        report.write_time_series(dir.path().join("series.csv")).unwrap();
        let csv = std::fs::read_to_string(dir.path().join("series.csv")).unwrap();
        assert!(csv.starts_with("date,topic_index,pscore,modularity"));
    }
}
