use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use controversy::*;

#[derive(Parser)]
#[command(name = "polarity", about = "Random-walk controversy scoring for interaction graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a synthetic interaction CSV with planted communities.
    Generate {
        #[arg(long, default_value_t = 2)]
        communities: usize,
        #[arg(long, default_value_t = 70)]
        size: usize,
        #[arg(long, default_value_t = 0.2)]
        intra_probability: f64,
        #[arg(long, default_value_t = 10)]
        inter_edges: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value = "interactions.csv")]
        out: PathBuf,
    },
    /// Score one edge list.
    Analyze {
        /// `a,b,w` edge CSV.
        #[arg(long)]
        edges: PathBuf,
        /// `author,reply_to,positive,negative` CSV.
        #[arg(long)]
        replies: Option<PathBuf>,
        /// Topic words recorded with the result.
        #[arg(long = "topic")]
        topics: Vec<String>,
        #[command(flatten)]
        engine: EngineArgs,
        /// Write the record here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Dump the filtered edge list.
        #[arg(long)]
        edge_list: Option<PathBuf>,
        /// Dump a community-coloured Graphviz file.
        #[arg(long)]
        dot: Option<PathBuf>,
    },
    /// Score every unit listed in a campaign manifest.
    Campaign {
        #[arg(long)]
        manifest: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(long, default_value = "results")]
        out_dir: PathBuf,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// JSON engine configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    iterations: Option<usize>,
    #[arg(long)]
    max_steps: Option<usize>,
    #[arg(long)]
    centrality: Option<CentralityKind>,
    #[arg(long)]
    k_pct: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    deadline_ms: Option<u64>,
    #[arg(long)]
    directed: bool,
    /// Partition on interaction counts.
    #[arg(long)]
    weighted_communities: bool,
}

impl EngineArgs {
    fn resolve(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        config.iterations = self.iterations.unwrap_or(config.iterations);
        config.max_steps = self.max_steps.unwrap_or(config.max_steps);
        config.centrality = self.centrality.unwrap_or(config.centrality);
        config.k_pct = self.k_pct.unwrap_or(config.k_pct);
        config.seed = self.seed.or(config.seed);
        config.workers = self.workers.or(config.workers);
        config.deadline_ms = self.deadline_ms.or(config.deadline_ms);
        config.graph.directed |= self.directed;
        config.weighted_communities |= self.weighted_communities;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Deserialize)]
struct Manifest {
    units: Vec<ManifestUnit>,
}

#[derive(Deserialize)]
struct ManifestUnit {
    date: String,
    #[serde(default)]
    topic_index: usize,
    #[serde(default)]
    topic_words: Vec<String>,
    edges: PathBuf,
    replies: Option<PathBuf>,
}

fn load_replies(path: Option<&Path>) -> Result<Vec<ReplyRecord>> {
    path.map(read_replies_csv).transpose().map(Option::unwrap_or_default)
}

fn load_campaign(manifest: &Path) -> Result<Vec<CampaignUnit>> {
    let base = manifest.parent().unwrap_or(Path::new("."));
    let file = std::fs::File::open(manifest)?;
    let manifest: Manifest = serde_json::from_reader(std::io::BufReader::new(file))?;

    manifest
        .units
        .into_iter()
        .map(|unit| {
            Ok(CampaignUnit {
                edges: read_edges_csv(base.join(&unit.edges))?,
                replies: load_replies(unit.replies.map(|p| base.join(p)).as_deref())?,
                date: unit.date,
                topic_index: unit.topic_index,
                topic_words: unit.topic_words,
            })
        })
        .collect()
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Generate {
            communities,
            size,
            intra_probability,
            inter_edges,
            seed,
            out,
        } => {
            let planted = PlantedCommunities::new(communities, size)
                .with_intra_probability(intra_probability)
                .with_inter_edges(inter_edges);
            let written = generate_interaction_csv(&planted, seed, &out)?;
            tracing::info!(edges = written, path = %out.display(), "wrote synthetic interactions");
        }
        Command::Analyze {
            edges,
            replies,
            topics,
            engine,
            out,
            edge_list,
            dot,
        } => {
            let engine = PolarityEngine::new(engine.resolve()?)?;
            let replies = load_replies(replies.as_deref())?;
            let rows = read_edges_csv(&edges)?;
            let analysis = engine.analyze_with(topics.clone(), rows, |graph, partition| {
                ReplySentimentTable::aggregate(graph, partition, replies)
            });
            let record = match analysis {
                Ok(analysis) => {
                    if let Some(path) = &edge_list {
                        analysis.graph.save_edge_list(path)?;
                    }
                    if let Some(path) = &dot {
                        analysis.graph.save_dot(path, &analysis.partition, &analysis.gatekeepers)?;
                    }
                    analysis.record
                }
                Err(Error::EmptyGraph) => {
                    tracing::warn!(path = %edges.display(), "no nodes left after filtering");
                    PolarizationRecord::empty(topics)
                }
                Err(err) => return Err(err.into()),
            };

            let json = serde_json::to_string_pretty(&record)?;
            match out {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Command::Campaign {
            manifest,
            engine,
            out_dir,
        } => {
            let engine = PolarityEngine::new(engine.resolve()?)?;
            let units = load_campaign(&manifest)?;
            std::fs::create_dir_all(&out_dir)?;
            let report = engine.analyze_campaign_with(units, |date, topic_index, analysis| {
                let unit_dir = out_dir.join(format!("{date}_{topic_index}"));
                std::fs::create_dir_all(&unit_dir)?;
                analysis.graph.save_edge_list(unit_dir.join("edges.csv"))
            });

            report.write_json(out_dir.join("campaign_analysis.json"))?;
            report.write_time_series(out_dir.join("polarization_series.csv"))?;
            tracing::info!(units = report.len(), dir = %out_dir.display(), "wrote campaign report");
        }
    }

    Ok(())
}
