//! # controversy
//!
//! Multi-community controversy scoring for social interaction graphs.
//!
//! The pipeline for one `(date, topic)` graph:
//!
//! 1. [`GraphBuilder`] turns an aggregated edge table into an
//!    [`InteractionGraph`], dropping isolated nodes and keeping the largest
//!    component.
//! 2. [`GreedyModularity`] partitions it into communities.
//! 3. [`GatekeeperSelector`] keeps the most central members of each community.
//! 4. [`ControversySimulator`] runs random walks from every community until
//!    they reach a gatekeeper, building a crossing matrix and a sentiment
//!    matrix.
//! 5. [`polarization_score`] reduces both matrices to one number.
//!
//! [`PolarityEngine`] wires the stages together and turns degenerate input
//! into zero records instead of errors.

pub mod centrality;
pub mod community;
pub mod config;
pub mod engine;
pub mod error;
pub mod gatekeeper;
pub mod graph;
pub mod matrix;
pub mod score;
pub mod sentiment;
pub mod simulator;
pub mod synthetic;

pub use community::{CommunityDetection, GreedyModularity, Partition, PartitionResult, modularity};
pub use config::{CentralityKind, ComponentFilter, EngineConfig, GraphConfig};
pub use engine::{
    Analysis, CampaignReport, CampaignUnit, PolarityEngine, PolarizationRecord, SeriesPoint,
};
pub use error::{Error, Result};
pub use gatekeeper::{GatekeeperSelector, GatekeeperSet};
pub use graph::{EdgeRecord, GraphBuilder, InteractionGraph, read_edges_csv};
pub use matrix::SquareMatrix;
pub use score::polarization_score;
pub use sentiment::{
    NoSentiment, ReplyRecord, ReplySentiment, ReplySentimentTable, SentimentLookup,
    read_replies_csv,
};
pub use simulator::{ControversySimulator, Simulation, SimulationConfig, WalkFailure, WalkStats};
pub use synthetic::{PlantedCommunities, UsernameGenerator, generate_interaction_csv};
