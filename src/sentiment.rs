//! Reply-sentiment lookups consumed by the random walks.
//!
//! A lookup answers: on average, how positive and how negative are the
//! replies written by `node` to members of community `j`? Values are
//! fetched ahead of the simulation, so walks never block on I/O.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::community::Partition;
use crate::error::Result;
use crate::graph::InteractionGraph;

/// Average positive / negative score of a set of replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplySentiment {
    pub positive: f64,
    pub negative: f64,
}

impl ReplySentiment {
    pub fn new(positive: f64, negative: f64) -> Self {
        Self { positive, negative }
    }

    /// `+1` for hostile (more negative than positive), `-1` for friendly,
    /// `0` otherwise.
    pub fn vote(&self) -> i8 {
        if self.negative > self.positive {
            1
        } else if self.positive > self.negative {
            -1
        } else {
            0
        }
    }
}

/// Source of reply sentiment for `(node, community)` pairs. Missing data is
/// `ReplySentiment::default()`.
pub trait SentimentLookup: Sync {
    fn reply_sentiment(&self, node: &str, community: usize) -> ReplySentiment;
}

impl<F> SentimentLookup for F
where
    F: Fn(&str, usize) -> ReplySentiment + Sync,
{
    fn reply_sentiment(&self, node: &str, community: usize) -> ReplySentiment {
        self(node, community)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSentiment;

impl SentimentLookup for NoSentiment {
    fn reply_sentiment(&self, _node: &str, _community: usize) -> ReplySentiment {
        ReplySentiment::default()
    }
}

/// One scored reply: `author` replied to `reply_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRecord {
    pub author: String,
    pub reply_to: String,
    pub positive: f64,
    pub negative: f64,
}

pub fn read_replies_csv(path: impl AsRef<Path>) -> Result<Vec<ReplyRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut replies = Vec::new();
    for record in reader.deserialize() {
        replies.push(record?);
    }
    Ok(replies)
}

#[derive(Debug, Clone, Default)]
pub struct ReplySentimentTable {
    by_node: HashMap<String, Vec<Option<ReplySentiment>>>,
    communities: usize,
}

impl ReplySentimentTable {
    pub fn new(communities: usize) -> Self {
        Self {
            by_node: HashMap::new(),
            communities,
        }
    }

    /// Average the replies of each author per community of the replied-to
    /// user. Replies to users outside the graph are ignored.
    pub fn aggregate<I>(graph: &InteractionGraph, partition: &Partition, replies: I) -> Self
    where
        I: IntoIterator<Item = ReplyRecord>,
    {
        let mut sums: HashMap<(String, usize), (f64, f64, usize)> = HashMap::new();
        let mut ignored = 0usize;
        for reply in replies {
            let Some(community) = graph
                .node_index(&reply.reply_to)
                .and_then(|node| partition.community_of(node))
            else {
                ignored += 1;
                continue;
            };
            let entry = sums.entry((reply.author, community)).or_insert((0.0, 0.0, 0));
            entry.0 += reply.positive;
            entry.1 += reply.negative;
            entry.2 += 1;
        }

        let mut table = Self::new(partition.len());
        for ((author, community), (positive, negative, count)) in sums {
            let count = count as f64;
            let average = ReplySentiment::new(positive / count, negative / count);
            table.insert(author, community, average);
        }
        debug!(authors = table.by_node.len(), ignored, "aggregated reply sentiment");
        table
    }

    pub fn insert(&mut self, node: impl Into<String>, community: usize, sentiment: ReplySentiment) {
        if community >= self.communities {
            self.communities = community + 1;
        }
        let row = self.by_node.entry(node.into()).or_default();
        if row.len() <= community {
            row.resize(community + 1, None);
        }
        row[community] = Some(sentiment);
    }

    pub fn get(&self, node: &str, community: usize) -> Option<ReplySentiment> {
        self.by_node
            .get(node)
            .and_then(|row| row.get(community).copied().flatten())
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

impl SentimentLookup for ReplySentimentTable {
    fn reply_sentiment(&self, node: &str, community: usize) -> ReplySentiment {
        self.get(node, community).unwrap_or_default()
    }
}
