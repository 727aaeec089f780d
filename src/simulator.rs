//! Multi-community random-walk controversy simulation.
//!
//! For every community `i`, `iterations` walks start at a uniformly random
//! member and move to uniformly random neighbours until they step onto a
//! gatekeeper of some community `j`. Each finished walk adds `1/iterations`
//! to `crossing[i][j]`, and for every community `k` the clamped sum of
//! sentiment votes collected along the way, `max(votes_k / iterations, 0)`,
//! to `sentiment[i][k]`.
//!
//! Walks that hit a dead end, exceed the step budget or outlive the deadline
//! are discarded and counted in [`WalkStats`]; their rows then sum to less
//! than one.
//!
//! ## Parallelism
//!
//! The `communities * iterations` walks are split into contiguous ranges,
//! one per worker. Workers accumulate private matrices and send them over a
//! channel; the partials are summed in worker order once all are done. Each
//! walk draws from its own ChaCha stream keyed by the master seed and the
//! walk's index, so the sampled walks do not depend on the worker count.

use std::ops::Range;
use std::time::{Duration, Instant};

use petgraph::graph::NodeIndex;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::community::Partition;
use crate::error::{Error, Result};
use crate::gatekeeper::GatekeeperSet;
use crate::graph::InteractionGraph;
use crate::matrix::SquareMatrix;
use crate::sentiment::SentimentLookup;

/// How often (in steps) a walk looks at the clock.
const DEADLINE_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Walks per community.
    pub iterations: usize,
    /// Step budget of one walk.
    pub max_steps: usize,
    pub seed: u64,
    pub workers: usize,
    pub deadline: Option<Duration>,
}

impl SimulationConfig {
    pub fn new(iterations: usize, seed: u64) -> Self {
        Self {
            iterations,
            max_steps: 10_000,
            seed,
            workers: rayon::current_num_threads(),
            deadline: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::invalid("iterations", "must be at least 1"));
        }
        if self.max_steps == 0 {
            return Err(Error::invalid("max_steps", "must be at least 1"));
        }
        if self.workers == 0 {
            return Err(Error::invalid("workers", "must be at least 1"));
        }
        Ok(())
    }
}

/// Why a walk was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkFailure {
    /// The walk reached a node without neighbours to move to.
    DeadEnd { node: NodeIndex },
    StepCapExceeded,
    DeadlineExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Walking { current: NodeIndex },
    Terminated { side: usize },
    Failed(WalkFailure),
}

/// Counters describing how the sampled walks ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalkStats {
    /// Walks that reached a gatekeeper, per starting community.
    pub completed: Vec<usize>,
    pub dead_ends: usize,
    pub step_cap_exceeded: usize,
    /// Walks skipped or cut short by the deadline.
    pub abandoned: usize,
    /// Steps taken by completed walks.
    pub total_steps: u64,
}

impl WalkStats {
    fn new(communities: usize) -> Self {
        Self {
            completed: vec![0; communities],
            ..Self::default()
        }
    }

    fn record_failure(&mut self, failure: WalkFailure) {
        match failure {
            WalkFailure::DeadEnd { .. } => self.dead_ends += 1,
            WalkFailure::StepCapExceeded => self.step_cap_exceeded += 1,
            WalkFailure::DeadlineExpired => self.abandoned += 1,
        }
    }

    fn merge(&mut self, other: &WalkStats) {
        for (a, b) in self.completed.iter_mut().zip(&other.completed) {
            *a += b;
        }
        self.dead_ends += other.dead_ends;
        self.step_cap_exceeded += other.step_cap_exceeded;
        self.abandoned += other.abandoned;
        self.total_steps += other.total_steps;
    }

    pub fn discarded(&self) -> usize {
        self.dead_ends + self.step_cap_exceeded + self.abandoned
    }
}

/// Output of one simulator run.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub crossing: SquareMatrix,
    pub sentiment: SquareMatrix,
    pub stats: WalkStats,
    pub seed: u64,
}

impl Simulation {
    /// Walks that contributed to row `community`.
    pub fn effective_samples(&self, community: usize) -> usize {
        self.stats.completed[community]
    }
}

/// Read-only state shared by every walk.
struct WalkContext<'a> {
    graph: &'a InteractionGraph,
    gatekeepers: &'a GatekeeperSet,
    /// `votes[node * n + j]`: sentiment vote of `node` toward community `j`.
    votes: Vec<i8>,
    communities: usize,
    max_steps: usize,
}

impl WalkContext<'_> {
    fn vote(&self, node: NodeIndex, community: usize) -> i8 {
        self.votes[node.index() * self.communities + community]
    }
}

struct RandomWalk<'c, 'a> {
    ctx: &'c WalkContext<'a>,
    state: WalkState,
    steps: usize,
    sentiment_parts: Vec<i64>,
}

impl<'c, 'a> RandomWalk<'c, 'a> {
    fn new(ctx: &'c WalkContext<'a>, start: NodeIndex) -> Self {
        Self {
            ctx,
            state: WalkState::Walking { current: start },
            steps: 0,
            sentiment_parts: vec![0; ctx.communities],
        }
    }

    /// One transition of `Walking -> {Walking, Terminated, Failed}`.
    fn step<R: Rng>(&mut self, rng: &mut R) {
        let WalkState::Walking { current } = self.state else {
            return;
        };
        let Some(&next) = self.ctx.graph.walk_neighbors(current).choose(rng) else {
            self.state = WalkState::Failed(WalkFailure::DeadEnd { node: current });
            return;
        };
        if self.steps >= self.ctx.max_steps {
            self.state = WalkState::Failed(WalkFailure::StepCapExceeded);
            return;
        }
        self.steps += 1;

        for (community, part) in self.sentiment_parts.iter_mut().enumerate() {
            *part += i64::from(self.ctx.vote(next, community));
        }

        self.state = match self.ctx.gatekeepers.side_of(next) {
            Some(side) => WalkState::Terminated { side },
            None => WalkState::Walking { current: next },
        };
    }

    /// Walk until a final state; `Ok` carries the terminating side.
    fn run<R: Rng>(
        &mut self,
        rng: &mut R,
        deadline: Option<Instant>,
    ) -> std::result::Result<usize, WalkFailure> {
        loop {
            match self.state {
                WalkState::Terminated { side } => return Ok(side),
                WalkState::Failed(failure) => return Err(failure),
                WalkState::Walking { .. } => {
                    if self.steps % DEADLINE_CHECK_INTERVAL == 0
                        && self.steps > 0
                        && deadline.is_some_and(|d| Instant::now() >= d)
                    {
                        self.state = WalkState::Failed(WalkFailure::DeadlineExpired);
                    } else {
                        self.step(rng);
                    }
                }
            }
        }
    }
}

/// A worker's private accumulators.
struct Partial {
    worker: usize,
    crossing: SquareMatrix,
    sentiment: SquareMatrix,
    stats: WalkStats,
}

pub struct ControversySimulator<'a, S: SentimentLookup + ?Sized> {
    graph: &'a InteractionGraph,
    partition: &'a Partition,
    gatekeepers: &'a GatekeeperSet,
    sentiment: &'a S,
    config: SimulationConfig,
}

impl<'a, S: SentimentLookup + ?Sized> ControversySimulator<'a, S> {
    pub fn new(
        graph: &'a InteractionGraph,
        partition: &'a Partition,
        gatekeepers: &'a GatekeeperSet,
        sentiment: &'a S,
        config: SimulationConfig,
    ) -> Self {
        Self {
            graph,
            partition,
            gatekeepers,
            sentiment,
            config,
        }
    }

    pub fn run(&self) -> Result<Simulation> {
        self.config.validate()?;
        let n = self.partition.len();
        if self.gatekeepers.len() != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                found: self.gatekeepers.len(),
            });
        }
        if self.partition.labels().len() != self.graph.node_count() {
            return Err(Error::DimensionMismatch {
                expected: self.graph.node_count(),
                found: self.partition.labels().len(),
            });
        }

        let started = Instant::now();
        let deadline = self.config.deadline.map(|d| started + d);
        let ctx = WalkContext {
            graph: self.graph,
            gatekeepers: self.gatekeepers,
            votes: self.prefetch_votes(n),
            communities: n,
            max_steps: self.config.max_steps,
        };

        let units = n * self.config.iterations;
        let workers = self.config.workers.min(units.max(1));
        let chunk = units.div_ceil(workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        let (tx, rx) = crossbeam_channel::unbounded();
        pool.install(|| {
            (0..workers).into_par_iter().for_each_with(tx, |tx, worker| {
                let range = (worker * chunk).min(units)..((worker + 1) * chunk).min(units);
                let partial = self.run_worker(&ctx, worker, range, deadline);
                // The receiver outlives every sender.
                let _ = tx.send(partial);
            });
        });

        let mut partials: Vec<Partial> = rx.iter().collect();
        partials.sort_by_key(|p| p.worker);

        let mut crossing = SquareMatrix::zeros(n);
        let mut sentiment = SquareMatrix::zeros(n);
        let mut stats = WalkStats::new(n);
        for partial in &partials {
            crossing.merge(&partial.crossing);
            sentiment.merge(&partial.sentiment);
            stats.merge(&partial.stats);
        }

        if stats.discarded() > 0 {
            warn!(
                dead_ends = stats.dead_ends,
                step_cap_exceeded = stats.step_cap_exceeded,
                abandoned = stats.abandoned,
                "discarded random walks"
            );
        }
        debug!(
            communities = n,
            iterations = self.config.iterations,
            workers,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "simulation finished"
        );

        Ok(Simulation {
            crossing,
            sentiment,
            stats,
            seed: self.config.seed,
        })
    }

    fn prefetch_votes(&self, n: usize) -> Vec<i8> {
        self.graph
            .nodes()
            .collect::<Vec<_>>()
            .par_iter()
            .flat_map_iter(|&node| {
                let id = self.graph.node_id(node);
                (0..n).map(move |community| self.sentiment.reply_sentiment(id, community).vote())
            })
            .collect()
    }

    fn run_worker(
        &self,
        ctx: &WalkContext<'_>,
        worker: usize,
        units: Range<usize>,
        deadline: Option<Instant>,
    ) -> Partial {
        let n = ctx.communities;
        let iterations = self.config.iterations;
        let weight = 1.0 / iterations as f64;
        let mut partial = Partial {
            worker,
            crossing: SquareMatrix::zeros(n),
            sentiment: SquareMatrix::zeros(n),
            stats: WalkStats::new(n),
        };

        for unit in units {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                partial.stats.abandoned += 1;
                continue;
            }
            let community = unit / iterations;
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
            rng.set_stream(unit as u64);

            let members = self.partition.community(community);
            let start = members[rng.gen_range(0..members.len())];
            let mut walk = RandomWalk::new(ctx, start);

            match walk.run(&mut rng, deadline) {
                Ok(side) => {
                    partial.crossing.add(community, side, weight);
                    for (j, &part) in walk.sentiment_parts.iter().enumerate() {
                        partial.sentiment.add(community, j, (part as f64 * weight).max(0.0));
                    }
                    partial.stats.completed[community] += 1;
                    partial.stats.total_steps += walk.steps as u64;
                }
                Err(failure) => {
                    debug!(community, ?failure, steps = walk.steps, "walk discarded");
                    partial.stats.record_failure(failure);
                }
            }
        }
        partial
    }
}
