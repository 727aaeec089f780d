use std::collections::HashSet;
use std::path::Path;

use csv::Writer;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::error::Result;
use crate::graph::EdgeRecord;

fn stream(seed: u64, index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index);
    rng
}

pub struct UsernameGenerator {
    prefixes: Vec<&'static str>,
    suffixes: Vec<&'static str>,
}

impl Default for UsernameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UsernameGenerator {
    pub fn new() -> Self {
        UsernameGenerator {
            prefixes: vec![
                "dark", "shadow", "light", "blue", "red", "green", "gold", "silver",
                "phantom", "ninja", "stealth", "epic", "legend", "super", "mega",
            ],
            suffixes: vec![
                "warrior", "hunter", "mage", "slayer", "knight", "rogue", "wizard",
                "assassin", "lord", "king", "queen", "master", "pro", "noob", "gamer",
            ],
        }
    }

    // One stream per name keeps the batch independent of rayon's splits.
    pub fn generate_unique_batch(&self, count: usize, seed: u64) -> Vec<String> {
        let drawn: Vec<String> = (0..count)
            .into_par_iter()
            .map(|i| {
                let mut rng = stream(seed, i as u64);
                let prefix = self.prefixes.choose(&mut rng).copied().unwrap_or("user");
                let suffix = self.suffixes.choose(&mut rng).copied().unwrap_or("");
                let num = rng.gen_range(1..999);
                format!("{}{}{}", prefix, suffix, num)
            })
            .collect();

        let mut used = HashSet::with_capacity(count);
        drawn
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                if used.insert(name.clone()) {
                    name
                } else {
                    let unique = format!("{name}_{i}");
                    used.insert(unique.clone());
                    unique
                }
            })
            .collect()
    }
}

// Equal-size communities plus `inter_edges` random bridges.
#[derive(Debug, Clone)]
pub struct PlantedCommunities {
    communities: usize,
    size: usize,
    intra_probability: f64,
    inter_edges: usize,
    max_weight: u32,
}

impl PlantedCommunities {
    pub fn new(communities: usize, size: usize) -> Self {
        Self {
            communities,
            size,
            intra_probability: 0.5,
            inter_edges: 0,
            max_weight: 20,
        }
    }

    pub fn with_intra_probability(mut self, p: f64) -> Self {
        self.intra_probability = p.clamp(0.0, 1.0);
        self
    }

    pub fn with_inter_edges(mut self, count: usize) -> Self {
        self.inter_edges = count;
        self
    }

    pub fn with_max_weight(mut self, max_weight: u32) -> Self {
        self.max_weight = max_weight.max(1);
        self
    }

    /// Usernames of community `c` are `names[c * size..(c + 1) * size]`.
    pub fn usernames(&self, seed: u64) -> Vec<String> {
        UsernameGenerator::new().generate_unique_batch(self.communities * self.size, seed)
    }

    pub fn generate(&self, seed: u64) -> Vec<EdgeRecord> {
        let users = self.usernames(seed);
        let size = self.size;

        // Streams 0..users.len() named the users.
        let base = users.len() as u64;
        let mut edges: Vec<EdgeRecord> = (0..self.communities)
            .into_par_iter()
            .flat_map_iter(|c| {
                let mut rng = stream(seed, base + c as u64);
                let members = &users[c * size..(c + 1) * size];
                let mut local = Vec::new();
                for i in 0..size {
                    for j in (i + 1)..size {
                        if rng.gen_bool(self.intra_probability) {
                            let (a, b) = if rng.gen_bool(0.5) { (i, j) } else { (j, i) };
                            let weight = rng.gen_range(1..=self.max_weight);
                            local.push(EdgeRecord::new(&members[a], &members[b], weight as f64));
                        }
                    }
                }
                local
            })
            .collect();

        if self.communities >= 2 && size > 0 {
            let mut rng = stream(seed, base + self.communities as u64);
            for _ in 0..self.inter_edges {
                let c1 = rng.gen_range(0..self.communities);
                let c2 = (c1 + rng.gen_range(1..self.communities)) % self.communities;
                let a = &users[c1 * size + rng.gen_range(0..size)];
                let b = &users[c2 * size + rng.gen_range(0..size)];
                let weight = rng.gen_range(1..=self.max_weight);
                edges.push(EdgeRecord::new(a, b, weight as f64));
            }
        }
        edges
    }
}

pub fn write_edges_csv(edges: &[EdgeRecord], filename: impl AsRef<Path>) -> Result<()> {
    let mut writer = Writer::from_path(filename)?;
    for edge in edges {
        writer.serialize(edge)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn generate_interaction_csv(
    planted: &PlantedCommunities,
    seed: u64,
    filename: impl AsRef<Path>,
) -> Result<usize> {
    let edges = planted.generate(seed);
    write_edges_csv(&edges, filename)?;
    Ok(edges.len())
}
