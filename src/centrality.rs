//! Centrality measures over a community's induced subgraph.
//!
//! All measures are unweighted and return one score per local node index of
//! the [`InducedSubgraph`]. On directed graphs degree counts both directions,
//! closeness uses incoming distances and eigenvector centrality is the left
//! eigenvector (importance flows along edges).

use std::collections::VecDeque;

use crate::config::CentralityKind;
use crate::graph::InducedSubgraph;

/// Why a centrality could not be computed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CentralityError {
    #[error("centrality of an empty subgraph")]
    EmptySubgraph,
    /// Power iteration did not settle.
    #[error("power iteration did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },
}

pub type CentralityResult = std::result::Result<Vec<f64>, CentralityError>;

const EIGENVECTOR_MAX_ITER: usize = 100;
const EIGENVECTOR_TOLERANCE: f64 = 1.0e-6;

pub fn compute(kind: CentralityKind, sub: &InducedSubgraph) -> CentralityResult {
    if sub.is_empty() {
        return Err(CentralityError::EmptySubgraph);
    }
    match kind {
        CentralityKind::Degree => Ok(degree(sub)),
        CentralityKind::Betweenness => Ok(betweenness(sub)),
        CentralityKind::Closeness => Ok(closeness(sub)),
        CentralityKind::Eigenvector => {
            eigenvector(sub, EIGENVECTOR_MAX_ITER, EIGENVECTOR_TOLERANCE)
        }
    }
}

/// Degree divided by `n - 1`; a lone node scores 1.
pub fn degree(sub: &InducedSubgraph) -> Vec<f64> {
    let n = sub.len();
    if n <= 1 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let deg = if sub.directed {
                sub.out[i].len() + sub.inc[i].len()
            } else {
                sub.out[i].len()
            };
            deg as f64 / denom
        })
        .collect()
}

/// Brandes betweenness counting path endpoints, normalized by `n(n-1)`.
pub fn betweenness(sub: &InducedSubgraph) -> Vec<f64> {
    let n = sub.len();
    let mut bc = vec![0.0_f64; n];

    for s in 0..n {
        let mut stack: Vec<usize> = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0_f64; n];
        let mut dist = vec![-1i64; n];
        let mut delta = vec![0.0_f64; n];

        sigma[s] = 1.0;
        dist[s] = 0;
        let mut queue = VecDeque::from([s]);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &sub.out[v] {
                if dist[w] < 0 {
                    queue.push_back(w);
                    dist[w] = dist[v] + 1;
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        // Every reached node is an endpoint of a path from s.
        bc[s] += (stack.len() - 1) as f64;
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
            }
            if w != s {
                bc[w] += delta[w] + 1.0;
            }
        }
    }

    if n >= 2 {
        let scale = 1.0 / (n * (n - 1)) as f64;
        for b in bc.iter_mut() {
            *b *= scale;
        }
    }
    bc
}

/// Wasserman-Faust closeness: `(r / (n-1)) * (r / total_distance)` where `r`
/// counts the nodes that can reach this one.
pub fn closeness(sub: &InducedSubgraph) -> Vec<f64> {
    let n = sub.len();
    let mut result = Vec::with_capacity(n);

    for s in 0..n {
        let mut dist = vec![-1i64; n];
        dist[s] = 0;
        let mut queue = VecDeque::from([s]);
        let mut total_dist = 0i64;
        let mut reachable = 0usize;

        while let Some(v) = queue.pop_front() {
            for &w in &sub.inc[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    total_dist += dist[w];
                    reachable += 1;
                    queue.push_back(w);
                }
            }
        }

        let closeness = if total_dist > 0 && n > 1 {
            let r = reachable as f64;
            (r / total_dist as f64) * (r / (n - 1) as f64)
        } else {
            0.0
        };
        result.push(closeness);
    }
    result
}

/// Power iteration on `A^T + I`, L2-normalized each round.
pub fn eigenvector(sub: &InducedSubgraph, max_iter: usize, tol: f64) -> CentralityResult {
    let n = sub.len();
    if n == 0 {
        return Err(CentralityError::EmptySubgraph);
    }
    let mut x = vec![1.0 / n as f64; n];

    for _ in 0..max_iter {
        let last = x.clone();
        for (v, neighbors) in sub.out.iter().enumerate() {
            for &w in neighbors {
                x[w] += last[v];
            }
        }
        let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        let norm = if norm == 0.0 { 1.0 } else { norm };
        for v in x.iter_mut() {
            *v /= norm;
        }
        let change: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if change < n as f64 * tol {
            return Ok(x);
        }
    }
    Err(CentralityError::NotConverged {
        iterations: max_iter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graph::NodeIndex;

    fn sub(n: usize, edges: &[(usize, usize)], directed: bool) -> InducedSubgraph {
        let mut out = vec![Vec::new(); n];
        let mut inc = vec![Vec::new(); n];
        for &(a, b) in edges {
            out[a].push(b);
            inc[b].push(a);
            if !directed {
                out[b].push(a);
                inc[a].push(b);
            }
        }
        InducedSubgraph {
            nodes: (0..n).map(NodeIndex::new).collect(),
            out,
            inc,
            directed,
        }
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn degree_of_star() {
        let star = sub(4, &[(0, 1), (0, 2), (0, 3)], false);
        assert_close(&degree(&star), &[1.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]);
    }

    #[test]
    fn degree_of_single_node_is_one() {
        assert_eq!(degree(&sub(1, &[], false)), vec![1.0]);
    }

    #[test]
    fn betweenness_of_path_with_endpoints() {
        // 0 - 1 - 2
        let path = sub(3, &[(0, 1), (1, 2)], false);
        // Endpoints: each end lies on 2 ordered-pair paths * 2 directions = 4,
        // the middle on all 6. Normalized by n(n-1) = 6.
        assert_close(&betweenness(&path), &[4.0 / 6.0, 1.0, 4.0 / 6.0]);
    }

    #[test]
    fn closeness_of_path() {
        let path = sub(3, &[(0, 1), (1, 2)], false);
        assert_close(&closeness(&path), &[2.0 / 3.0, 1.0, 2.0 / 3.0]);
    }

    #[test]
    fn closeness_uses_incoming_distance_when_directed() {
        // 0 -> 1: only 1 is reached from somewhere.
        let arc = sub(2, &[(0, 1)], true);
        assert_close(&closeness(&arc), &[0.0, 1.0]);
    }

    #[test]
    fn eigenvector_of_star_peaks_at_hub() {
        let star = sub(4, &[(0, 1), (0, 2), (0, 3)], false);
        let scores = eigenvector(&star, 100, 1e-6).unwrap();
        assert!(scores[0] > scores[1]);
        assert!((scores[1] - scores[2]).abs() < 1e-9);
    }

    #[test]
    fn eigenvector_reports_non_convergence() {
        let star = sub(4, &[(0, 1), (0, 2), (0, 3)], false);
        assert_eq!(
            eigenvector(&star, 1, 1e-12),
            Err(CentralityError::NotConverged { iterations: 1 })
        );
    }

    #[test]
    fn empty_subgraph_is_an_error() {
        let empty = sub(0, &[], false);
        for kind in [
            CentralityKind::Degree,
            CentralityKind::Betweenness,
            CentralityKind::Closeness,
            CentralityKind::Eigenvector,
        ] {
            assert_eq!(compute(kind, &empty), Err(CentralityError::EmptySubgraph));
        }
    }
}
