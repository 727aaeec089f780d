use controversy::*;
use petgraph::graph::NodeIndex;

fn build(rows: &[(String, String)], config: GraphConfig) -> InteractionGraph {
    GraphBuilder::new(config)
        .build(rows.iter().map(|(a, b)| EdgeRecord::new(a.clone(), b.clone(), 1.0)))
        .unwrap()
}

fn clique(prefix: &str, size: usize) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    for i in 0..size {
        for j in (i + 1)..size {
            rows.push((format!("{prefix}{i}"), format!("{prefix}{j}")));
        }
    }
    rows
}

fn simulate(
    graph: &InteractionGraph,
    partition: &Partition,
    gatekeepers: &GatekeeperSet,
    config: SimulationConfig,
) -> Simulation {
    ControversySimulator::new(graph, partition, gatekeepers, &NoSentiment, config)
        .run()
        .unwrap()
}

#[test]
fn rows_sum_to_one_when_gatekeepers_are_reachable() {
    let edges = PlantedCommunities::new(3, 10)
        .with_intra_probability(1.0)
        .with_inter_edges(4)
        .generate(17);
    // Bridges are random, so keep every component.
    let graph = GraphBuilder::new(GraphConfig {
        component: ComponentFilter::None,
        ..GraphConfig::default()
    })
    .build(edges)
    .unwrap();
    let partition = GreedyModularity::new().detect(&graph).unwrap().partition;
    assert_eq!(partition.len(), 3);
    let gatekeepers = GatekeeperSelector::default().select(&graph, &partition);

    let sim = simulate(&graph, &partition, &gatekeepers, SimulationConfig::new(400, 5));
    for i in 0..3 {
        let sum = sim.crossing.row_sum(i);
        assert!((sum - 1.0).abs() < 1e-9, "row {i}: {sum}");
        assert_eq!(sim.effective_samples(i), 400);
    }
}

#[test]
fn single_community_scores_zero_without_walks() {
    let rows = clique("u", 6);
    let engine = PolarityEngine::new(EngineConfig {
        seed: Some(1),
        ..EngineConfig::default()
    })
    .unwrap();
    let edges = rows.into_iter().map(|(a, b)| EdgeRecord::new(a, b, 1.0)).collect();
    let analysis = engine
        .analyze_with(Vec::new(), edges, |_, _| NoSentiment)
        .unwrap();
    assert_eq!(analysis.record.num_communities, 1);
    assert_eq!(analysis.record.pscore, 0.0);
    assert!(analysis.record.walk_stats.is_none());
    assert!(analysis.record.effective_samples.is_empty());
}

#[test]
fn symmetric_two_communities_cross_evenly() {
    // K8 split into halves with one gatekeeper each: from any non-gatekeeper
    // both sides are equally likely.
    let graph = build(&clique("n", 8), GraphConfig::default());
    let halves: Vec<Vec<NodeIndex>> = vec![
        (0..4).map(NodeIndex::new).collect(),
        (4..8).map(NodeIndex::new).collect(),
    ];
    let partition = Partition::from_communities(8, halves).unwrap();
    let gatekeepers = GatekeeperSet::from_lists(
        8,
        vec![vec![NodeIndex::new(0)], vec![NodeIndex::new(4)]],
    )
    .unwrap();

    let sim = simulate(&graph, &partition, &gatekeepers, SimulationConfig::new(10_000, 23));
    for i in 0..2 {
        for j in 0..2 {
            assert!((sim.crossing.get(i, j) - 0.5).abs() < 0.05, "{:?}", sim.crossing);
        }
    }
    assert!(score::structural_term(&sim.crossing) < 0.01);
    let pscore = polarization_score(&sim.crossing, &sim.sentiment).unwrap();
    assert!(pscore < 0.005, "pscore {pscore}");
}

#[test]
fn pure_echo_chamber_reaches_maximum() {
    let mut rows = clique("a", 6);
    rows.extend(clique("b", 6));
    let edges = rows.into_iter().map(|(a, b)| EdgeRecord::new(a, b, 1.0)).collect();

    let config = EngineConfig {
        seed: Some(8),
        iterations: 300,
        graph: GraphConfig {
            component: ComponentFilter::None,
            ..GraphConfig::default()
        },
        ..EngineConfig::default()
    };
    let record = PolarityEngine::new(config)
        .unwrap()
        .analyze(vec!["#echo".into()], edges, Vec::new())
        .unwrap();

    assert_eq!(record.num_communities, 2);
    let m = &record.crossing_matrix;
    assert!((m.get(0, 0) - 1.0).abs() < 1e-9 && (m.get(1, 1) - 1.0).abs() < 1e-9);
    assert_eq!((m.get(0, 1), m.get(1, 0)), (0.0, 0.0));
    // v = 4 * 0.25 = 1, pscore = (1 / 1 + 0) / 2.
    assert!((record.pscore - 0.5).abs() < 1e-9);
}

#[test]
fn score_matches_closed_form() {
    let m = SquareMatrix::from_rows(&[vec![0.7, 0.3], vec![0.4, 0.6]]);
    let s = SquareMatrix::zeros(2);
    assert!((polarization_score(&m, &s).unwrap() - 0.04).abs() < 1e-15);
}

#[test]
fn fixed_seed_is_reproducible_across_worker_counts() {
    let edges = PlantedCommunities::new(2, 15)
        .with_intra_probability(0.7)
        .with_inter_edges(12)
        .generate(3);
    let graph = GraphBuilder::default().build(edges).unwrap();
    let partition = GreedyModularity::new().detect(&graph).unwrap().partition;
    let gatekeepers = GatekeeperSelector::default().select(&graph, &partition);

    let serial = |seed| {
        let config = SimulationConfig::new(300, seed).with_workers(1);
        simulate(&graph, &partition, &gatekeepers, config)
    };
    let a = serial(77);
    let b = serial(77);
    assert_eq!(a.crossing, b.crossing);
    assert_eq!(a.sentiment, b.sentiment);

    for workers in [2, 3, 8] {
        let parallel = simulate(
            &graph,
            &partition,
            &gatekeepers,
            SimulationConfig::new(300, 77).with_workers(workers),
        );
        assert!(a.crossing.max_abs_diff(&parallel.crossing) < 1e-9);
        assert!(a.sentiment.max_abs_diff(&parallel.sentiment) < 1e-9);
        assert_eq!(a.stats, parallel.stats);
    }
}

#[test]
fn dead_ends_are_discarded_not_fatal() {
    // Directed: ring a0 -> a1 -> a2 -> a0 with an exit a1 -> sink, and a
    // second ring b0 -> b1 -> b2 -> b0. The sink has no out-edges.
    let rows: Vec<(String, String)> = [
        ("a0", "a1"),
        ("a1", "a2"),
        ("a2", "a0"),
        ("a1", "sink"),
        ("b0", "b1"),
        ("b1", "b2"),
        ("b2", "b0"),
        ("sink", "sink"),
    ]
    .iter()
    .map(|&(a, b)| (a.to_string(), b.to_string()))
    .collect();
    let graph = build(
        &rows,
        GraphConfig {
            directed: true,
            component: ComponentFilter::None,
            ..GraphConfig::default()
        },
    );
    let sink = graph.node_index("sink").unwrap();
    assert!(graph.walk_neighbors(sink).is_empty());

    let idx = |name: &str| graph.node_index(name).unwrap();
    let partition = Partition::from_communities(
        graph.node_count(),
        vec![
            vec![idx("a0"), idx("a1"), idx("a2"), sink],
            vec![idx("b0"), idx("b1"), idx("b2")],
        ],
    )
    .unwrap();
    let gatekeepers =
        GatekeeperSet::from_lists(graph.node_count(), vec![vec![idx("a0")], vec![idx("b0")]])
            .unwrap();

    let sim = simulate(&graph, &partition, &gatekeepers, SimulationConfig::new(500, 2));
    assert!(sim.stats.dead_ends > 0);
    assert_eq!(sim.effective_samples(0) + sim.stats.dead_ends, 500);
    assert_eq!(sim.effective_samples(1), 500);
    assert!(sim.crossing.row_sum(0) < 1.0);
    assert!((sim.crossing.get(0, 0) - sim.crossing.row_sum(0)).abs() < 1e-12);

    let pscore = polarization_score(&sim.crossing, &sim.sentiment).unwrap();
    assert!(pscore.is_finite() && pscore > 0.0);
}

#[test]
fn hostile_replies_raise_the_score() {
    let edges = PlantedCommunities::new(2, 10)
        .with_intra_probability(1.0)
        .with_inter_edges(6)
        .generate(12);
    let planted = PlantedCommunities::new(2, 10);
    let users = planted.usernames(12);

    // Everyone replies angrily to the other side.
    let mut replies = Vec::new();
    for (i, author) in users.iter().enumerate() {
        let other = &users[(i + 10) % 20];
        replies.push(ReplyRecord {
            author: author.clone(),
            reply_to: other.clone(),
            positive: 0.05,
            negative: 0.9,
        });
    }

    let engine = PolarityEngine::new(EngineConfig {
        seed: Some(21),
        iterations: 200,
        ..EngineConfig::default()
    })
    .unwrap();
    let calm = engine.analyze(Vec::new(), edges.clone(), Vec::new()).unwrap();
    let angry = engine.analyze(Vec::new(), edges, replies).unwrap();

    assert_eq!(calm.crossing_matrix, angry.crossing_matrix);
    assert!(score::sentiment_term(&angry.sentiment_matrix) > 0.0);
    assert!(angry.pscore > calm.pscore);
}

#[test]
fn degraded_community_still_yields_a_score() {
    // An 81-node path whose far end touches a 6-clique.
    let mut rows: Vec<(String, String)> = (0..80)
        .map(|i| (format!("p{i}"), format!("p{}", i + 1)))
        .collect();
    rows.extend(clique("k", 6));
    rows.push(("p80".to_string(), "k0".to_string()));
    let graph = build(&rows, GraphConfig::default());

    let idx = |name: &str| graph.node_index(name).unwrap();
    let partition = Partition::from_communities(
        graph.node_count(),
        vec![
            (0..=80).map(|i| idx(&format!("p{i}"))).collect(),
            (0..6).map(|i| idx(&format!("k{i}"))).collect(),
        ],
    )
    .unwrap();

    let gatekeepers =
        GatekeeperSelector::new(CentralityKind::Eigenvector, 10.0).select(&graph, &partition);
    assert_eq!(gatekeepers.degraded(), &[0]);
    assert!(gatekeepers.community(0).is_empty());
    assert_eq!(gatekeepers.community(1).len(), 1);

    let sim = simulate(&graph, &partition, &gatekeepers, SimulationConfig::new(50, 6));
    assert_eq!(sim.effective_samples(1), 50);
    assert_eq!(sim.crossing.get(0, 0), 0.0);
    assert_eq!(sim.effective_samples(0) + sim.stats.step_cap_exceeded, 50);

    let pscore = polarization_score(&sim.crossing, &sim.sentiment).unwrap();
    assert!(pscore.is_finite() && pscore > 0.0, "pscore {pscore}");
}
