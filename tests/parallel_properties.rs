//! Search-level properties of the parallel engine: budget monotonicity,
//! subtree reuse across moves, arena-exhaustion handling, and structural
//! invariants after contended runs.

use mcts::games::{Connect4, Reversi};
use mcts::{GameMechanics, ParallelMcts, SearchConfig, Variant};

const ALL_VARIANTS: [Variant; 4] = [
    Variant::OcpThrifty,
    Variant::OcpProdigal,
    Variant::AcpThrifty,
    Variant::AcpProdigal,
];

fn start<G: GameMechanics>() -> (Vec<i8>, Vec<i8>) {
    let mut board = vec![0i8; G::board_cells()];
    let mut extra = vec![0i8; G::EXTRA_INFO];
    G::initial(&mut board, &mut extra);
    (board, extra)
}

fn cfg(variant: Variant) -> SearchConfig {
    SearchConfig {
        search_time_limit: None,
        n_trees: 2,
        n_playouts: 8,
        variant,
        seed: 21,
        device_memory_gib: 0.01,
        num_threads: 2,
        ..SearchConfig::default()
    }
}

#[test]
fn statistics_are_monotone_in_steps() {
    let (board, extra) = start::<Connect4>();
    for variant in ALL_VARIANTS {
        let run_steps = |steps: u64| {
            let mut engine = ParallelMcts::<Connect4>::new(cfg(variant));
            engine
                .run(&board, &extra, 1, Some(steps))
                .expect("search runs")
                .performance
                .playouts
        };
        let k = 15;
        let short = run_steps(k);
        let long = run_steps(2 * k);
        assert!(short >= k, "{variant}: {short} rollouts from {k} steps");
        assert!(
            long >= short,
            "{variant}: {long} rollouts after doubling from {short}"
        );
    }
}

#[test]
fn each_step_contributes_every_workers_rollouts() {
    let (board, extra) = start::<Connect4>();
    for variant in ALL_VARIANTS {
        let mut engine = ParallelMcts::<Connect4>::new(cfg(variant));
        let output = engine.run(&board, &extra, 1, Some(12)).expect("search runs");
        // Both families run n_trees * n_playouts rollouts per step.
        assert_eq!(output.performance.playouts, 12 * 2 * 8, "{variant}");
        assert_eq!(output.performance.steps, 12, "{variant}");
    }
}

#[test]
fn subtree_reuse_carries_statistics_to_the_next_search() {
    let (mut board, mut extra) = start::<Connect4>();
    let mut engine = ParallelMcts::<Connect4>::new(SearchConfig {
        vanilla: false,
        ..cfg(Variant::AcpProdigal)
    });
    let first = engine.run(&board, &extra, 1, Some(150)).expect("search runs");
    let my_move = first.best_action;
    Connect4::apply(&mut board, &mut extra, 1, my_move);
    // Any legal reply: eager expansion guarantees the grandchild exists.
    let reply = (0..7)
        .find(|&c| Connect4::is_legal(&board, &extra, -1, c))
        .expect("replies exist");
    Connect4::apply(&mut board, &mut extra, -1, reply);

    // Zero further steps: everything the reduction sees was carried over.
    let second = engine.run(&board, &extra, 1, Some(0)).expect("search runs");
    assert!(second.performance.tree.initial_size > 1, "subtree was promoted");
    assert!(
        second.actions.entries.iter().any(|e| e.n > 0),
        "promoted children kept their visit counts"
    );
    assert_eq!(second.performance.playouts, second.performance.tree.n_root);
    engine.validate_tree();
}

#[test]
fn vanilla_searches_start_cold() {
    let (mut board, mut extra) = start::<Connect4>();
    let mut engine = ParallelMcts::<Connect4>::new(cfg(Variant::AcpProdigal));
    let first = engine.run(&board, &extra, 1, Some(50)).expect("search runs");
    Connect4::apply(&mut board, &mut extra, 1, first.best_action);
    Connect4::apply(&mut board, &mut extra, -1, (first.best_action + 1) % 7);
    let second = engine.run(&board, &extra, 1, Some(0)).expect("search runs");
    assert_eq!(second.performance.tree.initial_n_root, 0);
    assert!(second.actions.entries.iter().all(|e| e.n == 0));
}

#[test]
fn arena_exhaustion_truncates_and_reports() {
    let (board, extra) = start::<Connect4>();
    for variant in ALL_VARIANTS {
        let mut config = cfg(variant);
        // Room for a few dozen nodes only.
        config.device_memory_gib = 141.0 * 80.0 / (1u64 << 30) as f64;
        let mut engine = ParallelMcts::<Connect4>::new(config);
        let output = engine
            .run(&board, &extra, 1, Some(100_000))
            .expect("search still reduces");
        assert!(output.performance.arena_exhausted, "{variant}");
        assert!(output.performance.steps < 100_000, "{variant}");
        assert!(output.best_action < Connect4::MAX_ACTIONS, "{variant}");
        engine.validate_tree();
    }
}

#[test]
fn contended_reversi_runs_keep_invariants() {
    let (board, extra) = start::<Reversi>();
    for variant in [Variant::AcpThrifty, Variant::AcpProdigal] {
        let mut engine = ParallelMcts::<Reversi>::new(SearchConfig {
            n_trees: 2,
            n_playouts: 6,
            num_threads: 4,
            ..cfg(variant)
        });
        let output = engine.run(&board, &extra, 1, Some(30)).expect("search runs");
        assert!(output.best_action < Reversi::MAX_ACTIONS);
        engine.validate_tree();
    }
}
