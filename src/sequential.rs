//! # Reference Sequential MCTS
//!
//! Classic single-threaded UCB1 search over a plain index tree. It is the
//! correctness oracle for the parallel engine — same selection formula,
//! same backup rule, same final comparator — and doubles as a baseline
//! player. One step runs one trajectory and backs up exactly one rollout.

use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use crate::arena::SubtreeStats;
use crate::config::{Budget, SequentialConfig};
use crate::report::{
    ActionReportEntry, ActionsReport, PerformanceReport, PhaseTimes, SearchOutput, TreeShape,
};
use crate::search::playout::{random_playout, uniform_below};
use crate::{EngineError, GameMechanics, Outcome, NO_ACTION};

struct SeqNode {
    parent: Option<usize>,
    last_action: u16,
    turn: i8,
    /// Cached terminal evaluation; `None` until first computed.
    outcome: Option<Outcome>,
    win_flag: bool,
    n: u64,
    n_wins: u64,
    /// Child indices in ascending action order.
    children: Vec<usize>,
    board: Vec<i8>,
    extra: Vec<i8>,
}

/// The single-threaded reference engine.
pub struct SequentialMcts<G: GameMechanics> {
    cfg: SequentialConfig,
    rng: Xoshiro256PlusPlus,
    nodes: Vec<SeqNode>,
    root: usize,
    has_tree: bool,
    legal: Vec<u16>,
    playout_board: Vec<i8>,
    playout_extra: Vec<i8>,
    _game: PhantomData<G>,
}

impl<G: GameMechanics> SequentialMcts<G> {
    pub fn new(cfg: SequentialConfig) -> SequentialMcts<G> {
        SequentialMcts {
            rng: Xoshiro256PlusPlus::seed_from_u64(cfg.seed),
            cfg,
            nodes: Vec::new(),
            root: 0,
            has_tree: false,
            legal: Vec::with_capacity(G::MAX_ACTIONS),
            playout_board: vec![0; G::board_cells()],
            playout_extra: vec![0; G::EXTRA_INFO],
            _game: PhantomData,
        }
    }

    pub fn config(&self) -> &SequentialConfig {
        &self.cfg
    }

    /// Runs one search and returns the chosen action with its reports.
    /// `forced_steps` replays a recorded step count, overriding the time
    /// and step budgets.
    pub fn run(
        &mut self,
        board: &[i8],
        extra: &[i8],
        turn: i8,
        forced_steps: Option<u64>,
    ) -> Result<SearchOutput, EngineError> {
        if board.len() != G::board_cells() || extra.len() != G::EXTRA_INFO {
            return Err(EngineError::ContractViolation(format!(
                "position buffers {}+{} do not match {}",
                board.len(),
                extra.len(),
                G::NAME
            )));
        }
        let t_total = Instant::now();
        log::info!(
            "sequential search starting [{} | {} | seed {}]",
            G::NAME,
            self.cfg.shortname(),
            self.cfg.seed
        );
        let budget = Budget::new(
            self.cfg.search_time_limit,
            self.cfg.search_steps_limit,
            forced_steps,
            t_total,
        );
        self.prepare_root(board, extra, turn);
        let initial_n_root = self.nodes[self.root].n;
        let initial_shape = self.subtree_shape();

        let mut steps = 0u64;
        let mut time_select = Duration::ZERO;
        let mut time_expand = Duration::ZERO;
        let mut time_playout = Duration::ZERO;
        let mut time_backup = Duration::ZERO;
        let t_loop = Instant::now();
        while !budget.exhausted(steps) {
            let t = Instant::now();
            let leaf = self.select();
            time_select += t.elapsed();

            let t = Instant::now();
            let seed = self.expand(leaf);
            time_expand += t.elapsed();

            let t = Instant::now();
            let outcome = self.playout(seed);
            time_playout += t.elapsed();

            let t = Instant::now();
            self.backup(seed, outcome);
            time_backup += t.elapsed();

            steps += 1;
        }
        let loop_time = t_loop.elapsed();

        let t_reduce = Instant::now();
        // A zero-step call still needs actions to compare.
        if self.nodes[self.root].children.is_empty() {
            self.expand(self.root);
        }
        let actions = self.reduce_over_actions()?;
        let reduce_time = t_reduce.elapsed();

        let shape = self.subtree_shape();
        let n_root = self.nodes[self.root].n;
        let total = t_total.elapsed();
        let ms = |d: Duration| d.as_secs_f64() * 1e3;
        let steps_f = steps.max(1) as f64;
        let performance = PerformanceReport {
            steps,
            steps_per_second: steps as f64 / total.as_secs_f64(),
            playouts: n_root,
            playouts_per_second: n_root as f64 / total.as_secs_f64(),
            times_ms: PhaseTimes {
                total: ms(total),
                loop_: ms(loop_time),
                reduce_over_actions: ms(reduce_time),
                mean_loop: ms(loop_time) / steps_f,
                mean_select: ms(time_select) / steps_f,
                mean_expand: ms(time_expand) / steps_f,
                mean_playout: ms(time_playout) / steps_f,
                mean_backup: ms(time_backup) / steps_f,
            },
            tree: TreeShape {
                initial_n_root,
                initial_mean_depth: initial_shape.mean_depth(),
                initial_max_depth: initial_shape.max_depth,
                initial_size: initial_shape.size,
                n_root,
                mean_depth: shape.mean_depth(),
                max_depth: shape.max_depth,
                size: shape.size,
            },
            arena_exhausted: false,
        };
        log::info!(
            "sequential search done [best: {} ({}), steps: {}]",
            actions.best.index,
            actions.best.name,
            steps
        );
        Ok(SearchOutput {
            best_action: actions.best.index,
            actions,
            performance,
        })
    }

    fn prepare_root(&mut self, board: &[i8], extra: &[i8], turn: i8) {
        if !self.cfg.vanilla && self.has_tree {
            if let Some(found) = self.find_match(board, extra, turn) {
                self.root = found;
                self.nodes[found].parent = None;
                return;
            }
        }
        self.nodes.clear();
        self.nodes.push(SeqNode {
            parent: None,
            last_action: NO_ACTION,
            turn,
            outcome: None,
            win_flag: false,
            n: 0,
            n_wins: 0,
            children: Vec::new(),
            board: board.to_vec(),
            extra: extra.to_vec(),
        });
        self.root = 0;
        self.has_tree = true;
    }

    /// Looks for the position among the previous root's children and
    /// grandchildren (our move plus the opponent's reply).
    fn find_match(&self, board: &[i8], extra: &[i8], turn: i8) -> Option<usize> {
        let mut frontier = vec![self.root];
        for _ in 0..2 {
            let mut next = Vec::new();
            for &idx in &frontier {
                for &child in &self.nodes[idx].children {
                    let node = &self.nodes[child];
                    if node.turn == turn && node.board == board && node.extra == extra {
                        return Some(child);
                    }
                    next.push(child);
                }
            }
            frontier = next;
        }
        None
    }

    fn outcome_of(&mut self, idx: usize) -> Outcome {
        if let Some(o) = self.nodes[idx].outcome {
            return o;
        }
        let node = &self.nodes[idx];
        let o = G::terminal(&node.board, &node.extra, node.turn, node.last_action);
        let node = &mut self.nodes[idx];
        node.outcome = Some(o);
        if o.is_decided() && o == Outcome::win_for(-node.turn) {
            node.win_flag = true;
        }
        o
    }

    /// UCB1 descent: unvisited children score infinity, ties keep slot
    /// order, stops at the first childless node.
    fn select(&self) -> usize {
        let mut idx = self.root;
        while !self.nodes[idx].children.is_empty() {
            let log_parent = (self.nodes[idx].n as f64).max(1.0).ln();
            let mut best = idx;
            let mut best_score = f64::NEG_INFINITY;
            for &child in &self.nodes[idx].children {
                let c = &self.nodes[child];
                let score = if c.n == 0 {
                    f64::INFINITY
                } else {
                    c.n_wins as f64 / c.n as f64
                        + self.cfg.ucb_c * (log_parent / c.n as f64).sqrt()
                };
                if score > best_score {
                    best_score = score;
                    best = child;
                }
            }
            idx = best;
        }
        idx
    }

    /// Materializes every legal child of a non-terminal leaf and picks the
    /// playout seed uniformly among them. Terminal leaves seed themselves.
    fn expand(&mut self, idx: usize) -> usize {
        if self.nodes[idx].children.is_empty() && !self.outcome_of(idx).is_decided() {
            let turn = self.nodes[idx].turn;
            let mut legal = std::mem::take(&mut self.legal);
            G::legal_actions(&self.nodes[idx].board, &self.nodes[idx].extra, turn, &mut legal);
            for &action in &legal {
                let mut board = self.nodes[idx].board.clone();
                let mut extra = self.nodes[idx].extra.clone();
                G::apply(&mut board, &mut extra, turn, action as usize);
                let child = self.nodes.len();
                self.nodes.push(SeqNode {
                    parent: Some(idx),
                    last_action: action,
                    turn: -turn,
                    outcome: None,
                    win_flag: false,
                    n: 0,
                    n_wins: 0,
                    children: Vec::new(),
                    board,
                    extra,
                });
                self.nodes[idx].children.push(child);
            }
            self.legal = legal;
        }
        let count = self.nodes[idx].children.len();
        if count == 0 {
            idx
        } else {
            let pick = uniform_below(&mut self.rng, count);
            self.nodes[idx].children[pick]
        }
    }

    /// Uniformly random self-play from the seed; the playout branch lives
    /// only in scratch buffers and is discarded.
    fn playout(&mut self, idx: usize) -> Outcome {
        let cached = self.outcome_of(idx);
        if cached.is_decided() {
            return cached;
        }
        self.playout_board.copy_from_slice(&self.nodes[idx].board);
        self.playout_extra.copy_from_slice(&self.nodes[idx].extra);
        let turn = self.nodes[idx].turn;
        let last = self.nodes[idx].last_action;
        let mut legal = std::mem::take(&mut self.legal);
        let outcome = random_playout::<G, _>(
            &mut self.playout_board,
            &mut self.playout_extra,
            turn,
            last,
            &mut legal,
            &mut self.rng,
        );
        self.legal = legal;
        outcome
    }

    /// Walks from the seed to the root: every ancestor gains a visit, the
    /// ancestors whose mover won gain a win.
    fn backup(&mut self, seed: usize, outcome: Outcome) {
        let winner = outcome.as_byte();
        let mut cursor = Some(seed);
        while let Some(idx) = cursor {
            let node = &mut self.nodes[idx];
            node.n += 1;
            if winner.abs() == 1 && i32::from(node.turn) == -i32::from(winner) {
                node.n_wins += 1;
            }
            cursor = node.parent;
        }
    }

    fn reduce_over_actions(&self) -> Result<ActionsReport, EngineError> {
        let root = &self.nodes[self.root];
        let entries: Vec<ActionReportEntry> = root
            .children
            .iter()
            .map(|&child| {
                let c = &self.nodes[child];
                let q = (c.n > 0).then(|| c.n_wins as f64 / c.n as f64);
                let ucb = match q {
                    Some(q) if root.n > 0 => {
                        Some(q + self.cfg.ucb_c * ((root.n as f64).ln() / c.n as f64).sqrt())
                    }
                    _ => None,
                };
                ActionReportEntry {
                    index: c.last_action as usize,
                    name: G::action_to_name(c.last_action as usize),
                    n_root: root.n,
                    win_flag: c.win_flag,
                    n: c.n,
                    n_wins: c.n_wins,
                    q,
                    ucb,
                }
            })
            .collect();
        ActionsReport::from_entries(entries).ok_or_else(|| {
            EngineError::ContractViolation("search root has no actions to reduce over".into())
        })
    }

    fn subtree_shape(&self) -> SubtreeStats {
        let mut stats = SubtreeStats::default();
        let mut stack = vec![(self.root, 0u32)];
        while let Some((idx, depth)) = stack.pop() {
            stats.size += 1;
            stats.max_depth = stats.max_depth.max(depth);
            stats.depth_sum += u64::from(depth);
            for &child in &self.nodes[idx].children {
                stack.push((child, depth + 1));
            }
        }
        stats
    }
}
